//! Snapshot store trait and the persisted fleet shape.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::worker::WorkerSnapshot;

/// Whole-fleet export, compatible with the dashboard's export files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetExport {
    pub workers: Vec<WorkerSnapshot>,
    pub total_earnings: f64,
    pub export_date: DateTime<Utc>,
}

/// Import payload. Workers are kept as raw JSON so one bad entry does not
/// reject the whole file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetImport {
    #[serde(default)]
    pub workers: Vec<serde_json::Value>,
}

impl From<FleetExport> for FleetImport {
    fn from(export: FleetExport) -> Self {
        Self {
            workers: export
                .workers
                .iter()
                .filter_map(|w| serde_json::to_value(w).ok())
                .collect(),
        }
    }
}

/// Outcome of an import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped_unknown_type: usize,
    pub skipped_duplicate: usize,
    pub skipped_capacity: usize,
    pub skipped_invalid: usize,
}

impl ImportReport {
    pub fn skipped(&self) -> usize {
        self.skipped_unknown_type + self.skipped_duplicate + self.skipped_capacity + self.skipped_invalid
    }
}

/// Durable home for fleet snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist a snapshot, replacing any previous one.
    async fn save(&self, export: &FleetExport) -> Result<(), StoreError>;

    /// Load the last snapshot, if one exists.
    async fn load(&self) -> Result<Option<FleetImport>, StoreError>;
}
