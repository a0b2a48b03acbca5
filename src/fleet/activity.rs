//! Fleet activity log and broadcast events.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fleet::series::{EarningsSample, PerformanceSample};
use crate::fleet::stats::AggregateMetrics;
use crate::worker::WorkerId;

/// Severity of an activity entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// One line of the fleet's activity log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub at: DateTime<Utc>,
    /// Virtual clock reading, in milliseconds.
    pub sim_ms: u64,
    pub level: ActivityLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<WorkerId>,
    pub message: String,
}

/// Bounded activity log; oldest entries fall off first.
#[derive(Debug)]
pub struct ActivityLog {
    entries: VecDeque<ActivityEntry>,
    capacity: usize,
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, entry: ActivityEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// The most recent `limit` entries, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<ActivityEntry> {
        let skip = self.entries.len().saturating_sub(limit);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActivityEntry> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Events fanned out to live subscribers (WebSocket clients, tests).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FleetEvent {
    /// A new activity log entry.
    Activity { entry: ActivityEntry },
    /// Aggregates recomputed after a bulk operation or tick.
    Stats { metrics: AggregateMetrics },
    /// A sample tick appended to the time series.
    Sampled {
        performance: PerformanceSample,
        earnings: EarningsSample,
    },
}

impl FleetEvent {
    /// Get the event type name (matches the serde tag).
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Activity { .. } => "activity",
            Self::Stats { .. } => "stats",
            Self::Sampled { .. } => "sampled",
        }
    }
}
