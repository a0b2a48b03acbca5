//! Persistence: fleet snapshots written to durable storage.

pub mod json_file;
pub mod traits;

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::fleet::FleetManager;

pub use json_file::JsonFileStore;
pub use traits::{FleetExport, FleetImport, ImportReport, SnapshotStore};

/// Save the current fleet to `store`.
pub async fn save_fleet(
    manager: &FleetManager,
    store: &dyn SnapshotStore,
) -> Result<usize, crate::error::StoreError> {
    let export = manager.read(|fleet| fleet.export()).await;
    store.save(&export).await?;
    Ok(export.workers.len())
}

/// Spawn a background task that snapshots the fleet on a fixed interval.
pub fn spawn_autosave(
    manager: Arc<FleetManager>,
    store: Arc<dyn SnapshotStore>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // First tick fires immediately; nothing has changed yet.
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = save_fleet(&manager, store.as_ref()).await {
                warn!(error = %e, "Autosave failed");
            }
        }
    })
}
