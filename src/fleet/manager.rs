//! Shared async handle over the fleet, plus the background drivers.

use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::config::{FleetConfig, MAX_TIME_SCALE};
use crate::error::FleetError;
use crate::fleet::activity::{ActivityLevel, FleetEvent};
use crate::fleet::fleet::Fleet;
use crate::worker::{PerformanceMode, WorkerType};

/// The fleet behind a lock, handed to every collaborator as `Arc<FleetManager>`.
pub struct FleetManager {
    fleet: RwLock<Fleet>,
    tx: broadcast::Sender<FleetEvent>,
    config: FleetConfig,
}

impl FleetManager {
    /// Create a manager around an empty fleet.
    pub fn new(config: FleetConfig) -> Arc<Self> {
        Self::from_fleet(Fleet::new(config))
    }

    /// Wrap an existing fleet (seeded, restored from a snapshot, ...).
    pub fn from_fleet(fleet: Fleet) -> Arc<Self> {
        let tx = fleet.sender();
        let config = fleet.config().clone();
        Arc::new(Self {
            fleet: RwLock::new(fleet),
            tx,
            config,
        })
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    /// Subscribe to fleet events. Each WS client calls this.
    pub fn subscribe(&self) -> broadcast::Receiver<FleetEvent> {
        self.tx.subscribe()
    }

    /// Run `f` with shared access to the fleet.
    pub async fn read<R>(&self, f: impl FnOnce(&Fleet) -> R) -> R {
        let fleet = self.fleet.read().await;
        f(&fleet)
    }

    /// Run `f` with exclusive access to the fleet.
    pub async fn write<R>(&self, f: impl FnOnce(&mut Fleet) -> R) -> R {
        let mut fleet = self.fleet.write().await;
        f(&mut fleet)
    }

    /// Create workers in batches, releasing the lock and pausing briefly
    /// between batches so other tasks can get at the fleet.
    pub async fn create_workers(
        &self,
        count: usize,
        worker_type: WorkerType,
        mode: PerformanceMode,
    ) -> Result<usize, FleetError> {
        self.write(|fleet| {
            fleet.validate_creation(count)?;
            fleet.record_activity(
                ActivityLevel::Info,
                None,
                format!("Creating {count} {worker_type} workers in {mode} mode..."),
            );
            Ok::<_, FleetError>(())
        })
        .await?;

        let batch_size = self.config.creation_batch_size.max(1);
        let mut created = 0;
        while created < count {
            let batch = batch_size.min(count - created);
            let inserted = self
                .write(|fleet| fleet.insert_workers(batch, worker_type, mode).len())
                .await;
            created += inserted;
            debug!(created, count, "Creation batch inserted");

            // Someone else filled the table in between batches.
            if inserted < batch {
                break;
            }
            if created < count {
                tokio::time::sleep(self.config.creation_batch_pause).await;
            }
        }

        info!(created, %worker_type, %mode, "Workers created");
        self.write(|fleet| {
            fleet.record_activity(
                ActivityLevel::Success,
                None,
                format!("Successfully created {created} workers"),
            );
            fleet.publish_metrics();
        })
        .await;
        Ok(created)
    }
}

/// Spawn the task that moves the virtual clock forward in real time.
pub fn spawn_clock_driver(manager: Arc<FleetManager>) -> tokio::task::JoinHandle<()> {
    let resolution = manager.config.clock_resolution;
    let step = resolution.mul_f64(manager.config.time_scale.max(0.0).min(MAX_TIME_SCALE));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(resolution);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let fired = manager.write(|fleet| fleet.advance(step)).await;
            if fired > 0 {
                debug!(fired, "Clock tick fired timers");
            }
        }
    })
}

/// Spawn the task that samples the time series on a fixed interval.
pub fn spawn_sampler(manager: Arc<FleetManager>) -> tokio::task::JoinHandle<()> {
    let period = manager.config.sample_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let metrics = manager.write(|fleet| fleet.sample_time_series()).await;
            debug!(
                active = metrics.active_workers,
                total = metrics.total_workers,
                earnings = metrics.total_earnings,
                "Sampled fleet"
            );
        }
    })
}
