//! Synchronous fleet core: the worker table, the virtual clock and the
//! timer wheel that drives every worker.
//!
//! Nothing here touches real time. The async [`FleetManager`] wraps a
//! `Fleet` in a lock and advances its clock from a background task; tests
//! drive it directly with [`Fleet::advance`].
//!
//! [`FleetManager`]: crate::fleet::manager::FleetManager

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::FleetConfig;
use crate::error::FleetError;
use crate::fleet::activity::{ActivityEntry, ActivityLevel, ActivityLog, FleetEvent};
use crate::fleet::scheduler::TimerWheel;
use crate::fleet::series::{EarningsSample, PerformanceSample, SeriesSnapshot, TimeSeries};
use crate::fleet::stats::{AggregateMetrics, FleetStats};
use crate::store::{FleetExport, FleetImport, ImportReport};
use crate::worker::{
    LifecycleCtx, PayoutClaim, PerformanceMode, Worker, WorkerEvent, WorkerId, WorkerSnapshot,
    WorkerType, WorkerView, round_cents,
};

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 1024;

pub struct Fleet {
    config: FleetConfig,
    workers: HashMap<WorkerId, Worker>,
    /// Insertion order, for stable listings.
    order: Vec<WorkerId>,
    now: Duration,
    timers: TimerWheel,
    rng: StdRng,
    performance: TimeSeries<PerformanceSample>,
    earnings: TimeSeries<EarningsSample>,
    sample_seq: u64,
    activity: ActivityLog,
    tx: broadcast::Sender<FleetEvent>,
}

impl Fleet {
    /// Create an empty fleet seeded from OS entropy.
    pub fn new(config: FleetConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Create an empty fleet with a fixed seed, for reproducible runs.
    pub fn with_seed(config: FleetConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: FleetConfig, rng: StdRng) -> Self {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Self {
            performance: TimeSeries::new(config.series_capacity),
            earnings: TimeSeries::new(config.series_capacity),
            activity: ActivityLog::new(config.activity_log_capacity),
            config,
            workers: HashMap::new(),
            order: Vec::new(),
            now: Duration::ZERO,
            timers: TimerWheel::new(),
            rng,
            sample_seq: 0,
            tx,
        }
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    /// Subscribe to activity, stats and sample events.
    pub fn subscribe(&self) -> broadcast::Receiver<FleetEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn sender(&self) -> broadcast::Sender<FleetEvent> {
        self.tx.clone()
    }

    // ── Creation ───────────────────────────────────────────────────────

    /// Check a creation request against the per-call bound and the room left
    /// in the table. Failures are logged to the activity log.
    pub fn validate_creation(&mut self, count: usize) -> Result<(), FleetError> {
        let max = self.config.max_workers;
        let result = if count == 0 || count > max {
            Err(FleetError::InvalidCount { count, max })
        } else {
            let available = max.saturating_sub(self.workers.len());
            if count > available {
                Err(FleetError::CapacityExceeded {
                    requested: count,
                    available,
                })
            } else {
                Ok(())
            }
        };

        if let Err(e) = &result {
            warn!(count, error = %e, "Rejected worker creation");
            self.record_activity(ActivityLevel::Error, None, e.to_string());
        }
        result
    }

    /// Create `count` offline workers in one go.
    pub fn create_workers(
        &mut self,
        count: usize,
        worker_type: WorkerType,
        mode: PerformanceMode,
    ) -> Result<Vec<WorkerId>, FleetError> {
        self.validate_creation(count)?;
        self.record_activity(
            ActivityLevel::Info,
            None,
            format!("Creating {count} {worker_type} workers in {mode} mode..."),
        );
        let created = self.insert_workers(count, worker_type, mode);
        self.record_activity(
            ActivityLevel::Success,
            None,
            format!("Successfully created {} workers", created.len()),
        );
        self.publish_metrics();
        Ok(created)
    }

    /// Insert up to `count` offline workers, stopping at capacity. Callers
    /// validate first; batched creation calls this once per batch.
    pub fn insert_workers(
        &mut self,
        count: usize,
        worker_type: WorkerType,
        mode: PerformanceMode,
    ) -> Vec<WorkerId> {
        let room = self.config.max_workers.saturating_sub(self.workers.len());
        let mut created = Vec::with_capacity(count.min(room));
        for _ in 0..count.min(room) {
            let id = WorkerId::generate(worker_type);
            let worker = Worker::new(id.clone(), worker_type, mode);
            self.order.push(id.clone());
            self.workers.insert(id.clone(), worker);
            created.push(id);
        }
        debug!(count = created.len(), %worker_type, %mode, "Inserted workers");
        created
    }

    // ── Single-worker operations ───────────────────────────────────────
    //
    // Unknown ids are a silent no-op returning false.

    pub fn start_worker(&mut self, id: &WorkerId) -> bool {
        self.transition(id, |w, ctx| w.start(ctx))
    }

    pub fn pause_worker(&mut self, id: &WorkerId) -> bool {
        self.transition(id, |w, ctx| w.pause(ctx))
    }

    pub fn stop_worker(&mut self, id: &WorkerId) -> bool {
        self.transition(id, |w, ctx| w.stop(ctx))
    }

    /// Inject a fault into a worker.
    pub fn inject_fault(&mut self, id: &WorkerId, message: impl Into<String>) -> bool {
        let message = message.into();
        self.transition(id, |w, ctx| Some(w.handle_error(ctx, message)))
    }

    /// Stop the worker (cancelling its timers), then remove it.
    pub fn delete_worker(&mut self, id: &WorkerId) -> bool {
        if !self.workers.contains_key(id) {
            return false;
        }
        self.with_worker(id, |w, ctx| w.stop(ctx));
        self.timers.cancel_all(id);
        self.workers.remove(id);
        self.order.retain(|other| other != id);
        info!(worker_id = %id, "Worker deleted");
        self.record_activity(
            ActivityLevel::Info,
            Some(id.clone()),
            format!("Deleted worker {id}"),
        );
        self.publish_metrics();
        true
    }

    /// Reserve a worker's counters for a payout. `None` for unknown ids or
    /// when a payout for the worker is already in flight.
    pub fn claim_payout(&mut self, id: &WorkerId) -> Option<PayoutClaim> {
        let claim = self.workers.get_mut(id)?.claim_payout()?;
        debug!(worker_id = %id, earnings = claim.earnings, "Payout claimed");
        Some(claim)
    }

    /// Return a claim after a failed payout.
    pub fn release_payout(&mut self, id: &WorkerId) -> bool {
        self.workers
            .get_mut(id)
            .and_then(Worker::release_payout)
            .is_some()
    }

    /// Deduct a settled claim from the worker's counters.
    pub fn settle_payout(&mut self, id: &WorkerId) -> bool {
        match self.workers.get_mut(id).and_then(Worker::settle_payout) {
            Some(claim) => {
                debug!(worker_id = %id, earnings = claim.earnings, "Payout settled");
                true
            }
            None => false,
        }
    }

    // ── Bulk operations ────────────────────────────────────────────────

    /// Start every worker not already working. Returns how many started.
    pub fn start_all(&mut self) -> usize {
        if self.workers.is_empty() {
            self.record_activity(
                ActivityLevel::Warning,
                None,
                "No workers available. Create workers first.".to_string(),
            );
            return 0;
        }
        self.record_activity(
            ActivityLevel::Info,
            None,
            format!("Starting all {} workers...", self.workers.len()),
        );
        let ids = self.order.clone();
        let started = ids
            .iter()
            .filter(|id| {
                self.with_worker(id, |w, ctx| w.start(ctx))
                    .flatten()
                    .is_some()
            })
            .count();
        info!(started, "Started workers");
        self.record_activity(
            ActivityLevel::Success,
            None,
            format!("Started {started} workers"),
        );
        self.publish_metrics();
        started
    }

    /// Stop every worker that is online. Returns how many stopped.
    pub fn stop_all(&mut self) -> usize {
        self.record_activity(ActivityLevel::Info, None, "Stopping all workers...".to_string());
        let ids = self.order.clone();
        let stopped = ids
            .iter()
            .filter(|id| {
                self.with_worker(id, |w, ctx| w.stop(ctx))
                    .flatten()
                    .is_some()
            })
            .count();
        info!(stopped, "Stopped workers");
        self.record_activity(
            ActivityLevel::Success,
            None,
            format!("Stopped {stopped} workers"),
        );
        self.publish_metrics();
        stopped
    }

    // ── Virtual clock ──────────────────────────────────────────────────

    /// Current virtual time since the fleet was created.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Fire time of the earliest pending timer.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.next_deadline()
    }

    /// Advance the clock by `by`. Returns the number of timers fired.
    pub fn advance(&mut self, by: Duration) -> usize {
        let target = self.now + by;
        self.advance_to(target)
    }

    /// Advance the clock to `target`, firing every timer due on the way in
    /// (fire time, arming order). The clock reads each timer's fire time
    /// while its transition runs.
    pub fn advance_to(&mut self, target: Duration) -> usize {
        let mut fired = 0;
        while let Some(timer) = self.timers.pop_due(target) {
            self.now = self.now.max(timer.fires_at);
            fired += 1;
            let event = self
                .with_worker(&timer.worker_id, |w, ctx| w.on_timer(timer.action, ctx))
                .flatten();
            if let Some(event) = event {
                self.report(&timer.worker_id, event);
            }
        }
        self.now = self.now.max(target);
        fired
    }

    // ── Reporting ──────────────────────────────────────────────────────

    /// Recompute the headline metrics over the whole table.
    pub fn recompute_aggregates(&self) -> AggregateMetrics {
        AggregateMetrics::compute(self.workers.values())
    }

    /// Metrics plus status distribution and top performers.
    pub fn stats(&self) -> FleetStats {
        FleetStats::compute(self.workers.values(), self.config.top_performers)
    }

    /// Append one point to each time series.
    pub fn sample_time_series(&mut self) -> AggregateMetrics {
        let metrics = self.recompute_aggregates();
        self.sample_seq += 1;
        let at_ms = self.now.as_millis() as u64;
        let recorded_at = Utc::now();

        let performance = PerformanceSample {
            seq: self.sample_seq,
            at_ms,
            recorded_at,
            active_workers: metrics.active_workers,
        };
        let earnings = EarningsSample {
            seq: self.sample_seq,
            at_ms,
            recorded_at,
            total_earnings: round_cents(metrics.total_earnings),
        };
        self.performance.push(performance.clone());
        self.earnings.push(earnings.clone());

        let _ = self.tx.send(FleetEvent::Sampled {
            performance,
            earnings,
        });
        let _ = self.tx.send(FleetEvent::Stats { metrics });
        metrics
    }

    pub fn performance_series(&self) -> Vec<PerformanceSample> {
        self.performance.to_vec()
    }

    pub fn earnings_series(&self) -> Vec<EarningsSample> {
        self.earnings.to_vec()
    }

    pub fn series(&self) -> SeriesSnapshot {
        SeriesSnapshot {
            performance: self.performance_series(),
            earnings: self.earnings_series(),
        }
    }

    // ── Queries ────────────────────────────────────────────────────────

    pub fn worker(&self, id: &WorkerId) -> Option<&Worker> {
        self.workers.get(id)
    }

    /// Workers in creation order.
    pub fn workers(&self) -> impl Iterator<Item = &Worker> {
        self.order.iter().filter_map(|id| self.workers.get(id))
    }

    pub fn view(&self, id: &WorkerId) -> Option<WorkerView> {
        self.workers.get(id).map(|w| w.view(self.now))
    }

    pub fn views(&self) -> Vec<WorkerView> {
        self.workers().map(|w| w.view(self.now)).collect()
    }

    /// Case-insensitive substring match on id, type or status.
    pub fn search(&self, query: &str) -> Vec<WorkerView> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return self.views();
        }
        self.workers()
            .filter(|w| {
                w.id().as_str().to_lowercase().contains(&query)
                    || w.worker_type().as_str().contains(&query)
                    || w.profile().name.to_lowercase().contains(&query)
                    || w.status().as_str().contains(&query)
            })
            .map(|w| w.view(self.now))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn timers(&self) -> &TimerWheel {
        &self.timers
    }

    // ── Activity ───────────────────────────────────────────────────────

    /// Append to the activity log and broadcast the entry.
    pub fn record_activity(
        &mut self,
        level: ActivityLevel,
        worker_id: Option<WorkerId>,
        message: String,
    ) {
        let entry = ActivityEntry {
            at: Utc::now(),
            sim_ms: self.now.as_millis() as u64,
            level,
            worker_id,
            message,
        };
        self.activity.push(entry.clone());
        let _ = self.tx.send(FleetEvent::Activity { entry });
    }

    pub fn activity(&self, limit: usize) -> Vec<ActivityEntry> {
        self.activity.recent(limit)
    }

    pub fn clear_activity(&mut self) {
        self.activity.clear();
        self.record_activity(ActivityLevel::Info, None, "Log cleared".to_string());
    }

    /// Broadcast freshly recomputed aggregates.
    pub fn publish_metrics(&self) -> AggregateMetrics {
        let metrics = self.recompute_aggregates();
        let _ = self.tx.send(FleetEvent::Stats { metrics });
        metrics
    }

    // ── Export / import ────────────────────────────────────────────────

    pub fn export(&self) -> FleetExport {
        let workers: Vec<WorkerSnapshot> = self.workers().map(Worker::snapshot).collect();
        let total_earnings = round_cents(self.recompute_aggregates().total_earnings);
        FleetExport {
            workers,
            total_earnings,
            export_date: Utc::now(),
        }
    }

    /// Rebuild workers from a snapshot. Imported workers are offline;
    /// unknown types, malformed entries, duplicate ids and anything beyond
    /// capacity are skipped.
    pub fn import(&mut self, import: &FleetImport) -> ImportReport {
        let mut report = ImportReport::default();
        let mut seen: HashSet<WorkerId> = HashSet::new();

        for raw in &import.workers {
            let snapshot: WorkerSnapshot = match serde_json::from_value(raw.clone()) {
                Ok(s) => s,
                Err(e) => {
                    let unknown_type = raw
                        .get("type")
                        .and_then(|t| t.as_str())
                        .is_some_and(|t| t.parse::<WorkerType>().is_err());
                    if unknown_type {
                        report.skipped_unknown_type += 1;
                    } else {
                        debug!(error = %e, "Skipping malformed worker entry");
                        report.skipped_invalid += 1;
                    }
                    continue;
                }
            };

            if self.workers.contains_key(&snapshot.id) || !seen.insert(snapshot.id.clone()) {
                report.skipped_duplicate += 1;
                continue;
            }
            if self.workers.len() >= self.config.max_workers {
                report.skipped_capacity += 1;
                continue;
            }

            let worker = Worker::from_snapshot(&snapshot);
            self.order.push(worker.id().clone());
            self.workers.insert(worker.id().clone(), worker);
            report.imported += 1;
        }

        info!(
            imported = report.imported,
            skipped = report.skipped(),
            "Imported workers"
        );
        let level = if report.skipped() == 0 {
            ActivityLevel::Success
        } else {
            ActivityLevel::Warning
        };
        self.record_activity(
            level,
            None,
            format!(
                "Imported {} workers ({} skipped)",
                report.imported,
                report.skipped()
            ),
        );
        self.publish_metrics();
        report
    }

    // ── Internals ──────────────────────────────────────────────────────

    fn with_worker<R>(
        &mut self,
        id: &WorkerId,
        f: impl FnOnce(&mut Worker, &mut LifecycleCtx<'_>) -> R,
    ) -> Option<R> {
        let worker = self.workers.get_mut(id)?;
        let mut ctx = LifecycleCtx {
            now: self.now,
            timers: &mut self.timers,
            rng: &mut self.rng,
            config: &self.config,
        };
        Some(f(worker, &mut ctx))
    }

    fn transition(
        &mut self,
        id: &WorkerId,
        f: impl FnOnce(&mut Worker, &mut LifecycleCtx<'_>) -> Option<WorkerEvent>,
    ) -> bool {
        match self.with_worker(id, f) {
            Some(event) => {
                if let Some(event) = event {
                    self.report(id, event);
                }
                true
            }
            None => false,
        }
    }

    /// Turn a worker event into an activity entry.
    fn report(&mut self, id: &WorkerId, event: WorkerEvent) {
        let (level, message) = match event {
            WorkerEvent::Started => (ActivityLevel::Info, format!("Worker {id} started")),
            WorkerEvent::TaskStarted { task } => (
                ActivityLevel::Info,
                format!("Worker {id} started task: {task}"),
            ),
            WorkerEvent::TaskCompleted { task, earned } => (
                ActivityLevel::Success,
                format!("Worker {id} completed task: {task} (+${:.2})", earned),
            ),
            WorkerEvent::TaskFailed { task } => (
                ActivityLevel::Warning,
                format!("Worker {id} failed task: {task}"),
            ),
            WorkerEvent::Paused => (ActivityLevel::Info, format!("Worker {id} paused")),
            WorkerEvent::Stopped => (ActivityLevel::Info, format!("Worker {id} stopped")),
            WorkerEvent::Faulted { message } => {
                warn!(worker_id = %id, %message, "Worker fault");
                (
                    ActivityLevel::Error,
                    format!("Worker {id} encountered error: {message}"),
                )
            }
            WorkerEvent::Recovered => (ActivityLevel::Info, format!("Worker {id} recovered")),
        };
        debug!(worker_id = %id, ?level, "{message}");
        self.record_activity(level, Some(id.clone()), message);
    }
}
