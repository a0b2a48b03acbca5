//! Simulated worker entity and its lifecycle transitions.
//!
//! A worker never holds timer handles itself. Every transition receives a
//! [`LifecycleCtx`] carrying the fleet's virtual clock, timer wheel and RNG,
//! and arms or cancels its own slots there.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::FleetConfig;
use crate::fleet::scheduler::{TimerAction, TimerSlot, TimerWheel};
use crate::worker::profile::{PerformanceMode, WorkerType, WorkerTypeProfile};
use crate::worker::state::WorkerStatus;

/// Number of progress steps per task.
const PROGRESS_STEPS: u8 = 20;
const PROGRESS_PER_STEP: u8 = 100 / PROGRESS_STEPS;

/// Unique worker identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh id for a worker of the given type.
    pub fn generate(worker_type: WorkerType) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("worker_{}_{}", worker_type, &suffix[..12]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The task a working worker is executing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentTask {
    pub id: String,
    pub name: &'static str,
    /// 0-100.
    pub progress: u8,
    #[serde(skip)]
    pub started_at: Duration,
}

/// One entry of a worker's error log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEntry {
    pub at_ms: u64,
    /// Task name or other context, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub message: String,
}

/// Something that happened to a worker, reported back to the fleet.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    Started,
    TaskStarted { task: &'static str },
    TaskCompleted { task: &'static str, earned: f64 },
    TaskFailed { task: &'static str },
    Paused,
    Stopped,
    Faulted { message: String },
    Recovered,
}

/// Borrowed fleet state a transition needs.
pub struct LifecycleCtx<'a> {
    pub now: Duration,
    pub timers: &'a mut TimerWheel,
    pub rng: &'a mut StdRng,
    pub config: &'a FleetConfig,
}

/// A simulated task-performing agent.
#[derive(Debug, Clone)]
pub struct Worker {
    id: WorkerId,
    worker_type: WorkerType,
    mode: PerformanceMode,
    profile: &'static WorkerTypeProfile,
    /// Mode-adjusted copy of the profile's nominal duration.
    task_duration: Duration,
    jitter: bool,
    status: WorkerStatus,
    tasks_completed: u64,
    earnings: f64,
    success_rate: f64,
    /// Running mean, in seconds.
    avg_task_time: f64,
    uptime: Duration,
    online_since: Option<Duration>,
    started_at: Option<Duration>,
    current_task: Option<CurrentTask>,
    errors: VecDeque<ErrorEntry>,
    created_at: DateTime<Utc>,
    /// Counters promised to a payout that has not settled yet.
    payout_claim: Option<PayoutClaim>,
}

impl Worker {
    /// Create an offline worker from its type's registry profile.
    pub fn new(id: WorkerId, worker_type: WorkerType, mode: PerformanceMode) -> Self {
        let profile = worker_type.profile();
        let adjusted = mode.adjust(profile.nominal_task_duration, profile.base_success_probability);
        Self {
            id,
            worker_type,
            mode,
            profile,
            task_duration: adjusted.task_duration,
            jitter: adjusted.jitter,
            status: WorkerStatus::Offline,
            tasks_completed: 0,
            earnings: 0.0,
            success_rate: adjusted.success_probability,
            avg_task_time: profile.nominal_task_duration.as_secs_f64(),
            uptime: Duration::ZERO,
            online_since: None,
            started_at: None,
            current_task: None,
            errors: VecDeque::new(),
            created_at: Utc::now(),
            payout_claim: None,
        }
    }

    /// Rebuild a worker from a persisted snapshot. Always offline.
    pub fn from_snapshot(snapshot: &WorkerSnapshot) -> Self {
        let mut worker = Self::new(
            snapshot.id.clone(),
            snapshot.worker_type,
            snapshot.performance_mode,
        );
        worker.tasks_completed = snapshot.tasks_completed;
        if snapshot.earnings.is_finite() {
            worker.earnings = snapshot.earnings.max(0.0);
        }
        if let Some(rate) = snapshot.success_rate.filter(|r| r.is_finite()) {
            worker.success_rate = rate.clamp(0.0, 1.0);
        }
        worker
    }

    // ── Accessors ──────────────────────────────────────────────────────

    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    pub fn worker_type(&self) -> WorkerType {
        self.worker_type
    }

    pub fn mode(&self) -> PerformanceMode {
        self.mode
    }

    pub fn profile(&self) -> &'static WorkerTypeProfile {
        self.profile
    }

    pub fn status(&self) -> WorkerStatus {
        self.status
    }

    pub fn tasks_completed(&self) -> u64 {
        self.tasks_completed
    }

    pub fn earnings(&self) -> f64 {
        self.earnings
    }

    pub fn success_rate(&self) -> f64 {
        self.success_rate
    }

    pub fn avg_task_time(&self) -> f64 {
        self.avg_task_time
    }

    pub fn task_duration(&self) -> Duration {
        self.task_duration
    }

    pub fn current_task(&self) -> Option<&CurrentTask> {
        self.current_task.as_ref()
    }

    pub fn errors(&self) -> impl Iterator<Item = &ErrorEntry> {
        self.errors.iter()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn started_at(&self) -> Option<Duration> {
        self.started_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Uptime accumulated while not offline, as of `now`.
    pub fn uptime(&self, now: Duration) -> Duration {
        let live = self
            .online_since
            .map(|since| now.saturating_sub(since))
            .unwrap_or_default();
        self.uptime + live
    }

    // ── Transitions ────────────────────────────────────────────────────

    /// offline → idle, arming the first idle delay. On an idle worker with no
    /// pending delay (e.g. after `pause()`), re-arms the delay.
    pub fn start(&mut self, ctx: &mut LifecycleCtx<'_>) -> Option<WorkerEvent> {
        match self.status {
            WorkerStatus::Offline => {
                self.set_status(WorkerStatus::Idle, ctx.now);
                self.started_at = Some(ctx.now);
                self.schedule_next_task(ctx);
                Some(WorkerEvent::Started)
            }
            WorkerStatus::Idle if !ctx.timers.is_pending(&self.id, TimerSlot::Delay) => {
                self.started_at = Some(ctx.now);
                self.schedule_next_task(ctx);
                Some(WorkerEvent::Started)
            }
            _ => None,
        }
    }

    /// Idle delay fired: idle → working with a fresh task.
    pub fn begin_task(&mut self, ctx: &mut LifecycleCtx<'_>) -> Option<WorkerEvent> {
        if self.status != WorkerStatus::Idle {
            return None;
        }
        let name = self
            .profile
            .task_pool
            .choose(&mut *ctx.rng)
            .copied()
            .unwrap_or(self.profile.name);

        self.current_task = Some(CurrentTask {
            id: format!("task_{}", Uuid::new_v4().simple()),
            name,
            progress: 0,
            started_at: ctx.now,
        });
        self.set_status(WorkerStatus::Working, ctx.now);
        self.schedule_progress_tick(ctx);
        Some(WorkerEvent::TaskStarted { task: name })
    }

    /// Progress timer fired: advance by one step, completing on the last.
    pub fn progress_tick(&mut self, ctx: &mut LifecycleCtx<'_>) -> Option<WorkerEvent> {
        if self.status != WorkerStatus::Working {
            return None;
        }
        let task = self.current_task.as_mut()?;
        task.progress = task.progress.saturating_add(PROGRESS_PER_STEP).min(100);

        if task.progress >= 100 {
            task.progress = 100;
            Some(self.complete_task(ctx))
        } else {
            self.schedule_progress_tick(ctx);
            None
        }
    }

    fn complete_task(&mut self, ctx: &mut LifecycleCtx<'_>) -> WorkerEvent {
        ctx.timers.cancel(&self.id, TimerSlot::Progress);
        let task = self.current_task.take();
        let (name, elapsed) = match &task {
            Some(t) => (t.name, ctx.now.saturating_sub(t.started_at)),
            None => (self.profile.name, self.task_duration),
        };

        let success = ctx.rng.gen_range(0.0..1.0) < self.success_rate;
        let event = if success {
            self.tasks_completed += 1;
            let earned = self.profile.base_earning_per_task * ctx.rng.gen_range(0.8..1.2);
            self.earnings += earned;
            let n = self.tasks_completed as f64;
            self.avg_task_time = (self.avg_task_time * (n - 1.0) + elapsed.as_secs_f64()) / n;
            WorkerEvent::TaskCompleted { task: name, earned }
        } else {
            self.push_error(ctx, Some(name.to_string()), "Task failed".to_string());
            WorkerEvent::TaskFailed { task: name }
        };

        // Task failure is not a worker fault: back to idle either way.
        self.set_status(WorkerStatus::Idle, ctx.now);
        self.schedule_next_task(ctx);
        event
    }

    /// working → idle, discarding the in-flight task. No new delay is armed.
    pub fn pause(&mut self, ctx: &mut LifecycleCtx<'_>) -> Option<WorkerEvent> {
        if self.status != WorkerStatus::Working {
            return None;
        }
        ctx.timers.cancel(&self.id, TimerSlot::Progress);
        self.current_task = None;
        self.set_status(WorkerStatus::Idle, ctx.now);
        Some(WorkerEvent::Paused)
    }

    /// Any status → offline. Cancels every pending timer.
    pub fn stop(&mut self, ctx: &mut LifecycleCtx<'_>) -> Option<WorkerEvent> {
        ctx.timers.cancel_all(&self.id);
        self.current_task = None;
        if self.status == WorkerStatus::Offline {
            return None;
        }
        self.set_status(WorkerStatus::Offline, ctx.now);
        Some(WorkerEvent::Stopped)
    }

    /// Inject a fault: any status → error, recovering after the configured delay.
    pub fn handle_error(
        &mut self,
        ctx: &mut LifecycleCtx<'_>,
        message: impl Into<String>,
    ) -> WorkerEvent {
        let message = message.into();
        ctx.timers.cancel_all(&self.id);
        let context = self.current_task.take().map(|t| t.name.to_string());
        self.push_error(ctx, context, message.clone());
        self.set_status(WorkerStatus::Error, ctx.now);
        ctx.timers.arm(
            &self.id,
            TimerAction::Recover,
            ctx.now + ctx.config.recovery_delay,
        );
        WorkerEvent::Faulted { message }
    }

    /// Recovery timer fired: error → idle with a new task schedule.
    pub fn recover(&mut self, ctx: &mut LifecycleCtx<'_>) -> Option<WorkerEvent> {
        if self.status != WorkerStatus::Error {
            return None;
        }
        self.set_status(WorkerStatus::Idle, ctx.now);
        self.schedule_next_task(ctx);
        Some(WorkerEvent::Recovered)
    }

    /// Dispatch a fired timer to the matching transition.
    pub fn on_timer(
        &mut self,
        action: TimerAction,
        ctx: &mut LifecycleCtx<'_>,
    ) -> Option<WorkerEvent> {
        match action {
            TimerAction::StartTask => self.begin_task(ctx),
            TimerAction::ProgressTick => self.progress_tick(ctx),
            TimerAction::Recover => self.recover(ctx),
        }
    }

    pub fn payout_claim(&self) -> Option<PayoutClaim> {
        self.payout_claim
    }

    /// Reserve the current counters for a payout. `None` while another
    /// payout is still in flight.
    pub fn claim_payout(&mut self) -> Option<PayoutClaim> {
        if self.payout_claim.is_some() {
            return None;
        }
        let claim = PayoutClaim {
            earnings: self.earnings,
            tasks_completed: self.tasks_completed,
        };
        self.payout_claim = Some(claim);
        Some(claim)
    }

    /// Drop the reservation after a failed payout; counters are untouched.
    pub fn release_payout(&mut self) -> Option<PayoutClaim> {
        self.payout_claim.take()
    }

    /// Deduct the claimed counters after a settled payout. Anything earned
    /// while the payment was in flight stays on the worker.
    pub fn settle_payout(&mut self) -> Option<PayoutClaim> {
        let claim = self.payout_claim.take()?;
        self.earnings = (self.earnings - claim.earnings).max(0.0);
        self.tasks_completed = self.tasks_completed.saturating_sub(claim.tasks_completed);
        Some(claim)
    }

    // ── Internals ──────────────────────────────────────────────────────

    fn set_status(&mut self, status: WorkerStatus, now: Duration) {
        debug_assert!(
            self.status.can_transition_to(status),
            "{} -> {} is not a valid transition",
            self.status,
            status
        );
        match (self.status.is_online(), status.is_online()) {
            (false, true) => self.online_since = Some(now),
            (true, false) => {
                if let Some(since) = self.online_since.take() {
                    self.uptime += now.saturating_sub(since);
                }
            }
            _ => {}
        }
        self.status = status;
    }

    fn schedule_next_task(&mut self, ctx: &mut LifecycleCtx<'_>) {
        let min = ctx.config.idle_delay_min.as_millis() as u64;
        let max = (ctx.config.idle_delay_max.as_millis() as u64).max(min + 1);
        let delay = Duration::from_millis(ctx.rng.gen_range(min..max));
        ctx.timers
            .arm(&self.id, TimerAction::StartTask, ctx.now + delay);
    }

    fn schedule_progress_tick(&mut self, ctx: &mut LifecycleCtx<'_>) {
        let mut step = self.task_duration / u32::from(PROGRESS_STEPS);
        if self.jitter {
            step = step.mul_f64(ctx.rng.gen_range(0.75..1.25));
        }
        let step = step.max(Duration::from_millis(1));
        ctx.timers
            .arm(&self.id, TimerAction::ProgressTick, ctx.now + step);
    }

    fn push_error(&mut self, ctx: &LifecycleCtx<'_>, context: Option<String>, message: String) {
        self.errors.push_back(ErrorEntry {
            at_ms: ctx.now.as_millis() as u64,
            context,
            message,
        });
        while self.errors.len() > ctx.config.error_log_capacity {
            self.errors.pop_front();
        }
    }

    // ── Projections ────────────────────────────────────────────────────

    /// Persistable shape. Status and timers are not part of it.
    pub fn snapshot(&self) -> WorkerSnapshot {
        WorkerSnapshot {
            id: self.id.clone(),
            worker_type: self.worker_type,
            performance_mode: self.mode,
            tasks_completed: self.tasks_completed,
            earnings: self.earnings,
            success_rate: Some(self.success_rate),
        }
    }

    /// Read model for the UI surface. Money is rounded to cents here only.
    pub fn view(&self, now: Duration) -> WorkerView {
        WorkerView {
            id: self.id.clone(),
            worker_type: self.worker_type,
            type_name: self.profile.name,
            performance_mode: self.mode,
            status: self.status,
            tasks_completed: self.tasks_completed,
            success_rate: self.success_rate,
            earnings: round_cents(self.earnings),
            avg_task_time: (self.avg_task_time * 10.0).round() / 10.0,
            uptime_secs: self.uptime(now).as_secs(),
            current_task: self.current_task.as_ref().map(|t| TaskView {
                id: t.id.clone(),
                name: t.name,
                progress: t.progress,
            }),
            error_count: self.errors.len(),
        }
    }
}

/// Counters reserved by an in-flight payout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PayoutClaim {
    pub earnings: f64,
    pub tasks_completed: u64,
}

/// Round a currency amount to two decimal places for reporting.
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Persisted worker shape, compatible with the dashboard's export files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSnapshot {
    pub id: WorkerId,
    #[serde(rename = "type")]
    pub worker_type: WorkerType,
    #[serde(default)]
    pub performance_mode: PerformanceMode,
    #[serde(default)]
    pub tasks_completed: u64,
    #[serde(default)]
    pub earnings: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_rate: Option<f64>,
}

/// Worker read model handed to render collaborators.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerView {
    pub id: WorkerId,
    #[serde(rename = "type")]
    pub worker_type: WorkerType,
    pub type_name: &'static str,
    pub performance_mode: PerformanceMode,
    pub status: WorkerStatus,
    pub tasks_completed: u64,
    pub success_rate: f64,
    pub earnings: f64,
    pub avg_task_time: f64,
    pub uptime_secs: u64,
    pub current_task: Option<TaskView>,
    pub error_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    pub id: String,
    pub name: &'static str,
    pub progress: u8,
}
