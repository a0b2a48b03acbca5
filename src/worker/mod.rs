//! Worker entities and their lifecycle.
//!
//! - `profile`: worker type registry and performance modes
//! - `state`: status state machine (offline → idle ⇄ working, error)
//! - `worker`: the worker entity, its transitions and read models

pub mod profile;
pub mod state;
pub mod worker;

pub use profile::{PerformanceMode, WorkerType, WorkerTypeProfile, lookup, profile_for};
pub use state::WorkerStatus;
pub use worker::{
    CurrentTask, ErrorEntry, LifecycleCtx, PayoutClaim, TaskView, Worker, WorkerEvent, WorkerId,
    WorkerSnapshot, WorkerView, round_cents,
};
