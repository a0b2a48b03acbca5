//! Fleet management: the worker table, its clock and its reporting.
//!
//! - `scheduler`: central virtual-clock timer wheel
//! - `fleet`: synchronous fleet core (single writer)
//! - `manager`: shared async handle, batched creation and background drivers
//! - `stats`: aggregate metrics and top performers
//! - `series`: bounded time series for charting
//! - `activity`: activity log and broadcast events

pub mod activity;
pub mod fleet;
pub mod manager;
pub mod scheduler;
pub mod series;
pub mod stats;

pub use activity::{ActivityEntry, ActivityLevel, FleetEvent};
pub use fleet::Fleet;
pub use manager::{FleetManager, spawn_clock_driver, spawn_sampler};
pub use scheduler::{TimerAction, TimerSlot, TimerWheel};
pub use series::{EarningsSample, PerformanceSample, SeriesSnapshot};
pub use stats::{AggregateMetrics, FleetStats};
