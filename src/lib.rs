//! Workfleet: simulated AI worker fleet driven by a virtual-clock scheduler.

pub mod api;
pub mod config;
pub mod error;
pub mod fleet;
pub mod payout;
pub mod store;
pub mod worker;
