//! HTTP and WebSocket surface for dashboards.

pub mod routes;
pub mod ws;

pub use routes::{AppState, fleet_routes};
pub use ws::FleetAction;
