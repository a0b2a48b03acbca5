//! Payouts: settle accumulated worker earnings through an external gateway.

pub mod gateway;
pub mod policy;
pub mod service;

pub use gateway::{HttpGateway, PaymentGateway, PaymentReceipt};
pub use policy::{PayoutKind, PayoutPolicy, PayoutQuote};
pub use service::{CycleSummary, PayoutRecord, PayoutService, PayoutStatus, spawn_payout_task};
