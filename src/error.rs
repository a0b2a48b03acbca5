//! Error types for workfleet.

use rust_decimal::Decimal;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },
}

/// Fleet manager errors surfaced synchronously to callers.
///
/// Task failures and fault recovery never show up here; they are reported
/// through the activity log.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FleetError {
    #[error("Worker count must be between 1 and {max}, got {count}")]
    InvalidCount { count: usize, max: usize },

    #[error("Fleet capacity exceeded: requested {requested}, room for {available}")]
    CapacityExceeded { requested: usize, available: usize },

    #[error("Unknown worker type: {name}")]
    UnknownType { name: String },

    #[error("Unknown performance mode: {name}")]
    UnknownMode { name: String },
}

impl FleetError {
    /// Whether this is a creation-parameter validation failure (as opposed to
    /// a registry miss).
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidCount { .. } | Self::CapacityExceeded { .. } | Self::UnknownMode { .. }
        )
    }
}

/// Payout collaborator errors.
#[derive(Debug, thiserror::Error)]
pub enum PayoutError {
    #[error("Gateway {gateway} rejected payment: {reason}")]
    Rejected { gateway: String, reason: String },

    #[error("HTTP error talking to {gateway}: {reason}")]
    Http { gateway: String, reason: String },

    #[error("Invalid response from {gateway}: {reason}")]
    InvalidResponse { gateway: String, reason: String },

    #[error("Payout of {amount} is below the minimum of {minimum}")]
    BelowMinimum { amount: Decimal, minimum: Decimal },

    #[error("Worker {id} not found")]
    WorkerNotFound { id: String },

    #[error("A payout for worker {id} is already in flight")]
    InFlight { id: String },
}

/// Snapshot store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
