//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::SecretString;

use crate::error::ConfigError;

/// Fastest virtual clock accepted: one real second covers under three hours.
pub const MAX_TIME_SCALE: f64 = 10_000.0;

/// Fleet and lifecycle configuration.
#[derive(Debug, Clone)]
pub struct FleetConfig {
    /// Maximum number of workers the fleet may hold.
    pub max_workers: usize,
    /// Workers inserted per batch during bulk creation.
    pub creation_batch_size: usize,
    /// Pause between creation batches (lets other tasks run).
    pub creation_batch_pause: Duration,
    /// Lower bound (inclusive) of the idle delay before a worker picks up a task.
    pub idle_delay_min: Duration,
    /// Upper bound (exclusive) of the idle delay.
    pub idle_delay_max: Duration,
    /// Delay before a faulted worker recovers to idle.
    pub recovery_delay: Duration,
    /// Interval between time-series samples.
    pub sample_interval: Duration,
    /// Capacity of each time series.
    pub series_capacity: usize,
    /// Capacity of the fleet activity log.
    pub activity_log_capacity: usize,
    /// Capacity of each worker's error log.
    pub error_log_capacity: usize,
    /// How many workers the top-performers list shows.
    pub top_performers: usize,
    /// Real-time granularity of the clock driver.
    pub clock_resolution: Duration,
    /// Virtual seconds elapsed per real second.
    pub time_scale: f64,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            max_workers: 3000,
            creation_batch_size: 50,
            creation_batch_pause: Duration::from_millis(10),
            idle_delay_min: Duration::from_secs(1),
            idle_delay_max: Duration::from_secs(10),
            recovery_delay: Duration::from_secs(30),
            sample_interval: Duration::from_secs(5),
            series_capacity: 50,
            activity_log_capacity: 100,
            error_log_capacity: 50,
            top_performers: 5,
            clock_resolution: Duration::from_millis(250),
            time_scale: 1.0,
        }
    }
}

impl FleetConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let max_workers = env_parse("WORKFLEET_MAX_WORKERS", defaults.max_workers)?;
        if max_workers == 0 {
            return Err(invalid("WORKFLEET_MAX_WORKERS", "must be at least 1"));
        }

        let creation_batch_size =
            env_parse("WORKFLEET_BATCH_SIZE", defaults.creation_batch_size)?.max(1);

        let sample_secs: u64 = env_parse(
            "WORKFLEET_SAMPLE_INTERVAL_SECS",
            defaults.sample_interval.as_secs(),
        )?;
        if sample_secs == 0 {
            return Err(invalid("WORKFLEET_SAMPLE_INTERVAL_SECS", "must be at least 1"));
        }

        let time_scale = check_time_scale(env_parse("WORKFLEET_TIME_SCALE", defaults.time_scale)?)?;

        Ok(Self {
            max_workers,
            creation_batch_size,
            sample_interval: Duration::from_secs(sample_secs),
            time_scale,
            ..defaults
        })
    }
}

/// HTTP server and persistence configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Where fleet snapshots are written. `None` disables persistence.
    pub snapshot_path: Option<PathBuf>,
    pub autosave_interval: Duration,
    /// Directory for rolling log files. `None` logs to stderr only.
    pub log_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            snapshot_path: None,
            autosave_interval: Duration::from_secs(60),
            log_dir: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let autosave_secs: u64 = env_parse(
            "WORKFLEET_AUTOSAVE_SECS",
            defaults.autosave_interval.as_secs(),
        )?;

        Ok(Self {
            port: env_parse("WORKFLEET_PORT", defaults.port)?,
            snapshot_path: std::env::var("WORKFLEET_SNAPSHOT_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            autosave_interval: Duration::from_secs(autosave_secs.max(1)),
            log_dir: std::env::var("WORKFLEET_LOG_DIR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
        })
    }
}

/// Payout collaborator configuration.
#[derive(Debug, Clone)]
pub struct PayoutConfig {
    /// Settlement endpoint. Payouts are disabled when unset.
    pub endpoint: Option<String>,
    pub api_key: Option<SecretString>,
    /// Account that receives settled payments.
    pub recipient: Option<String>,
    pub interval: Duration,
    pub minimum_daily: Decimal,
    pub minimum_weekly: Decimal,
    pub processing_fee: Decimal,
}

impl Default for PayoutConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            recipient: None,
            interval: Duration::from_secs(24 * 60 * 60),
            minimum_daily: dec!(5.00),
            minimum_weekly: dec!(1.00),
            processing_fee: dec!(0.02),
        }
    }
}

impl PayoutConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let interval_secs: u64 = env_parse(
            "WORKFLEET_PAYOUT_INTERVAL_SECS",
            defaults.interval.as_secs(),
        )?;

        let endpoint = std::env::var("WORKFLEET_PAYOUT_ENDPOINT")
            .ok()
            .filter(|s| !s.trim().is_empty());
        let api_key = std::env::var("WORKFLEET_PAYOUT_API_KEY")
            .ok()
            .filter(|s| !s.is_empty())
            .map(SecretString::from);
        let recipient = std::env::var("WORKFLEET_PAYOUT_RECIPIENT")
            .ok()
            .filter(|s| !s.trim().is_empty());

        if endpoint.is_some() && (api_key.is_none() || recipient.is_none()) {
            return Err(ConfigError::MissingRequired {
                key: "WORKFLEET_PAYOUT_API_KEY / WORKFLEET_PAYOUT_RECIPIENT".to_string(),
                hint: "Both are required when WORKFLEET_PAYOUT_ENDPOINT is set".to_string(),
            });
        }

        Ok(Self {
            endpoint,
            api_key,
            recipient,
            interval: Duration::from_secs(interval_secs.max(1)),
            ..defaults
        })
    }

    /// Whether a settlement endpoint is configured.
    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(key, &e.to_string())),
        _ => Ok(default),
    }
}

fn check_time_scale(value: f64) -> Result<f64, ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid("WORKFLEET_TIME_SCALE", "must be a positive number"));
    }
    if value > MAX_TIME_SCALE {
        return Err(invalid(
            "WORKFLEET_TIME_SCALE",
            &format!("must not exceed {MAX_TIME_SCALE}"),
        ));
    }
    Ok(value)
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}
