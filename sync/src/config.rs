//! Configuration for the sync subsystem.

use satchel_engine::DEFAULT_COLLECTIONS;
use std::env;
use std::time::Duration;

/// Tunables for the orchestrator, network controller, and adapters.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How often the background timer attempts a pass
    pub sync_interval: Duration,
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// How long the circuit stays open before one probe is allowed
    pub breaker_cooldown: Duration,
    /// Per-request timeout for the first attempt
    pub request_timeout: Duration,
    /// Per-request timeout for the single longer retry after a timeout
    pub retry_request_timeout: Duration,
    /// Name of the remote file used by the single-blob adapter
    pub remote_file_name: String,
    /// Collections a pass carries
    pub collections: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(60),
            failure_threshold: 5,
            breaker_cooldown: Duration::from_secs(60),
            request_timeout: Duration::from_secs(10),
            retry_request_timeout: Duration::from_secs(30),
            remote_file_name: "satchel-data.json".to_string(),
            collections: DEFAULT_COLLECTIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl SyncConfig {
    /// Load overrides from `SATCHEL_*` environment variables.
    ///
    /// Unset variables keep their defaults; unparsable ones are an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(value) = env::var("SATCHEL_SYNC_INTERVAL_SECS") {
            let secs = value.parse().map_err(|_| ConfigError::InvalidInterval)?;
            config.sync_interval = Duration::from_secs(secs);
        }
        if let Ok(value) = env::var("SATCHEL_FAILURE_THRESHOLD") {
            config.failure_threshold = value.parse().map_err(|_| ConfigError::InvalidThreshold)?;
        }
        if let Ok(value) = env::var("SATCHEL_BREAKER_COOLDOWN_SECS") {
            let secs = value.parse().map_err(|_| ConfigError::InvalidCooldown)?;
            config.breaker_cooldown = Duration::from_secs(secs);
        }
        if let Ok(value) = env::var("SATCHEL_REMOTE_FILE") {
            config.remote_file_name = value;
        }

        Ok(config)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid SATCHEL_SYNC_INTERVAL_SECS value")]
    InvalidInterval,

    #[error("Invalid SATCHEL_FAILURE_THRESHOLD value")]
    InvalidThreshold,

    #[error("Invalid SATCHEL_BREAKER_COOLDOWN_SECS value")]
    InvalidCooldown,
}
