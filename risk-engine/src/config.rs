//! Configuration for the risk engine

use crate::{Error, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Upper bound for any configured duration: 100 years
pub const MAX_DURATION_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Seconds as a `chrono::Duration`, clamped to [`MAX_DURATION_SECS`]
pub(crate) fn bounded_secs(secs: u64) -> Duration {
    Duration::seconds(secs.min(MAX_DURATION_SECS) as i64)
}

/// Risk engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Velocity rule configuration
    pub velocity: VelocityConfig,

    /// Geo-discrepancy rule configuration
    pub geo: GeoConfig,

    /// Store retry configuration
    pub retry: RetryConfig,

    /// Default deadline for a single evaluation (milliseconds)
    pub evaluation_timeout_ms: Option<u64>,

    /// Create a profile on the first approved transaction instead of
    /// reporting an unknown user
    pub auto_provision: bool,

    /// History older than this is eligible for pruning (seconds);
    /// `None` keeps history forever
    pub history_retention_secs: Option<u64>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            velocity: VelocityConfig::default(),
            geo: GeoConfig::default(),
            retry: RetryConfig::default(),
            evaluation_timeout_ms: None,
            auto_provision: false,
            history_retention_secs: None,
        }
    }
}

/// Velocity rule configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VelocityConfig {
    /// Trailing window (seconds)
    pub window_secs: u64,

    /// Block when this many transactions already fall inside the window
    pub max_transactions: u32,
}

impl Default for VelocityConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_transactions: 3,
        }
    }
}

/// Geo-discrepancy rule configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    /// An IP change sooner than this after the last login is blocked (seconds)
    pub min_ip_change_secs: u64,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            min_ip_change_secs: 30,
        }
    }
}

/// Retry policy for transient store failures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per store call, including the first
    pub max_attempts: u32,

    /// Linear backoff step between attempts (milliseconds)
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 25,
        }
    }
}

impl RiskConfig {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::InvalidConfig(format!(
                "Failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parse from a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: RiskConfig = toml::from_str(content)
            .map_err(|e| Error::InvalidConfig(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = RiskConfig::default();

        if let Some(v) = env_parse("TXGUARD_VELOCITY_WINDOW_SECS")? {
            config.velocity.window_secs = v;
        }

        if let Some(v) = env_parse("TXGUARD_VELOCITY_MAX_TRANSACTIONS")? {
            config.velocity.max_transactions = v;
        }

        if let Some(v) = env_parse("TXGUARD_GEO_MIN_IP_CHANGE_SECS")? {
            config.geo.min_ip_change_secs = v;
        }

        if let Some(v) = env_parse("TXGUARD_STORE_MAX_ATTEMPTS")? {
            config.retry.max_attempts = v;
        }

        if let Some(v) = env_parse("TXGUARD_STORE_BACKOFF_MS")? {
            config.retry.backoff_ms = v;
        }

        if let Some(v) = env_parse("TXGUARD_EVALUATION_TIMEOUT_MS")? {
            config.evaluation_timeout_ms = Some(v);
        }

        if let Some(v) = env_parse("TXGUARD_AUTO_PROVISION")? {
            config.auto_provision = v;
        }

        if let Some(v) = env_parse("TXGUARD_HISTORY_RETENTION_SECS")? {
            config.history_retention_secs = Some(v);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make a rule meaningless
    pub fn validate(&self) -> Result<()> {
        if self.velocity.window_secs == 0 {
            return Err(Error::InvalidConfig(
                "velocity.window_secs must be greater than zero".to_string(),
            ));
        }

        if self.velocity.max_transactions == 0 {
            return Err(Error::InvalidConfig(
                "velocity.max_transactions must be greater than zero".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(Error::InvalidConfig(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.evaluation_timeout_ms == Some(0) {
            return Err(Error::InvalidConfig(
                "evaluation_timeout_ms must be greater than zero when set".to_string(),
            ));
        }

        let durations = [
            ("velocity.window_secs", Some(self.velocity.window_secs)),
            ("geo.min_ip_change_secs", Some(self.geo.min_ip_change_secs)),
            ("history_retention_secs", self.history_retention_secs),
            (
                "evaluation_timeout_ms",
                self.evaluation_timeout_ms.map(|ms| ms / 1000),
            ),
        ];
        for (key, secs) in durations {
            if secs.is_some_and(|s| s > MAX_DURATION_SECS) {
                return Err(Error::InvalidConfig(format!(
                    "{} exceeds the maximum of {}s",
                    key, MAX_DURATION_SECS
                )));
            }
        }

        if let Some(retention) = self.history_retention_secs {
            if retention < self.velocity.window_secs {
                return Err(Error::InvalidConfig(format!(
                    "history_retention_secs ({}) must cover the velocity window ({})",
                    retention, self.velocity.window_secs
                )));
            }
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::InvalidConfig(format!("{}: {}", key, e))),
        Err(_) => Ok(None),
    }
}
