//! Configuration loaded from environment variables.
//!
//! Every setting reads from an `AQUASTAT_`-prefixed variable, e.g.
//! `backup_interval_minutes` reads `AQUASTAT_BACKUP_INTERVAL_MINUTES`.
//! A `.env` file in the working directory is loaded first; variables that are
//! already set take precedence over it.
//!
//! # Example
//!
//! ```ignore
//! use aquastat::config::StatConfig;
//!
//! let config = StatConfig::from_env()?;
//! println!("backing up every {:?}", config.backup_interval());
//! ```

use crate::error::{Result, StatError};
use crate::ingest::RetentionPolicy;
use serde::Deserialize;
use std::time::Duration;

pub const ENV_PREFIX: &str = "AQUASTAT_";

/// Longest accepted backup interval (one week)
pub const MAX_BACKUP_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

fn default_backup_interval_minutes() -> u64 {
    5
}

fn default_tracking_buffer() -> usize {
    1024
}

fn default_drain_timeout_seconds() -> u64 {
    5
}

fn default_postgres_table() -> String {
    "stat_metrics".to_string()
}

fn default_log() -> String {
    "info".to_string()
}

/// Pipeline settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatConfig {
    /// Minutes between scheduled backups
    #[serde(default = "default_backup_interval_minutes")]
    pub backup_interval_minutes: u64,

    /// Dedup mark lifetime in seconds. Unset keeps marks forever.
    #[serde(default)]
    pub dedup_ttl_seconds: Option<u64>,

    /// Pending tracking events buffered before new ones are dropped
    #[serde(default = "default_tracking_buffer")]
    pub tracking_buffer: usize,

    /// How long shutdown waits for queued tracking events before the final backup
    #[serde(default = "default_drain_timeout_seconds")]
    pub drain_timeout_seconds: u64,

    #[serde(default)]
    pub redis_url: Option<String>,

    /// Prepended to every Redis key
    #[serde(default)]
    pub redis_key_prefix: String,

    #[serde(default)]
    pub postgres_url: Option<String>,

    #[serde(default = "default_postgres_table")]
    pub postgres_table: String,

    /// Fallback log filter when `RUST_LOG` is unset
    #[serde(default = "default_log")]
    pub log: String,
}

impl Default for StatConfig {
    fn default() -> Self {
        Self {
            backup_interval_minutes: default_backup_interval_minutes(),
            dedup_ttl_seconds: None,
            tracking_buffer: default_tracking_buffer(),
            drain_timeout_seconds: default_drain_timeout_seconds(),
            redis_url: None,
            redis_key_prefix: String::new(),
            postgres_url: None,
            postgres_table: default_postgres_table(),
            log: default_log(),
        }
    }
}

impl StatConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `.env`, then read and validate `AQUASTAT_*` variables.
    pub fn from_env() -> Result<Self> {
        load_dotenv();
        Self::from_env_prefixed(ENV_PREFIX)
    }

    /// Read and validate variables with a custom prefix (e.g. `"STATS_"`).
    pub fn from_env_prefixed(prefix: &str) -> Result<Self> {
        let config = envy::prefixed(prefix)
            .from_env::<StatConfig>()
            .map_err(|e| StatError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.backup_interval_minutes == 0 {
            return Err(StatError::ConfigError(
                "backup_interval_minutes must be greater than 0".to_string(),
            ));
        }
        if self.backup_interval_minutes > MAX_BACKUP_INTERVAL_MINUTES {
            return Err(StatError::ConfigError(format!(
                "backup_interval_minutes must be at most {}",
                MAX_BACKUP_INTERVAL_MINUTES
            )));
        }
        if self.dedup_ttl_seconds == Some(0) {
            return Err(StatError::ConfigError(
                "dedup_ttl_seconds must be greater than 0 when set".to_string(),
            ));
        }
        if self.tracking_buffer == 0 {
            return Err(StatError::ConfigError(
                "tracking_buffer must be greater than 0".to_string(),
            ));
        }
        // Interpolated into SQL, so only plain identifiers are allowed
        let mut chars = self.postgres_table.chars();
        let valid_table = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_table {
            return Err(StatError::ConfigError(format!(
                "invalid postgres_table '{}'",
                self.postgres_table
            )));
        }
        Ok(())
    }

    pub fn backup_interval(&self) -> Duration {
        Duration::from_secs(self.backup_interval_minutes.saturating_mul(60))
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_seconds)
    }

    pub fn retention(&self) -> Result<RetentionPolicy> {
        match self.dedup_ttl_seconds {
            Some(secs) => RetentionPolicy::windowed(Duration::from_secs(secs)),
            None => Ok(RetentionPolicy::unbounded()),
        }
    }

    pub fn backup_interval_minutes(mut self, minutes: u64) -> Self {
        self.backup_interval_minutes = minutes;
        self
    }

    /// Dedup mark lifetime, in whole seconds.
    pub fn dedup_ttl(mut self, ttl: Duration) -> Self {
        self.dedup_ttl_seconds = Some(ttl.as_secs());
        self
    }

    pub fn tracking_buffer(mut self, capacity: usize) -> Self {
        self.tracking_buffer = capacity;
        self
    }

    pub fn redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = Some(url.into());
        self
    }

    pub fn postgres_url(mut self, url: impl Into<String>) -> Self {
        self.postgres_url = Some(url.into());
        self
    }
}

/// Load variables from `.env` if present, without overriding the environment.
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "AQUASTAT_BACKUP_INTERVAL_MINUTES",
        "AQUASTAT_DEDUP_TTL_SECONDS",
        "AQUASTAT_TRACKING_BUFFER",
        "AQUASTAT_REDIS_URL",
        "AQUASTAT_POSTGRES_TABLE",
    ];

    fn clear() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_when_unset() {
        clear();
        let config = StatConfig::from_env_prefixed(ENV_PREFIX).unwrap();
        assert_eq!(config.backup_interval_minutes, 5);
        assert_eq!(config.tracking_buffer, 1024);
        assert_eq!(config.postgres_table, "stat_metrics");
        assert_eq!(config.retention().unwrap(), RetentionPolicy::unbounded());
        assert!(config.redis_url.is_none());
    }

    #[test]
    #[serial]
    fn test_reads_prefixed_vars() {
        clear();
        std::env::set_var("AQUASTAT_BACKUP_INTERVAL_MINUTES", "15");
        std::env::set_var("AQUASTAT_DEDUP_TTL_SECONDS", "86400");
        std::env::set_var("AQUASTAT_REDIS_URL", "redis://127.0.0.1/");

        let config = StatConfig::from_env_prefixed(ENV_PREFIX).unwrap();
        clear();

        assert_eq!(config.backup_interval(), Duration::from_secs(900));
        assert_eq!(
            config.retention().unwrap(),
            RetentionPolicy::windowed(Duration::from_secs(86400)).unwrap()
        );
        assert_eq!(config.redis_url.as_deref(), Some("redis://127.0.0.1/"));
    }

    #[test]
    #[serial]
    fn test_rejects_invalid_values() {
        clear();
        std::env::set_var("AQUASTAT_BACKUP_INTERVAL_MINUTES", "0");
        let zero_interval = StatConfig::from_env_prefixed(ENV_PREFIX);
        clear();
        assert!(matches!(zero_interval, Err(StatError::ConfigError(_))));

        std::env::set_var("AQUASTAT_TRACKING_BUFFER", "lots");
        let not_a_number = StatConfig::from_env_prefixed(ENV_PREFIX);
        clear();
        assert!(matches!(not_a_number, Err(StatError::ConfigError(_))));
    }

    #[test]
    fn test_backup_interval_is_bounded() {
        let config = StatConfig::new().backup_interval_minutes(u64::MAX / 60);
        assert!(matches!(config.validate(), Err(StatError::ConfigError(_))));

        let config = StatConfig::new().backup_interval_minutes(u64::MAX);
        assert!(config.validate().is_err());
        assert_eq!(config.backup_interval(), Duration::from_secs(u64::MAX));

        let config = StatConfig::new().backup_interval_minutes(MAX_BACKUP_INTERVAL_MINUTES);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sub_second_dedup_ttl_is_rejected() {
        let config = StatConfig::new().dedup_ttl(Duration::from_millis(300));
        assert!(config.validate().is_err());
        assert!(config.retention().is_err());
    }

    #[test]
    fn test_table_name_must_be_identifier() {
        let mut config = StatConfig::new();
        config.postgres_table = "stats; DROP TABLE farms".to_string();
        assert!(config.validate().is_err());

        config.postgres_table = "_stat_metrics_v2".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_setters() {
        let config = StatConfig::new()
            .backup_interval_minutes(1)
            .dedup_ttl(Duration::from_secs(30))
            .tracking_buffer(8);
        assert!(config.validate().is_ok());
        assert_eq!(config.backup_interval(), Duration::from_secs(60));
        assert_eq!(config.tracking_buffer, 8);
    }
}
