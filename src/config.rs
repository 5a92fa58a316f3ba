//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;

use crate::jobs::SchedulerConfig;
use crate::notify::DEFAULT_CAPACITY;
use crate::service::ServiceSettings;
use crate::sync::SyncConfig;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Backfill and attach listeners at boot
    pub sync_auto_start: bool,

    /// Modifying an unmapped record creates its entry
    pub sync_heal_on_modify: bool,

    pub dedup: SchedulerConfig,

    /// Buffered notifications per observer
    pub notification_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        let defaults = SchedulerConfig::default();

        Ok(Self {
            database_url,
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_or("PORT", 3000)?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            sync_auto_start: parse_or("SYNC_AUTO_START", true)?,
            sync_heal_on_modify: parse_or("SYNC_HEAL_ON_MODIFY", true)?,
            dedup: SchedulerConfig {
                enabled: parse_or("DEDUP_ENABLED", defaults.enabled)?,
                interval_ms: parse_or("DEDUP_INTERVAL_MS", defaults.interval_ms)?,
                alert_threshold: parse_or("DEDUP_ALERT_THRESHOLD", defaults.alert_threshold)?,
                silent: parse_or("DEDUP_SILENT", defaults.silent)?,
            },
            notification_capacity: parse_or("NOTIFICATION_CAPACITY", DEFAULT_CAPACITY)?,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            sync: SyncConfig {
                heal_on_modify: self.sync_heal_on_modify,
            },
            scheduler: self.dedup,
            notification_capacity: self.notification_capacity,
        }
    }
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_or_default_when_unset() {
        let value: u64 = parse_or("LEDGER_RECONCILE_TEST_UNSET_VAR", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_parse_or_rejects_garbage() {
        env::set_var("LEDGER_RECONCILE_TEST_BAD_BOOL", "maybe");
        let result: Result<bool, _> = parse_or("LEDGER_RECONCILE_TEST_BAD_BOOL", true);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue("LEDGER_RECONCILE_TEST_BAD_BOOL"))
        ));
    }

    #[test]
    fn test_service_settings_follow_config() {
        let config = Config {
            database_url: "postgres://localhost/ledger".to_string(),
            database_max_connections: 5,
            host: "0.0.0.0".to_string(),
            port: 8080,
            environment: "production".to_string(),
            sync_auto_start: false,
            sync_heal_on_modify: false,
            dedup: SchedulerConfig {
                silent: true,
                ..Default::default()
            },
            notification_capacity: 16,
        };

        let settings = config.service_settings();
        assert!(config.is_production());
        assert!(!settings.sync.heal_on_modify);
        assert!(settings.scheduler.silent);
        assert_eq!(settings.notification_capacity, 16);
    }
}
