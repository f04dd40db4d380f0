// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigError;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3030;
pub const DEFAULT_DATABASE_PATH: &str = "./data/logs.db";
pub const DEFAULT_RETENTION_HOURS: u32 = 24;
/// Top of every hour. Six fields, the first one is seconds.
pub const DEFAULT_CLEANUP_CRON: &str = "0 0 * * * *";

/// When and how aggressively stored entries are pruned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub enabled: bool,
    pub retention_hours: u32,
    pub schedule: String,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            retention_hours: DEFAULT_RETENTION_HOURS,
            schedule: DEFAULT_CLEANUP_CRON.to_string(),
        }
    }
}

impl RetentionPolicy {
    pub fn cron_schedule(&self) -> Result<cron::Schedule, ConfigError> {
        cron::Schedule::from_str(&self.schedule).map_err(|e| {
            ConfigError::Invalid(format!(
                "CLEANUP_CRON '{}' is not a valid cron expression: {e}",
                self.schedule
            ))
        })
    }
}

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub host: String,
    pub port: u16,
    pub database_path: PathBuf,
    /// Raw `API_KEY` setting. `None` disables authentication, `auto` asks for
    /// a generated key persisted next to the database.
    pub api_key: Option<String>,
    pub retention: RetentionPolicy,
    pub log_level: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            api_key: None,
            retention: RetentionPolicy::default(),
            log_level: "info".to_string(),
        }
    }
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(ConfigError::Invalid(format!(
            "{name} must be true or false, got '{other}'"
        ))),
    }
}

fn parse_number<T: FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| ConfigError::Invalid(format!("{name} must be a number, got '{raw}'")))
}

impl CollectorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let host = env::var("LOG_COLLECTOR_HOST").unwrap_or(defaults.host);
        let port = match env::var("LOG_COLLECTOR_PORT") {
            Ok(raw) => parse_number("LOG_COLLECTOR_PORT", &raw)?,
            Err(_) => defaults.port,
        };
        let database_path = env::var("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.database_path);
        let api_key = env::var("API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        let enabled = match env::var("CLEANUP_ENABLED") {
            Ok(raw) => parse_bool("CLEANUP_ENABLED", &raw)?,
            Err(_) => defaults.retention.enabled,
        };
        let retention_hours = match env::var("CLEANUP_RETENTION_HOURS") {
            Ok(raw) => parse_number("CLEANUP_RETENTION_HOURS", &raw)?,
            Err(_) => defaults.retention.retention_hours,
        };
        let schedule = env::var("CLEANUP_CRON").unwrap_or(defaults.retention.schedule);
        let log_level = env::var("LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or(defaults.log_level);

        let config = Self {
            host,
            port,
            database_path,
            api_key,
            retention: RetentionPolicy {
                enabled,
                retention_hours,
                schedule,
            },
            log_level,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "LOG_COLLECTOR_HOST cannot be empty".to_string(),
            ));
        }

        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "DATABASE_PATH cannot be empty".to_string(),
            ));
        }

        if self.retention.retention_hours == 0 {
            return Err(ConfigError::Invalid(
                "CLEANUP_RETENTION_HOURS must be greater than 0".to_string(),
            ));
        }

        self.retention.cron_schedule()?;

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }

    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 8] = [
        "LOG_COLLECTOR_HOST",
        "LOG_COLLECTOR_PORT",
        "DATABASE_PATH",
        "API_KEY",
        "CLEANUP_ENABLED",
        "CLEANUP_RETENTION_HOURS",
        "CLEANUP_CRON",
        "LOG_LEVEL",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = CollectorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bind_addr(), "0.0.0.0:3030");
        assert_eq!(config.retention, RetentionPolicy::default());
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        let config = CollectorConfig::from_env().unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3030);
        assert_eq!(config.database_path, PathBuf::from("./data/logs.db"));
        assert!(config.api_key.is_none());
        assert!(config.retention.enabled);
        assert_eq!(config.retention.retention_hours, 24);
        assert_eq!(config.retention.schedule, "0 0 * * * *");
        assert_eq!(config.log_level, "info");
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        env::set_var("LOG_COLLECTOR_PORT", "4040");
        env::set_var("DATABASE_PATH", "/tmp/collector/logs.db");
        env::set_var("API_KEY", "secret");
        env::set_var("CLEANUP_ENABLED", "false");
        env::set_var("CLEANUP_RETENTION_HOURS", "72");
        env::set_var("CLEANUP_CRON", "0 30 2 * * *");
        env::set_var("LOG_LEVEL", "DEBUG");

        let config = CollectorConfig::from_env().unwrap();
        clear_env();

        assert_eq!(config.port, 4040);
        assert_eq!(config.database_path, PathBuf::from("/tmp/collector/logs.db"));
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert!(!config.retention.enabled);
        assert_eq!(config.retention.retention_hours, 72);
        assert_eq!(config.retention.schedule, "0 30 2 * * *");
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_garbage() {
        clear_env();
        env::set_var("LOG_COLLECTOR_PORT", "not-a-port");
        assert!(CollectorConfig::from_env().is_err());

        clear_env();
        env::set_var("CLEANUP_CRON", "every hour");
        assert!(CollectorConfig::from_env().is_err());

        clear_env();
        env::set_var("CLEANUP_ENABLED", "maybe");
        assert!(CollectorConfig::from_env().is_err());
        clear_env();
    }

    #[test]
    fn test_validate_zero_retention() {
        let config = CollectorConfig {
            retention: RetentionPolicy {
                retention_hours: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let config = CollectorConfig {
            log_level: "loud".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_blank_api_key_disables_auth() {
        clear_env();
        env::set_var("API_KEY", "   ");
        let config = CollectorConfig::from_env().unwrap();
        clear_env();

        assert!(config.api_key.is_none());
    }
}
