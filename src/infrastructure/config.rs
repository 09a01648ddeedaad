//! Admin configuration module
//!
//! This module loads the admin configuration file: an INI-style file with a
//! `[crontabber]` section of `key = value` settings and a `[jobs]` section
//! listing one `class_path|frequency[|HH:MM]` spec per line, in the order
//! the jobs should be considered. Environment variables (loaded through
//! dotenv by the binary) override file values.

use chrono::Duration;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::domain::errors::ConfigError;

const ENV_DATABASE: &str = "CRONWEAVER_DATABASE";
const ENV_MAX_ONGOING_AGE_HOURS: &str = "CRONWEAVER_MAX_ONGOING_AGE_HOURS";
const ENV_BASE_BACKOFF_SECONDS: &str = "CRONWEAVER_BASE_BACKOFF_SECONDS";

/// Scheduler-wide settings plus the ordered job list
#[derive(Debug, Clone, PartialEq)]
pub struct AdminConfig {
    /// Path of the SQLite state database
    pub database: PathBuf,
    /// Threshold above which a stale ongoing claim may be reclaimed
    pub max_ongoing_age_hours: u32,
    /// Initial retry delay after a failure
    pub base_backoff_seconds: i64,
    /// Retention window for run-log rows, used by the purge app
    pub run_log_retention_days: u32,
    /// Raw job spec lines, in configuration order
    pub jobs: Vec<String>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("cronweaver.db"),
            max_ongoing_age_hours: 12,
            base_backoff_seconds: 1_800,
            run_log_retention_days: 180,
            jobs: Vec::new(),
        }
    }
}

impl AdminConfig {
    /// Loads the config file and applies environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path.as_ref()).map_err(|source| {
            ConfigError::UnreadableFile {
                path: path.as_ref().to_path_buf(),
                source,
            }
        })?;
        let mut config = Self::parse(&text)?;
        config.apply_env()?;
        Ok(config)
    }

    /// Parses the INI-style config text
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let mut section = String::from("crontabber");

        for raw_line in text.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                section = name.trim().to_string();
                continue;
            }
            match section.as_str() {
                "jobs" => config.jobs.push(line.to_string()),
                "crontabber" => config.apply_setting_line(line)?,
                other => {
                    warn!("ignoring line in unknown config section [{other}]: {line}");
                }
            }
        }
        Ok(config)
    }

    fn apply_setting_line(&mut self, line: &str) -> Result<(), ConfigError> {
        let Some((key, value)) = line.split_once('=') else {
            return Err(ConfigError::BadValue {
                key: line.to_string(),
                value: String::new(),
            });
        };
        let (key, value) = (key.trim(), value.trim());
        match key {
            "database" => self.database = PathBuf::from(value),
            "max_ongoing_age_hours" => {
                self.max_ongoing_age_hours = parse_value(key, value)?;
            }
            "base_backoff_seconds" => {
                self.base_backoff_seconds = parse_value(key, value)?;
            }
            "run_log_retention_days" => {
                self.run_log_retention_days = parse_value(key, value)?;
            }
            unknown => {
                warn!("ignoring unknown config key {unknown:?}");
            }
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = env::var(ENV_DATABASE) {
            self.database = PathBuf::from(value);
        }
        if let Ok(value) = env::var(ENV_MAX_ONGOING_AGE_HOURS) {
            self.max_ongoing_age_hours = parse_value(ENV_MAX_ONGOING_AGE_HOURS, &value)?;
        }
        if let Ok(value) = env::var(ENV_BASE_BACKOFF_SECONDS) {
            self.base_backoff_seconds = parse_value(ENV_BASE_BACKOFF_SECONDS, &value)?;
        }
        Ok(())
    }

    pub fn max_ongoing_age(&self) -> Duration {
        Duration::hours(i64::from(self.max_ongoing_age_hours))
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::BadValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let text = r#"
            # scheduler settings
            [crontabber]
            database = /var/lib/cronweaver/state.db
            max_ongoing_age_hours = 6
            base_backoff_seconds = 600

            [jobs]
            myapp.jobs.Ingest|5m
            myapp.jobs.Reports|1d|02:00
        "#;

        let config = AdminConfig::parse(text).unwrap();
        assert_eq!(config.database, PathBuf::from("/var/lib/cronweaver/state.db"));
        assert_eq!(config.max_ongoing_age_hours, 6);
        assert_eq!(config.base_backoff_seconds, 600);
        assert_eq!(
            config.jobs,
            vec!["myapp.jobs.Ingest|5m", "myapp.jobs.Reports|1d|02:00"]
        );
    }

    #[test]
    fn test_defaults_when_keys_are_absent() {
        let config = AdminConfig::parse("[jobs]\na.B|5m\n").unwrap();
        assert_eq!(config.max_ongoing_age_hours, 12);
        assert_eq!(config.base_backoff_seconds, 1_800);
        assert_eq!(config.run_log_retention_days, 180);
        assert_eq!(config.max_ongoing_age(), Duration::hours(12));
    }

    #[test]
    fn test_settings_before_any_section_header() {
        let config = AdminConfig::parse("database = here.db\n").unwrap();
        assert_eq!(config.database, PathBuf::from("here.db"));
    }

    #[test]
    fn test_bad_numeric_value_is_rejected() {
        let err = AdminConfig::parse("max_ongoing_age_hours = soon\n").unwrap_err();
        assert!(matches!(err, ConfigError::BadValue { key, .. } if key == "max_ongoing_age_hours"));
    }

    #[test]
    fn test_missing_file_is_reported() {
        let err = AdminConfig::load("/nonexistent/cronweaver.ini").unwrap_err();
        assert!(matches!(err, ConfigError::UnreadableFile { .. }));
    }
}
