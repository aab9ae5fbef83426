//! Runtime configuration read from the environment.
//!
//! | variable | default |
//! |---|---|
//! | `DEPLOY_POLL_INTERVAL_MS` | `2000` |
//! | `DEPLOY_POLL_MAX_ATTEMPTS` | `30` |
//! | `DEPLOY_LOG_FORMAT` | `json` |

use std::str::FromStr;
use std::time::Duration;

use clap::ValueEnum;
use thiserror::Error;

use crate::wait::{WaitPolicy, DEFAULT_POLL_INTERVAL, DEFAULT_POLL_MAX_ATTEMPTS};

pub const POLL_INTERVAL_ENV: &str = "DEPLOY_POLL_INTERVAL_MS";
pub const POLL_MAX_ATTEMPTS_ENV: &str = "DEPLOY_POLL_MAX_ATTEMPTS";
pub const LOG_FORMAT_ENV: &str = "DEPLOY_LOG_FORMAT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Text,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" => Ok(Self::Text),
            _ => Err(ConfigError::Invalid {
                key: LOG_FORMAT_ENV,
                expected: "one of json, text",
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be {expected}, got '{value}'")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    pub wait: WaitPolicy,
    pub log_format: LogFormat,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            wait: WaitPolicy::default(),
            log_format: LogFormat::Json,
        }
    }
}

impl ReconcilerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let interval = match lookup(POLL_INTERVAL_ENV) {
            Some(value) => Duration::from_millis(value.trim().parse().map_err(|_| {
                ConfigError::Invalid {
                    key: POLL_INTERVAL_ENV,
                    expected: "a whole number of milliseconds",
                    value: value.clone(),
                }
            })?),
            None => DEFAULT_POLL_INTERVAL,
        };

        let max_attempts = match lookup(POLL_MAX_ATTEMPTS_ENV) {
            Some(value) => value
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|attempts| *attempts > 0)
                .ok_or_else(|| ConfigError::Invalid {
                    key: POLL_MAX_ATTEMPTS_ENV,
                    expected: "a positive integer",
                    value: value.clone(),
                })?,
            None => DEFAULT_POLL_MAX_ATTEMPTS,
        };

        let log_format = match lookup(LOG_FORMAT_ENV) {
            Some(value) => value.parse()?,
            None => LogFormat::Json,
        };

        Ok(Self {
            wait: WaitPolicy {
                interval,
                max_attempts,
            },
            log_format,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key: &str| values.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = ReconcilerConfig::from_lookup(lookup(&[])).expect("config should load");
        assert_eq!(config, ReconcilerConfig::default());
        assert_eq!(config.wait.interval, Duration::from_secs(2));
        assert_eq!(config.wait.max_attempts, 30);
    }

    #[test]
    fn reads_overrides() {
        let config = ReconcilerConfig::from_lookup(lookup(&[
            (POLL_INTERVAL_ENV, "250"),
            (POLL_MAX_ATTEMPTS_ENV, "8"),
            (LOG_FORMAT_ENV, "Text"),
        ]))
        .expect("config should load");

        assert_eq!(config.wait.interval, Duration::from_millis(250));
        assert_eq!(config.wait.max_attempts, 8);
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn rejects_invalid_values() {
        let error = ReconcilerConfig::from_lookup(lookup(&[(POLL_MAX_ATTEMPTS_ENV, "0")]))
            .expect_err("zero attempts should fail");
        assert_eq!(
            error.to_string(),
            "DEPLOY_POLL_MAX_ATTEMPTS must be a positive integer, got '0'"
        );

        assert!(ReconcilerConfig::from_lookup(lookup(&[(POLL_INTERVAL_ENV, "soon")])).is_err());
        assert!(ReconcilerConfig::from_lookup(lookup(&[(LOG_FORMAT_ENV, "xml")])).is_err());
    }
}
