//! Runtime configuration for the orchestrator.
//!
//! Every field has a serde default so a partial JSON document is valid.
//! `CONTESTFLOW_*` environment variables override whatever was loaded.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::dispatch::RetryConfig;

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "CONTESTFLOW_";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration document is not valid JSON for this schema.
    #[error("invalid config document: {0}")]
    Parse(#[from] serde_json::Error),

    /// An environment override could not be parsed.
    #[error("invalid value `{value}` for {variable}")]
    InvalidOverride {
        /// Variable name.
        variable: String,
        /// Raw value.
        value: String,
    },
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line human readable output.
    Pretty,
    /// Single-line human readable output.
    #[default]
    Compact,
    /// Newline-delimited JSON.
    Json,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(()),
        }
    }
}

/// Log subscriber configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
    /// Whether to print the event target.
    #[serde(default = "default_with_target")]
    pub with_target: bool,
}

fn default_filter() -> String {
    "contestflow=info".to_string()
}

fn default_with_target() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            format: LogFormat::default(),
            with_target: default_with_target(),
        }
    }
}

impl LoggingConfig {
    /// Sets the filter directives.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Sets the output format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }
}

/// Configuration of the message pump and its redelivery policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum number of envelopes handled concurrently.
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,
    /// Capacity of the inbound delivery channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Feed outbound stage transition requests back into the pump.
    #[serde(default = "default_loopback_stage_transitions")]
    pub loopback_stage_transitions: bool,
    /// Feed published contest template versions back into the pump.
    #[serde(default)]
    pub loopback_template_versions: bool,
    /// Redelivery policy for retriable failures.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Log subscriber settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_worker_concurrency() -> usize {
    8
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_loopback_stage_transitions() -> bool {
    true
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: default_worker_concurrency(),
            channel_capacity: default_channel_capacity(),
            loopback_stage_transitions: default_loopback_stage_transitions(),
            loopback_template_versions: false,
            retry: RetryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Applies `CONTESTFLOW_*` overrides from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_overrides(std::env::vars())
    }

    /// Applies `CONTESTFLOW_*` overrides from the given variables.
    ///
    /// Unknown variables are ignored.
    pub fn apply_overrides<I, K, V>(mut self, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref().trim();
            match name {
                "WORKER_CONCURRENCY" => self.worker_concurrency = parse(key.as_ref(), value)?,
                "CHANNEL_CAPACITY" => self.channel_capacity = parse(key.as_ref(), value)?,
                "LOOPBACK_STAGE_TRANSITIONS" => {
                    self.loopback_stage_transitions = parse_flag(key.as_ref(), value)?;
                }
                "LOOPBACK_TEMPLATE_VERSIONS" => {
                    self.loopback_template_versions = parse_flag(key.as_ref(), value)?;
                }
                "RETRY_MAX_ATTEMPTS" => self.retry.max_attempts = parse(key.as_ref(), value)?,
                "RETRY_BASE_DELAY_MS" => self.retry.base_delay_ms = parse(key.as_ref(), value)?,
                "RETRY_MAX_DELAY_MS" => self.retry.max_delay_ms = parse(key.as_ref(), value)?,
                "LOG" => self.logging.filter = value.to_string(),
                "LOG_FORMAT" => self.logging.format = parse(key.as_ref(), value)?,
                _ => {}
            }
        }
        Ok(self)
    }

    /// Sets the worker concurrency (minimum 1).
    #[must_use]
    pub fn with_worker_concurrency(mut self, workers: usize) -> Self {
        self.worker_concurrency = workers.max(1);
        self
    }

    /// Sets the channel capacity (minimum 1).
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Enables or disables the stage transition loopback.
    #[must_use]
    pub fn with_loopback_stage_transitions(mut self, enabled: bool) -> Self {
        self.loopback_stage_transitions = enabled;
        self
    }

    /// Enables or disables the template version loopback.
    #[must_use]
    pub fn with_loopback_template_versions(mut self, enabled: bool) -> Self {
        self.loopback_template_versions = enabled;
        self
    }

    /// Sets the redelivery policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the log subscriber settings.
    #[must_use]
    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }
}

fn parse<T: FromStr>(variable: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidOverride {
        variable: variable.to_string(),
        value: value.to_string(),
    })
}

fn parse_flag(variable: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidOverride {
            variable: variable.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.worker_concurrency, 8);
        assert_eq!(config.channel_capacity, 1024);
        assert!(config.loopback_stage_transitions);
        assert!(!config.loopback_template_versions);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config = OrchestratorConfig::from_json_str(
            r#"{"worker_concurrency": 2, "retry": {"max_attempts": 3}, "logging": {"format": "json"}}"#,
        )
        .unwrap();

        assert_eq!(config.worker_concurrency, 2);
        assert_eq!(config.channel_capacity, 1024);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay_ms, 100);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.filter, "contestflow=info");
    }

    #[test]
    fn test_invalid_json() {
        let err = OrchestratorConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"channel_capacity": 16}}"#).unwrap();

        let config = OrchestratorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.channel_capacity, 16);
    }

    #[test]
    fn test_missing_file() {
        let err = OrchestratorConfig::from_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_overrides() {
        let config = OrchestratorConfig::default()
            .apply_overrides([
                ("CONTESTFLOW_WORKER_CONCURRENCY", "3"),
                ("CONTESTFLOW_LOOPBACK_STAGE_TRANSITIONS", "off"),
                ("CONTESTFLOW_LOOPBACK_TEMPLATE_VERSIONS", "true"),
                ("CONTESTFLOW_RETRY_MAX_ATTEMPTS", "9"),
                ("CONTESTFLOW_LOG", "contestflow=debug"),
                ("CONTESTFLOW_LOG_FORMAT", "Pretty"),
                ("PATH", "/usr/bin"),
            ])
            .unwrap();

        assert_eq!(config.worker_concurrency, 3);
        assert!(!config.loopback_stage_transitions);
        assert!(config.loopback_template_versions);
        assert_eq!(config.retry.max_attempts, 9);
        assert_eq!(config.logging.filter, "contestflow=debug");
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_invalid_override() {
        let err = OrchestratorConfig::default()
            .apply_overrides([("CONTESTFLOW_CHANNEL_CAPACITY", "lots")])
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidOverride { ref variable, .. } if variable == "CONTESTFLOW_CHANNEL_CAPACITY"
        ));
    }

    #[test]
    fn test_builders_clamp() {
        let config = OrchestratorConfig::new()
            .with_worker_concurrency(0)
            .with_channel_capacity(0);
        assert_eq!(config.worker_concurrency, 1);
        assert_eq!(config.channel_capacity, 1);
    }
}
