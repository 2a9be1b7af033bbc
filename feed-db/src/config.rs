use feed_ref::UserId;
use serde_derive::{Deserialize, Serialize};
use std::{fs, io, ops::RangeInclusive, path::Path, time::Duration};
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("Failed to read config file, cause: {0}")]
    ReadFile(#[source] io::Error),
    #[error("Json error, cause: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub page_size: usize,
    pub remote: RemoteConfig,
    pub muted_authors: Vec<UserId>,
    pub muted_keywords: Vec<String>,
}

/// Behaviour of the simulated backend.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoteConfig {
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    pub failure_rate: f64,
    pub timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            page_size: 10,
            remote: RemoteConfig::default(),
            muted_authors: Vec::new(),
            muted_keywords: Vec::new(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            min_latency_ms: 300,
            max_latency_ms: 800,
            failure_rate: 0.05,
            timeout_ms: 5000,
        }
    }
}

impl Config {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("pageSize must be at least 1".into()));
        }
        self.remote.validate()
    }
}

impl RemoteConfig {
    /// No latency, no failures. Used by tests and scripted demos.
    pub fn instant() -> Self {
        RemoteConfig {
            min_latency_ms: 0,
            max_latency_ms: 0,
            failure_rate: 0.0,
            timeout_ms: RemoteConfig::default().timeout_ms,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_latency_ms > self.max_latency_ms {
            return Err(ConfigError::Invalid(format!(
                "remote.minLatencyMs ({}) exceeds remote.maxLatencyMs ({})",
                self.min_latency_ms, self.max_latency_ms
            )));
        }
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(ConfigError::Invalid(format!(
                "remote.failureRate must lie in [0, 1], got {}",
                self.failure_rate
            )));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid("remote.timeoutMs must be at least 1".into()));
        }
        Ok(())
    }

    pub fn latency_range(&self) -> RangeInclusive<u64> {
        self.min_latency_ms..=self.max_latency_ms
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
