//! Assessment service configuration.
//!
//! Defaults suit a local run against the bundled rule catalog. Override via
//! environment variables or explicit construction.

use std::path::PathBuf;
use std::time::Duration;

use vigil_policy::DEFAULT_CONFIGURATION_TTL;

/// Default directory of the rule catalog.
pub const DEFAULT_POLICY_DIR: &str = "policies/bundles";

/// Default capacity of the response stream of `assess_evidences`.
pub const DEFAULT_STREAM_BUFFER: usize = 64;

/// Configuration of an assessment service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssessmentConfig {
    /// Directory holding the YAML rule bundles.
    pub policy_dir: PathBuf,
    /// How long a fetched metric configuration is reused.
    pub config_ttl: Duration,
    /// Capacity of bounded response streams.
    pub stream_buffer: usize,
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            policy_dir: PathBuf::from(DEFAULT_POLICY_DIR),
            config_ttl: DEFAULT_CONFIGURATION_TTL,
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }
}

impl AssessmentConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `VIGIL_POLICY_DIR` (default: `policies/bundles`)
    /// - `VIGIL_CONFIG_TTL_SECS` (default: 3600)
    /// - `VIGIL_STREAM_BUFFER` (default: 64, must be positive)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let policy_dir = std::env::var("VIGIL_POLICY_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.policy_dir);
        let config_ttl = env_number("VIGIL_CONFIG_TTL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.config_ttl);
        let stream_buffer = match env_number("VIGIL_STREAM_BUFFER")? {
            Some(0) => return Err(ConfigError::ZeroStreamBuffer),
            Some(n) => usize::try_from(n).map_err(|_| ConfigError::InvalidNumber {
                var: "VIGIL_STREAM_BUFFER".to_string(),
                value: n.to_string(),
            })?,
            None => defaults.stream_buffer,
        };
        Ok(Self {
            policy_dir,
            config_ttl,
            stream_buffer,
        })
    }
}

fn env_number(var: &str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber {
                var: var.to_string(),
                value: raw,
            }),
        Err(_) => Ok(None),
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A numeric variable did not parse.
    #[error("{var} must be a non-negative integer, got {value:?}")]
    InvalidNumber {
        /// Variable name.
        var: String,
        /// The rejected value.
        value: String,
    },

    /// `VIGIL_STREAM_BUFFER` was zero.
    #[error("VIGIL_STREAM_BUFFER must be at least 1")]
    ZeroStreamBuffer,
}
