//! Governance configuration
//!
//! Quorum and approval thresholds are expressed in basis points
//! (10000 = 100%) and are fixed when the engine is constructed.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Denominator for all basis-point values
pub const BPS_DENOMINATOR: u16 = 10_000;

/// Errors that can occur in configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidEnvVar(String, String),

    #[error("Failed to read file: {0}")]
    FileReadError(String),

    #[error("Failed to write file: {0}")]
    FileWriteError(String),

    #[error("Failed to parse YAML: {0}")]
    YamlParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Parameters of the voting engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceConfig {
    /// Share of current members that must vote, in basis points
    #[serde(default = "default_quorum_bps")]
    pub quorum_bps: u16,
    /// Share of cast votes that must be For, in basis points
    #[serde(default = "default_approval_bps")]
    pub approval_bps: u16,
    /// Voting period used when a submission does not name one (seconds)
    #[serde(default = "default_voting_period")]
    pub default_voting_period: u64,
    #[serde(default = "default_min_voting_period")]
    pub min_voting_period: u64,
    #[serde(default = "default_max_voting_period")]
    pub max_voting_period: u64,
    /// Upper bound on a single ActionExecutor call (seconds)
    #[serde(default = "default_execution_timeout_secs")]
    pub execution_timeout_secs: u64,
    /// Buffered notifications per subscriber before it starts lagging
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_quorum_bps() -> u16 {
    5_000
}

fn default_approval_bps() -> u16 {
    5_000
}

fn default_voting_period() -> u64 {
    86_400 // 24 hours
}

fn default_min_voting_period() -> u64 {
    60
}

fn default_max_voting_period() -> u64 {
    604_800 // 7 days
}

fn default_execution_timeout_secs() -> u64 {
    30
}

fn default_event_channel_capacity() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            quorum_bps: default_quorum_bps(),
            approval_bps: default_approval_bps(),
            default_voting_period: default_voting_period(),
            min_voting_period: default_min_voting_period(),
            max_voting_period: default_max_voting_period(),
            execution_timeout_secs: default_execution_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            log_level: default_log_level(),
        }
    }
}

impl GovernanceConfig {
    /// Create a config with the given thresholds and default periods
    pub fn with_thresholds(quorum_bps: u16, approval_bps: u16) -> Self {
        Self {
            quorum_bps,
            approval_bps,
            ..Self::default()
        }
    }

    /// Load configuration from the process environment.
    ///
    /// If `QUORUM_CONFIG_FILE` names an existing file it is loaded instead;
    /// otherwise each `QUORUM_*` variable overrides the matching default.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = env::var("QUORUM_CONFIG_FILE") {
            if Path::new(&path).exists() {
                return Self::from_file(&path);
            }
        }

        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build configuration from a variable lookup
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = parse_var(&lookup, "QUORUM_QUORUM_BPS")? {
            config.quorum_bps = v;
        }
        if let Some(v) = parse_var(&lookup, "QUORUM_APPROVAL_BPS")? {
            config.approval_bps = v;
        }
        if let Some(v) = parse_var(&lookup, "QUORUM_DEFAULT_VOTING_PERIOD")? {
            config.default_voting_period = v;
        }
        if let Some(v) = parse_var(&lookup, "QUORUM_MIN_VOTING_PERIOD")? {
            config.min_voting_period = v;
        }
        if let Some(v) = parse_var(&lookup, "QUORUM_MAX_VOTING_PERIOD")? {
            config.max_voting_period = v;
        }
        if let Some(v) = parse_var(&lookup, "QUORUM_EXECUTION_TIMEOUT_SECS")? {
            config.execution_timeout_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "QUORUM_EVENT_CHANNEL_CAPACITY")? {
            config.event_channel_capacity = v;
        }
        if let Some(level) = lookup("QUORUM_LOG_LEVEL") {
            config.log_level = level;
        }

        config.validate()?;
        debug!("Loaded governance config from environment: {:?}", config);
        Ok(config)
    }

    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            ConfigError::FileReadError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: GovernanceConfig = serde_yaml::from_str(&contents)?;
        config.validate()?;
        info!("Loaded governance config from {}", path.display());
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let contents = serde_yaml::to_string(self)?;
        fs::write(path, contents).map_err(|e| {
            ConfigError::FileWriteError(format!("Failed to write {}: {}", path.display(), e))
        })
    }

    /// Check the thresholds and period bounds for consistency
    pub fn validate(&self) -> Result<()> {
        if self.quorum_bps > BPS_DENOMINATOR {
            return Err(ConfigError::InvalidConfig(format!(
                "quorum_bps must be at most {}, got {}",
                BPS_DENOMINATOR, self.quorum_bps
            )));
        }

        if self.approval_bps > BPS_DENOMINATOR {
            return Err(ConfigError::InvalidConfig(format!(
                "approval_bps must be at most {}, got {}",
                BPS_DENOMINATOR, self.approval_bps
            )));
        }

        if self.min_voting_period == 0 {
            return Err(ConfigError::InvalidConfig(
                "min_voting_period must be greater than zero".to_string(),
            ));
        }

        if self.min_voting_period > self.max_voting_period {
            return Err(ConfigError::InvalidConfig(format!(
                "min_voting_period ({}) exceeds max_voting_period ({})",
                self.min_voting_period, self.max_voting_period
            )));
        }

        if !(self.min_voting_period..=self.max_voting_period).contains(&self.default_voting_period) {
            return Err(ConfigError::InvalidConfig(format!(
                "default_voting_period ({}) must lie within [{}, {}]",
                self.default_voting_period, self.min_voting_period, self.max_voting_period
            )));
        }

        if self.execution_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "execution_timeout_secs must be greater than zero".to_string(),
            ));
        }

        if self.event_channel_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "event_channel_capacity must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// The executor timeout as a Duration
    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = GovernanceConfig::default();
        assert_eq!(config.quorum_bps, 5_000);
        assert_eq!(config.approval_bps, 5_000);
        assert_eq!(config.default_voting_period, 86_400);
        assert_eq!(config.min_voting_period, 60);
        assert_eq!(config.max_voting_period, 604_800);
        assert_eq!(config.execution_timeout(), Duration::from_secs(30));
        assert_eq!(config.log_level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = GovernanceConfig::from_vars(lookup_from(&[
            ("QUORUM_QUORUM_BPS", "6600"),
            ("QUORUM_APPROVAL_BPS", " 5000 "),
            ("QUORUM_MIN_VOTING_PERIOD", "10"),
            ("QUORUM_LOG_LEVEL", "debug"),
        ]))
        .unwrap();

        assert_eq!(config.quorum_bps, 6_600);
        assert_eq!(config.approval_bps, 5_000);
        assert_eq!(config.min_voting_period, 10);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_env_rejects_garbage() {
        let err = GovernanceConfig::from_vars(lookup_from(&[("QUORUM_QUORUM_BPS", "lots")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(key, _) if key == "QUORUM_QUORUM_BPS"));
    }

    #[test]
    fn test_validate_rejects_out_of_range_bps() {
        let config = GovernanceConfig::with_thresholds(10_001, 5_000);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidConfig(_))));

        let config = GovernanceConfig::with_thresholds(5_000, 20_000);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidConfig(_))));

        assert!(GovernanceConfig::with_thresholds(0, 10_000).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_periods() {
        let mut config = GovernanceConfig::default();
        config.min_voting_period = 0;
        assert!(config.validate().is_err());

        let mut config = GovernanceConfig::default();
        config.default_voting_period = config.max_voting_period + 1;
        assert!(config.validate().is_err());

        let mut config = GovernanceConfig::default();
        config.min_voting_period = 1_000;
        config.max_voting_period = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_file_round_trip_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("governance.yaml");
        std::fs::write(&path, "quorum_bps: 6600\napproval_bps: 5000\n").unwrap();

        let config = GovernanceConfig::from_file(&path).unwrap();
        assert_eq!(config.quorum_bps, 6_600);
        assert_eq!(config.default_voting_period, 86_400);

        let saved = dir.path().join("saved.yaml");
        config.save_to_file(&saved).unwrap();
        assert_eq!(GovernanceConfig::from_file(&saved).unwrap(), config);
    }

    #[test]
    fn test_missing_file_is_a_read_error() {
        let err = GovernanceConfig::from_file("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::FileReadError(_)));
    }
}
