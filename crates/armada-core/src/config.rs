use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ArmadaError, Result};

/// Top-level Armada configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArmadaConfig {
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Agent directory and health sweep settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Sweep interval T. Agents silent for more than 2T go offline.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    /// Agents at or below this health are never returned as candidates.
    #[serde(default = "default_min_health")]
    pub min_health: f64,
    /// Health lost per missed interval.
    #[serde(default = "default_decay_per_interval")]
    pub decay_per_interval: f64,
    /// One-time penalty applied when the sweep marks an agent offline.
    #[serde(default = "default_offline_penalty")]
    pub offline_penalty: f64,
}

impl DirectoryConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval(),
            min_health: default_min_health(),
            decay_per_interval: default_decay_per_interval(),
            offline_penalty: default_offline_penalty(),
        }
    }
}

fn default_heartbeat_interval() -> u64 { 30 }
fn default_min_health() -> f64 { 70.0 }
fn default_decay_per_interval() -> f64 { 5.0 }
fn default_offline_penalty() -> f64 { 20.0 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Used when a requirement does not set `min_reliability`.
    #[serde(default = "default_min_reliability")]
    pub default_min_reliability: f64,
    /// Wave size for batch scheduling.
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_min_reliability: default_min_reliability(),
            batch_concurrency: default_batch_concurrency(),
        }
    }
}

fn default_min_reliability() -> f64 { 0.8 }
fn default_batch_concurrency() -> usize { 5 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How long terminal executions stay queryable.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    /// Applied to steps that do not declare `timeout_ms`.
    #[serde(default = "default_step_timeout_ms")]
    pub default_step_timeout_ms: u64,
}

impl EngineConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention_secs(),
            default_step_timeout_ms: default_step_timeout_ms(),
        }
    }
}

fn default_retention_secs() -> u64 { 60 }
fn default_step_timeout_ms() -> u64 { 30_000 }

/// Logging configuration. `RUST_LOG` takes precedence over `filter`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String { "armada=info,warn".to_string() }

impl ArmadaConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| ArmadaError::ConfigNotFound(path.display().to_string()))?;

        let config = Self::parse(&content)?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Parse config from TOML text, with env var expansion.
    pub fn parse(content: &str) -> Result<Self> {
        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(content);

        let config: Self =
            toml::from_str(&expanded).map_err(|e| ArmadaError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.directory.heartbeat_interval_secs == 0 {
            return Err(ArmadaError::Config(
                "directory.heartbeat_interval_secs must be positive".into(),
            ));
        }
        if self.scheduler.batch_concurrency == 0 {
            return Err(ArmadaError::Config(
                "scheduler.batch_concurrency must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.scheduler.default_min_reliability) {
            return Err(ArmadaError::Config(
                "scheduler.default_min_reliability must be within [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_ARMADA_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_ARMADA_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_ARMADA_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_ARMADA_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_ARMADA_VAR}\"");
    }

    #[test]
    fn test_defaults_from_empty_toml() {
        let config = ArmadaConfig::parse("").unwrap();
        assert_eq!(config.directory.heartbeat_interval_secs, 30);
        assert_eq!(config.directory.min_health, 70.0);
        assert_eq!(config.directory.decay_per_interval, 5.0);
        assert_eq!(config.directory.offline_penalty, 20.0);
        assert_eq!(config.scheduler.default_min_reliability, 0.8);
        assert_eq!(config.scheduler.batch_concurrency, 5);
        assert_eq!(config.engine.retention_secs, 60);
        assert_eq!(config.engine.default_step_timeout_ms, 30_000);
        assert_eq!(config.log.filter, "armada=info,warn");
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = ArmadaConfig::parse(
            r#"
[scheduler]
batch_concurrency = 8
"#,
        )
        .unwrap();
        assert_eq!(config.scheduler.batch_concurrency, 8);
        assert_eq!(config.scheduler.default_min_reliability, 0.8);
    }

    #[test]
    fn test_rejects_zero_interval() {
        let err = ArmadaConfig::parse(
            r#"
[directory]
heartbeat_interval_secs = 0
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ArmadaError::Config(_)));
    }

    #[test]
    fn test_rejects_out_of_range_reliability() {
        let err = ArmadaConfig::parse(
            r#"
[scheduler]
default_min_reliability = 1.5
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("default_min_reliability"));
    }
}
