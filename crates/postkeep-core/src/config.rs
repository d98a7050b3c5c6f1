//! Application configuration model.
//!
//! Loaded from `config.toml` by the infrastructure layer. Every field has a
//! default so a missing or partial file is valid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Root for session files, staging and logs. `None` means the platform data dir.
    pub data_dir: Option<PathBuf>,
    pub lock: LockConfig,
    pub staging: StagingConfig,
    pub shared: SharedConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LockConfig {
    pub poll_interval_ms: u64,
    pub acquire_timeout_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            acquire_timeout_ms: 30_000,
        }
    }
}

impl LockConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct StagingConfig {
    /// Clear snapshots left by a previous process run on startup.
    pub purge_on_start: bool,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            purge_on_start: true,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SharedConfig {
    pub enabled: bool,
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            api_key: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub desired_count: usize,
    pub batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            desired_count: 100,
            batch_size: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [shared]
            enabled = true
            url = "https://store.example"
            "#,
        )
        .unwrap();

        assert!(config.shared.enabled);
        assert_eq!(config.shared.timeout_secs, 10);
        assert_eq!(config.lock.poll_interval_ms, 100);
        assert!(config.staging.purge_on_start);
        assert_eq!(config.pipeline.desired_count, 100);
    }

    #[test]
    fn test_empty_toml() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config, AppConfig::default());
    }
}
