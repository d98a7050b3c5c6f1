//! Configuration service implementation.
//!
//! Loads [`AppConfig`] from `config.toml` (default
//! `~/.config/postkeep/config.toml`) and applies `POSTKEEP_*` environment
//! overrides.

use crate::paths::PostkeepPaths;
use postkeep_core::config::AppConfig;
use postkeep_core::{PostkeepError, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

pub const ENV_DATA_DIR: &str = "POSTKEEP_DATA_DIR";
pub const ENV_SHARED_URL: &str = "POSTKEEP_SHARED_URL";
pub const ENV_SHARED_API_KEY: &str = "POSTKEEP_SHARED_API_KEY";

/// Configuration service that loads and caches the root configuration.
#[derive(Debug, Clone)]
pub struct ConfigService {
    path: Option<PathBuf>,
    /// Cached configuration, loaded lazily.
    config: Arc<RwLock<Option<AppConfig>>>,
}

impl ConfigService {
    /// Creates a service reading `path`, or the default location when `None`.
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            config: Arc::new(RwLock::new(None)),
        }
    }

    /// Gets the configuration, loading it on first access.
    pub fn get_config(&self) -> Result<AppConfig> {
        {
            let read_lock = self.config.read().unwrap_or_else(|e| e.into_inner());
            if let Some(ref cached) = *read_lock {
                return Ok(cached.clone());
            }
        }

        let path = match &self.path {
            Some(path) => path.clone(),
            None => PostkeepPaths::default_config_file()?,
        };
        let mut loaded = Self::load_from(&path)?;
        apply_overrides(&mut loaded, |name| std::env::var(name).ok());

        {
            let mut write_lock = self.config.write().unwrap_or_else(|e| e.into_inner());
            *write_lock = Some(loaded.clone());
        }

        Ok(loaded)
    }

    /// Invalidates the cache, forcing a reload on next access.
    pub fn invalidate_cache(&self) {
        let mut write_lock = self.config.write().unwrap_or_else(|e| e.into_inner());
        *write_lock = None;
    }

    /// Reads a config file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<AppConfig> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("[Config] {} not found, using defaults", path.display());
                return Ok(AppConfig::default());
            }
            Err(e) => return Err(e.into()),
        };

        toml::from_str(&content).map_err(|e| {
            PostkeepError::config(format!("invalid config {}: {}", path.display(), e))
        })
    }
}

impl Default for ConfigService {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Applies environment overrides using `lookup` to read variables.
///
/// Setting a shared URL also enables the shared backend.
pub fn apply_overrides<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(dir) = lookup(ENV_DATA_DIR).filter(|v| !v.is_empty()) {
        config.data_dir = Some(PathBuf::from(dir));
    }
    if let Some(url) = lookup(ENV_SHARED_URL).filter(|v| !v.is_empty()) {
        config.shared.url = Some(url);
        config.shared.enabled = true;
    }
    if let Some(key) = lookup(ENV_SHARED_API_KEY).filter(|v| !v.is_empty()) {
        config.shared.api_key = Some(key);
    }
}
