//! Unified path management for postkeep files.
//!
//! # Directory Structure
//!
//! ```text
//! ~/.config/postkeep/          # Config directory
//! └── config.toml              # Application configuration
//!
//! ~/.local/share/postkeep/     # Data directory (overridable via `data_dir`)
//! ├── sessions/                # session_<id>.json / sessionapi_<id>.json
//! ├── staging/                 # write-ahead staging snapshots
//! └── logs/                    # postkeep.log.YYYY-MM-DD
//! ```

use postkeep_core::config::AppConfig;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "postkeep";

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// Home directory could not be determined.
    HomeDirNotFound,
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::HomeDirNotFound => write!(f, "Cannot find home directory"),
        }
    }
}

impl std::error::Error for PathError {}

impl From<PathError> for postkeep_core::PostkeepError {
    fn from(err: PathError) -> Self {
        postkeep_core::PostkeepError::config(err.to_string())
    }
}

/// Resolved storage locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostkeepPaths {
    data_dir: PathBuf,
}

impl PostkeepPaths {
    /// Uses an explicit data directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Uses `config.data_dir`, falling back to the platform data directory.
    pub fn from_config(config: &AppConfig) -> Result<Self, PathError> {
        match &config.data_dir {
            Some(dir) => Ok(Self::new(dir.clone())),
            None => Ok(Self::new(Self::default_data_dir()?)),
        }
    }

    /// Returns the default config file path (e.g. `~/.config/postkeep/config.toml`).
    pub fn default_config_file() -> Result<PathBuf, PathError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR).join("config.toml"))
            .ok_or(PathError::HomeDirNotFound)
    }

    /// Returns the default data directory (e.g. `~/.local/share/postkeep`).
    pub fn default_data_dir() -> Result<PathBuf, PathError> {
        dirs::data_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or(PathError::HomeDirNotFound)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.join("sessions")
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.data_dir.join("staging")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}
