//! CLI configuration

use super::utils::expand_home;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CLI configuration
///
/// Minimal configuration for the CLI that only specifies where to find the notes directory.
/// Other configuration (templates, search, caches) lives in LibraryConfig within the notes directory.
#[derive(Debug, Serialize, Deserialize)]
pub struct CLIConfig {
    pub notes_dir: PathBuf,
}

impl CLIConfig {
    /// Load config from the specified path, expanding `~` in `notes_dir`
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: CLIConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        let notes_dir = config.notes_dir.to_string_lossy();
        Ok(Self {
            notes_dir: expand_home(&notes_dir)?,
        })
    }

    /// Load the config file from $NOTEWEAVE_CONFIG or the default location
    ///
    /// Returns `None` when no config file exists.
    pub fn resolve_and_load() -> Result<Option<Self>> {
        let path = if let Ok(env_path) = std::env::var("NOTEWEAVE_CONFIG") {
            PathBuf::from(env_path)
        } else {
            Self::default_config_path()?
        };

        if !path.exists() {
            tracing::debug!("No CLI config at {}", path.display());
            return Ok(None);
        }

        Self::load(&path).map(Some)
    }

    /// Get the default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            PathBuf::from(xdg_config)
        } else {
            let home =
                std::env::var("HOME").context("HOME environment variable not set")?;
            PathBuf::from(home).join(".config")
        };

        Ok(config_dir.join("noteweave").join("config.toml"))
    }
}
