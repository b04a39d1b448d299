//! Library configuration
//!
//! Configuration that lives within the notes directory itself,
//! making each notes directory self-contained and portable.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::storage::Storage;

/// Library configuration loaded from the notes directory
///
/// This configuration is stored within the notes directory (at .noteweave/config.toml
/// or config.toml) and contains settings specific to that notes collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    #[serde(default = "default_template_dir")]
    pub template_dir: PathBuf,
    #[serde(default = "default_bundle_dir")]
    pub bundle_dir: PathBuf,
    /// File extensions (without the dot) treated as notes
    #[serde(default = "default_note_extensions")]
    pub note_extensions: Vec<String>,
    /// Wildcard patterns for relative paths excluded from corpus scans
    #[serde(default)]
    pub ignore: Vec<String>,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Search tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f64,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_preview_length")]
    pub preview_length: usize,
}

/// Cache staleness settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            relevance_threshold: default_relevance_threshold(),
            max_results: default_max_results(),
            preview_length: default_preview_length(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_template_dir() -> PathBuf {
    PathBuf::from(".templates")
}

fn default_bundle_dir() -> PathBuf {
    PathBuf::from(".noteweave/bundles")
}

fn default_note_extensions() -> Vec<String> {
    vec!["md".to_string(), "markdown".to_string()]
}

fn default_relevance_threshold() -> f64 {
    0.5
}

fn default_max_results() -> usize {
    50
}

fn default_preview_length() -> usize {
    120
}

fn default_ttl_secs() -> u64 {
    300
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            template_dir: default_template_dir(),
            bundle_dir: default_bundle_dir(),
            note_extensions: default_note_extensions(),
            ignore: Vec::new(),
            search: SearchConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl LibraryConfig {
    /// Load library config from storage
    ///
    /// Looks for .noteweave/config.toml or config.toml in the notes directory
    pub fn load(storage: &dyn Storage) -> Result<Self> {
        // Try .noteweave/config.toml first (preferred location)
        if storage.exists(Path::new(".noteweave/config.toml")) {
            let content = storage.read_to_string(Path::new(".noteweave/config.toml"))?;
            return toml::from_str(&content).context("Failed to parse .noteweave/config.toml");
        }

        // Fall back to config.toml in root
        if storage.exists(Path::new("config.toml")) {
            let content = storage.read_to_string(Path::new("config.toml"))?;
            return toml::from_str(&content).context("Failed to parse config.toml");
        }

        anyhow::bail!("No library config found. Expected .noteweave/config.toml or config.toml")
    }

    /// Load config or return defaults if not found
    pub fn load_or_default(storage: &dyn Storage) -> Self {
        match Self::load(storage) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!("Using default library config: {:#}", e);
                Self::default()
            }
        }
    }

    /// Get the template directory path (relative to notes directory)
    pub fn template_dir_path(&self) -> &Path {
        &self.template_dir
    }

    /// The extension given to newly created notes
    pub fn default_extension(&self) -> &str {
        self.note_extensions
            .first()
            .map(String::as_str)
            .unwrap_or("md")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn test_load_config_from_noteweave_dir() {
        let storage = MemoryStorage::new();
        storage
            .write(
                Path::new(".noteweave/config.toml"),
                r#"
template_dir = "my-templates"
ignore = ["archive/*"]

[search]
relevance_threshold = 0.3
"#,
            )
            .unwrap();

        let config = LibraryConfig::load(&storage).unwrap();
        assert_eq!(config.template_dir, PathBuf::from("my-templates"));
        assert_eq!(config.ignore, vec!["archive/*"]);
        assert_eq!(config.search.relevance_threshold, 0.3);
        assert_eq!(config.search.max_results, 50);
    }

    #[test]
    fn test_load_config_from_root() {
        let storage = MemoryStorage::new();
        storage
            .write(
                Path::new("config.toml"),
                r#"
note_extensions = ["txt", "md"]

[cache]
ttl_secs = 10
"#,
            )
            .unwrap();

        let config = LibraryConfig::load(&storage).unwrap();
        assert_eq!(config.note_extensions, vec!["txt", "md"]);
        assert_eq!(config.default_extension(), "txt");
        assert_eq!(config.cache.ttl(), Duration::from_secs(10));
    }

    #[test]
    fn test_load_or_default_with_no_config() {
        let storage = MemoryStorage::new();
        let config = LibraryConfig::load_or_default(&storage);

        assert_eq!(config.template_dir, PathBuf::from(".templates"));
        assert_eq!(config.bundle_dir, PathBuf::from(".noteweave/bundles"));
        assert_eq!(config.note_extensions, vec!["md", "markdown"]);
        assert_eq!(config.search.relevance_threshold, 0.5);
        assert_eq!(config.cache.ttl_secs, 300);
    }

    #[test]
    fn test_prefers_noteweave_dir_over_root() {
        let storage = MemoryStorage::new();
        storage
            .write(
                Path::new("config.toml"),
                r#"template_dir = "root-templates""#,
            )
            .unwrap();
        storage
            .write(
                Path::new(".noteweave/config.toml"),
                r#"template_dir = "noteweave-templates""#,
            )
            .unwrap();

        let config = LibraryConfig::load(&storage).unwrap();
        assert_eq!(config.template_dir, PathBuf::from("noteweave-templates"));
    }
}
