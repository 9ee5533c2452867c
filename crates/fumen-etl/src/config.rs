use anyhow::{Context, Result};
use confyg::{env, Confygery};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::persist::DEFAULT_BATCH_SIZE;
use crate::scan::SourceSet;

/// Configuration for fumen.
///
/// Configuration is loaded from multiple sources with the following priority:
/// 1. CLI arguments (highest priority)
/// 2. Environment variables (FUMEN_* prefix)
/// 3. Config file (~/.config/fumen/config.toml)
/// 4. Built-in defaults (lowest priority)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Absolute paths of the chart collections to index.
    ///
    /// Can be set via:
    /// - Config: source_directories = ["/charts/a", "/charts/b"]
    #[serde(default)]
    pub source_directories: Vec<PathBuf>,

    /// Chart file extensions, dotted. Matched exactly.
    #[serde(default = "default_extensions")]
    pub file_extensions: Vec<String>,

    /// Path to the SQLite index.
    ///
    /// Can be set via:
    /// - CLI: --db /path/to/db
    /// - ENV: FUMEN_DATABASE_PATH
    /// - Config: database_path = "/path/to/db"
    /// - Default: ~/.local/share/fumen/fumen.db
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,

    #[serde(default)]
    pub indexer: IndexerOptions,

    #[serde(default)]
    pub logging: twyg::Opts,
}

/// Tuning for an indexing run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerOptions {
    /// Parses in flight at once.
    pub workers: usize,

    /// Records per flush transaction.
    pub batch_size: usize,

    /// Capacity of the path queue and of the result channel.
    pub queue_capacity: usize,

    /// Abort once more than this many files have failed. `None` never aborts.
    pub max_failures: Option<usize>,
}

impl Default for IndexerOptions {
    fn default() -> Self {
        Self {
            workers: 10,
            batch_size: DEFAULT_BATCH_SIZE,
            queue_capacity: 256,
            max_failures: None,
        }
    }
}

impl IndexerOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::InvalidWorkers);
        }
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_directories: Vec::new(),
            file_extensions: default_extensions(),
            database_path: default_db_path(),
            indexer: IndexerOptions::default(),
            logging: twyg::Opts::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default config file and environment
    /// variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from a specific file (if it exists) and
    /// environment variables.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let mut builder = Confygery::new().context("Failed to create config builder")?;

        if config_path.exists() {
            let path_str = config_path
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("Config path contains invalid UTF-8"))?;
            builder
                .add_file(path_str)
                .context("Failed to load config file")?;
        }

        let env_opts = env::Options::with_top_level("fumen");
        builder
            .add_env(env_opts)
            .context("Failed to load environment variables")?;

        let config: Self = builder
            .build()
            .context("Failed to build configuration")?;

        Ok(config)
    }

    /// Validate the source list and indexer options, returning the sources
    /// ready for scanning.
    pub fn source_set(&self) -> Result<SourceSet, ConfigError> {
        self.indexer.validate()?;
        SourceSet::new(
            self.source_directories.clone(),
            self.file_extensions.clone(),
        )
    }
}

fn default_extensions() -> Vec<String> {
    [".bms", ".bme", ".bml", ".pms"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Get the default database path.
///
/// Returns: ~/.local/share/fumen/fumen.db (or platform equivalent)
fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fumen")
        .join("fumen.db")
}

/// Get the config file path.
///
/// Returns:
/// - Linux: ~/.config/fumen/config.toml
/// - macOS: ~/Library/Application Support/fumen/config.toml
/// - Windows: %APPDATA%\fumen\config.toml
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fumen")
        .join("config.toml")
}

/// Get the example config file content.
pub fn example_config() -> &'static str {
    r#"# Fumen Configuration File
#
# Configuration is loaded from multiple sources with the following priority:
# 1. CLI arguments (highest priority)
# 2. Environment variables (FUMEN_* prefix)
# 3. This config file
# 4. Built-in defaults (lowest priority)

# Chart collections to index. Every entry must be an absolute path to an
# existing directory.
source_directories = []

# Chart file extensions, in dotted form. Matching is case-sensitive.
file_extensions = [".bms", ".bme", ".bml", ".pms"]

# Path to the SQLite index
#
# Can also be set via:
# - CLI: fumen --db /custom/path.db index
# - Environment: FUMEN_DATABASE_PATH=/custom/path.db
#
# Default: Platform-specific data directory
#database_path = "/path/to/custom/fumen.db"

[indexer]
# Number of files parsed concurrently
workers = 10
# Records written per transaction
batch_size = 1000
# Capacity of the internal work queues
queue_capacity = 256
# Abort the run once more than this many files have failed
#max_failures = 100
"#
}

/// Create default config file if it doesn't exist.
///
/// Returns true if a new file was created, false if it already existed.
pub fn ensure_config_file(config_path: &Path) -> Result<bool> {
    if config_path.exists() {
        return Ok(false);
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    std::fs::write(config_path, example_config()).context("Failed to write config file")?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.database_path.as_os_str().is_empty());
        assert!(config.source_directories.is_empty());
        assert_eq!(config.file_extensions[0], ".bms");
        assert_eq!(config.indexer.workers, 10);
        assert_eq!(config.indexer.batch_size, 1000);
    }

    #[test]
    fn test_default_config_has_no_sources() {
        let err = Config::default().source_set().unwrap_err();
        assert!(matches!(err, ConfigError::NoSourceDirectories));
    }

    #[test]
    fn test_example_config_parses() {
        let parsed: toml::Value = toml::from_str(example_config()).unwrap();
        assert!(parsed.get("source_directories").is_some());
        assert_eq!(
            parsed["indexer"]["batch_size"].as_integer(),
            Some(1000)
        );
    }

    #[test]
    fn test_indexer_options_validation() {
        let mut options = IndexerOptions::default();
        assert!(options.validate().is_ok());

        options.workers = 0;
        assert!(matches!(options.validate(), Err(ConfigError::InvalidWorkers)));

        options.workers = 1;
        options.batch_size = 0;
        assert!(matches!(
            options.validate(),
            Err(ConfigError::InvalidBatchSize)
        ));
    }

    #[test]
    fn test_source_set_from_valid_config() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config {
            source_directories: vec![temp_dir.path().to_path_buf()],
            ..Config::default()
        };
        let sources = config.source_set().unwrap();
        assert_eq!(sources.roots(), &[temp_dir.path().to_path_buf()]);
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load_from(&temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.indexer, IndexerOptions::default());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            format!(
                "source_directories = [{:?}]\nfile_extensions = [\".bms\"]\n\n[indexer]\nworkers = 3\n",
                temp_dir.path().display().to_string()
            ),
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.source_directories, vec![temp_dir.path().to_path_buf()]);
        assert_eq!(config.file_extensions, vec![".bms".to_string()]);
        assert_eq!(config.indexer.workers, 3);
        assert_eq!(config.indexer.batch_size, 1000);
    }

    #[test]
    fn test_ensure_config_file_creates_once() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("fumen").join("config.toml");
        assert!(ensure_config_file(&path).unwrap());
        assert!(!ensure_config_file(&path).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), example_config());
    }
}
