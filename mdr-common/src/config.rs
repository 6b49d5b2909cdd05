//! Configuration loading and root folder resolution
//!
//! Two tiers:
//! 1. **TOML bootstrap**: root folder, file names, logging (read once at startup)
//! 2. **Persisted stores**: user preferences and feature flags (local file + database)
//!
//! Missing or unreadable TOML never aborts startup: a warning is logged and
//! compiled defaults are used.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "MDR_ROOT_FOLDER";

/// Default SQLite file name inside the root folder
pub const DEFAULT_DATABASE_FILE: &str = "mdr.db";

/// Default local preference store file name inside the root folder
pub const DEFAULT_LOCAL_STORE_FILE: &str = "local_storage.json";

/// Default broadcast capacity for the event bus
pub const DEFAULT_EVENT_BUS_CAPACITY: usize = 256;

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    /// Root folder holding the database and local store (optional)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Database file name or absolute path
    #[serde(default)]
    pub database_file: Option<PathBuf>,

    /// Local store file name or absolute path
    #[serde(default)]
    pub local_store_file: Option<PathBuf>,

    /// Event bus capacity
    #[serde(default)]
    pub event_bus_capacity: Option<usize>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Parse TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load from a file path, falling back to defaults on any failure
    pub fn load_or_default(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match Self::from_toml_str(&content) {
                Ok(config) => {
                    info!("Loaded configuration from {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("Invalid config file {}: {}, using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                warn!("Config file {} not found, using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Load from the platform config location (`<config_dir>/mdr/config.toml`)
    pub fn load_default_location() -> Self {
        match default_config_file() {
            Some(path) => Self::load_or_default(&path),
            None => {
                warn!("Could not determine config directory, using defaults");
                Self::default()
            }
        }
    }

    pub fn event_bus_capacity(&self) -> usize {
        self.event_bus_capacity.unwrap_or(DEFAULT_EVENT_BUS_CAPACITY)
    }
}

/// Platform config file path
pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("mdr").join("config.toml"))
}

/// Root folder resolution, priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("mdr"))
        .unwrap_or_else(|| PathBuf::from("./mdr_data"))
}

/// Resolved file locations for one process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub root_folder: PathBuf,
    pub database_path: PathBuf,
    pub local_store_path: PathBuf,
}

impl AppPaths {
    pub fn resolve(root_folder: PathBuf, toml: &TomlConfig) -> Self {
        let join = |configured: &Option<PathBuf>, default: &str| match configured {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => root_folder.join(p),
            None => root_folder.join(default),
        };
        let database_path = join(&toml.database_file, DEFAULT_DATABASE_FILE);
        let local_store_path = join(&toml.local_store_file, DEFAULT_LOCAL_STORE_FILE);
        Self {
            root_folder,
            database_path,
            local_store_path,
        }
    }

    /// Create the root folder if it doesn't exist
    pub fn ensure_root_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            info!("Created root folder: {}", self.root_folder.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_toml() {
        let config = TomlConfig::from_toml_str(
            r#"
            root_folder = "/srv/mdr"
            database_file = "data.db"
            event_bus_capacity = 64

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.root_folder, Some(PathBuf::from("/srv/mdr")));
        assert_eq!(config.event_bus_capacity(), 64);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert!(config.root_folder.is_none());
        assert_eq!(config.event_bus_capacity(), DEFAULT_EVENT_BUS_CAPACITY);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = TomlConfig::from_toml_str("root_folder = [").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_app_paths_relative_and_absolute() {
        let toml = TomlConfig {
            local_store_file: Some(PathBuf::from("/tmp/elsewhere.json")),
            ..Default::default()
        };
        let paths = AppPaths::resolve(PathBuf::from("/data/mdr"), &toml);
        assert_eq!(paths.database_path, PathBuf::from("/data/mdr/mdr.db"));
        assert_eq!(paths.local_store_path, PathBuf::from("/tmp/elsewhere.json"));
    }
}
