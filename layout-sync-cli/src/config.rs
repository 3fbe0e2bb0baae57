use layout_sync_core::SchedulerConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

fn default_interval_secs() -> u64 {
    30
}

fn default_max_interval_secs() -> u64 {
    180
}

/// Sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Layouts server URL (e.g., "http://localhost:8080")
    pub server_url: Option<String>,
    /// API key for authentication
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Sync before read commands and after write commands (default: false)
    #[serde(default)]
    pub auto_sync: bool,
    /// Seconds between sync passes in watch mode
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Upper bound of the retry backoff in seconds
    #[serde(default = "default_max_interval_secs")]
    pub max_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            api_key: None,
            auto_sync: false,
            interval_secs: default_interval_secs(),
            max_interval_secs: default_max_interval_secs(),
        }
    }
}

impl SyncConfig {
    /// Returns true if sync is configured (has both server_url and api_key)
    pub fn is_configured(&self) -> bool {
        self.server_url.is_some() && self.api_key.is_some()
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::new(
            Duration::from_secs(self.interval_secs.max(1)),
            Duration::from_secs(self.max_interval_secs),
        )
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Path to the SQLite database
    pub database_path: ConfigValue<PathBuf>,
    /// Namespace (user or organization) the layouts belong to
    pub namespace: ConfigValue<String>,
    /// Default parent for new layouts
    pub parent: ConfigValue<String>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    /// Sync configuration
    pub sync: SyncConfig,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    database_path: Option<PathBuf>,
    namespace: Option<String>,
    parent: Option<String>,
    sync: Option<SyncConfig>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let default_db_path = Self::default_data_dir().join("layouts.db");

        let mut database_path = ConfigValue::new(default_db_path, ConfigSource::Default);
        let mut namespace = ConfigValue::new("default".to_string(), ConfigSource::Default);
        let mut parent = ConfigValue::new("default".to_string(), ConfigSource::Default);
        let mut config_file = None;
        let mut sync = SyncConfig::default();

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(db_path) = file_config.database_path {
                // Resolve relative paths against config file's directory
                let resolved_path = if db_path.is_relative() {
                    path.parent().map(|p| p.join(&db_path)).unwrap_or(db_path)
                } else {
                    db_path
                };
                database_path = ConfigValue::new(resolved_path, ConfigSource::File);
            }
            if let Some(ns) = file_config.namespace {
                namespace = ConfigValue::new(ns, ConfigSource::File);
            }
            if let Some(p) = file_config.parent {
                parent = ConfigValue::new(p, ConfigSource::File);
            }
            if let Some(sync_config) = file_config.sync {
                sync = sync_config;
            }
        }

        if let Ok(db_path) = std::env::var("LAYOUTS_DATABASE_PATH") {
            database_path = ConfigValue::new(PathBuf::from(db_path), ConfigSource::Environment);
        }
        if let Ok(ns) = std::env::var("LAYOUTS_NAMESPACE") {
            namespace = ConfigValue::new(ns, ConfigSource::Environment);
        }
        if let Ok(p) = std::env::var("LAYOUTS_PARENT") {
            parent = ConfigValue::new(p, ConfigSource::Environment);
        }
        if let Ok(url) = std::env::var("LAYOUTS_SYNC_URL") {
            sync.server_url = Some(url);
        }
        if let Ok(key) = std::env::var("LAYOUTS_SYNC_API_KEY") {
            sync.api_key = Some(key);
        }

        Ok(Self {
            database_path,
            namespace,
            parent,
            config_file,
            sync,
        })
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/layouts/
    /// - macOS: ~/Library/Application Support/layouts/
    /// - Windows: %APPDATA%/layouts/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("layouts")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/layouts/
    /// - macOS: ~/Library/Application Support/layouts/
    /// - Windows: %APPDATA%/layouts/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("layouts")
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
