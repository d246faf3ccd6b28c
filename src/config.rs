use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::remote::{FileGateway, HttpGateway, RemoteGateway};
use crate::sync::SyncOptions;

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

/// Where the remote catalog lives. `url` wins over `catalog_path` when both are set.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RemoteConfig {
    /// Catalog server base URL (e.g., "http://localhost:8080")
    pub url: Option<String>,
    /// Published catalog snapshot on disk
    pub catalog_path: Option<PathBuf>,
    /// Bearer key sent to the catalog server
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl RemoteConfig {
    /// Returns true if a remote source is configured
    pub fn is_configured(&self) -> bool {
        self.url.is_some() || self.catalog_path.is_some()
    }
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_max_concurrent_fetches() -> usize {
    4
}

/// Sync behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Run an incremental sync before read commands (default: false)
    #[serde(default)]
    pub auto_sync: bool,
    /// Per-request timeout for remote fetches
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Category subtrees fetched concurrently
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_sync: false,
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
        }
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Path to the SQLite catalog cache
    pub database_path: ConfigValue<PathBuf>,
    /// Path to the sync bookkeeping file
    pub state_path: ConfigValue<PathBuf>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    pub remote: RemoteConfig,
    pub sync: SyncConfig,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    database_path: Option<PathBuf>,
    state_path: Option<PathBuf>,
    remote: Option<RemoteConfig>,
    sync: Option<SyncConfig>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let data_dir = Self::default_data_dir();

        // Start with defaults
        let mut database_path =
            ConfigValue::new(data_dir.join("catalog.db"), ConfigSource::Default);
        let mut state_path =
            ConfigValue::new(data_dir.join("sync_state.json"), ConfigSource::Default);
        let mut config_file = None;
        let mut remote = RemoteConfig::default();
        let mut sync = SyncConfig::default();

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(db_path) = file_config.database_path {
                database_path = ConfigValue::new(resolve(&path, db_path), ConfigSource::File);
            }
            if let Some(file_state_path) = file_config.state_path {
                state_path = ConfigValue::new(resolve(&path, file_state_path), ConfigSource::File);
            }
            if let Some(mut remote_config) = file_config.remote {
                remote_config.catalog_path =
                    remote_config.catalog_path.map(|p| resolve(&path, p));
                remote = remote_config;
            }
            if let Some(sync_config) = file_config.sync {
                sync = sync_config;
            }
        }

        // Apply environment variable overrides
        if let Ok(db_path) = std::env::var("GAMESYNC_DATABASE_PATH") {
            database_path = ConfigValue::new(PathBuf::from(db_path), ConfigSource::Environment);
        }
        if let Ok(env_state_path) = std::env::var("GAMESYNC_STATE_PATH") {
            state_path =
                ConfigValue::new(PathBuf::from(env_state_path), ConfigSource::Environment);
        }
        if let Ok(url) = std::env::var("GAMESYNC_REMOTE_URL") {
            remote.url = Some(url);
        }
        if let Ok(catalog) = std::env::var("GAMESYNC_CATALOG_PATH") {
            remote.catalog_path = Some(PathBuf::from(catalog));
        }
        if let Ok(key) = std::env::var("GAMESYNC_API_KEY") {
            remote.api_key = Some(key);
        }

        Ok(Self {
            database_path,
            state_path,
            config_file,
            remote,
            sync,
        })
    }

    /// Builds the gateway for the configured remote source.
    pub fn remote_gateway(&self) -> Result<Arc<dyn RemoteGateway>, ConfigError> {
        if let Some(url) = &self.remote.url {
            let gateway = HttpGateway::new(
                url.clone(),
                self.remote.api_key.clone(),
                self.fetch_timeout(),
            )
            .map_err(|e| ConfigError::InvalidRemote(e.to_string()))?;
            return Ok(Arc::new(gateway));
        }
        if let Some(path) = &self.remote.catalog_path {
            return Ok(Arc::new(FileGateway::new(path.clone())));
        }
        Err(ConfigError::RemoteNotConfigured)
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            fetch_timeout: self.fetch_timeout(),
            max_concurrent_fetches: self.sync.max_concurrent_fetches.max(1),
        }
    }

    fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.sync.fetch_timeout_secs)
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/gamesync/
    /// - macOS: ~/Library/Application Support/gamesync/
    /// - Windows: %APPDATA%/gamesync/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gamesync")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/gamesync/
    /// - macOS: ~/Library/Application Support/gamesync/
    /// - Windows: %APPDATA%/gamesync/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gamesync")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

/// Resolve relative paths against the config file's directory
fn resolve(config_path: &Path, value: PathBuf) -> PathBuf {
    if value.is_relative() {
        config_path
            .parent()
            .map(|p| p.join(&value))
            .unwrap_or(value)
    } else {
        value
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    RemoteNotConfigured,
    InvalidRemote(String),
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
            ConfigError::RemoteNotConfigured => write!(
                f,
                "No remote configured. Set remote.url or remote.catalog_path, or GAMESYNC_REMOTE_URL / GAMESYNC_CATALOG_PATH"
            ),
            ConfigError::InvalidRemote(msg) => write!(f, "Invalid remote configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
