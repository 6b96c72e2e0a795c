//! Configuration management for wlink
//!
//! This module handles loading, saving, and validating configuration for the
//! wlink CLI. Configuration is stored in TOML format.
//!
//! # Configuration File Locations
//!
//! - Unix: `~/.config/wlink/config.toml`
//! - Windows: `%APPDATA%\wlink\config.toml`

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use wlink_core::{AppMetadata, WalletDescriptor};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize config
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// wlink configuration
///
/// # Example TOML
///
/// ```toml
/// [app]
/// name = "wlink"
/// callback_url = "wlink://callback"
/// chain_ids = [1]
///
/// [wallet]
/// name = "default"
/// url = "https://keys.coinbase.com/connect"
///
/// [storage]
/// db_path = ""  # Empty = default location
///
/// [logging]
/// level = "warn"
///
/// [output]
/// format = "table"  # "table" | "json" | "quiet"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Dapp identity presented to the wallet
    #[serde(default)]
    pub app: AppConfig,

    /// Wallet to talk to
    #[serde(default)]
    pub wallet: WalletConfig,

    /// Channel state storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,
}

/// App metadata configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub name: String,

    #[serde(default)]
    pub logo_url: Option<String>,

    /// Return address the wallet deep-links back to
    #[serde(default = "default_callback_url")]
    pub callback_url: String,

    /// Supported chains, preferred first
    #[serde(default = "default_chain_ids")]
    pub chain_ids: Vec<u64>,
}

fn default_app_name() -> String {
    "wlink".to_string()
}

fn default_callback_url() -> String {
    "wlink://callback".to_string()
}

fn default_chain_ids() -> Vec<u64> {
    vec![1]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            logo_url: None,
            callback_url: default_callback_url(),
            chain_ids: default_chain_ids(),
        }
    }
}

/// Wallet configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Identity that scopes the persisted channel
    #[serde(default = "default_wallet_name")]
    pub name: String,

    /// URL the wallet is launched through
    #[serde(default = "default_wallet_url")]
    pub url: String,
}

fn default_wallet_name() -> String {
    "default".to_string()
}

fn default_wallet_url() -> String {
    "https://keys.coinbase.com/connect".to_string()
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            name: default_wallet_name(),
            url: default_wallet_url(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the channel database (empty = default location)
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output format: "table", "json", "quiet"
    #[serde(default = "default_format")]
    pub format: String,

    /// Verbose output
    #[serde(default)]
    pub verbose: bool,
}

fn default_format() -> String {
    "table".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            verbose: false,
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default location
    pub fn load_default() -> Result<Self, ConfigError> {
        if let Some(path) = Self::default_path() {
            if path.exists() {
                return Self::load(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from custom path or default
    pub fn load_from(custom_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = custom_path {
            Self::load(path)
        } else {
            Self::load_default()
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("io", "wlink", "wlink")
    }

    /// Get default configuration file path
    pub fn default_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path (for the channel database)
    pub fn data_dir() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
    }

    /// Channel database path: configured, or `channels.db` in the data dir
    pub fn db_path(&self) -> Option<PathBuf> {
        match &self.storage.db_path {
            Some(path) if !path.as_os_str().is_empty() => Some(path.clone()),
            _ => Self::data_dir().map(|dir| dir.join("channels.db")),
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Create default configuration file if it doesn't exist
    pub fn create_default_if_missing() -> Result<bool, ConfigError> {
        if let Some(path) = Self::default_path() {
            if !path.exists() {
                let config = Self::default();
                config.save(&path)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_formats = ["table", "json", "quiet"];
        if !valid_formats.contains(&self.output.format.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid output format '{}'. Valid values: {:?}",
                self.output.format, valid_formats
            )));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level '{}'. Valid values: {:?}",
                self.logging.level, valid_levels
            )));
        }

        if self.wallet.name.trim().is_empty() || self.wallet.name.contains(':') {
            return Err(ConfigError::ValidationError(format!(
                "Invalid wallet name '{}': must be non-empty and contain no ':'",
                self.wallet.name
            )));
        }

        Url::parse(&self.wallet.url).map_err(|e| {
            ConfigError::ValidationError(format!("Invalid wallet URL '{}': {}", self.wallet.url, e))
        })?;

        Url::parse(&self.app.callback_url).map_err(|e| {
            ConfigError::ValidationError(format!(
                "Invalid callback URL '{}': {}",
                self.app.callback_url, e
            ))
        })?;

        if self.app.chain_ids.contains(&0) {
            return Err(ConfigError::ValidationError(
                "chain_ids must not contain 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Metadata presented to the wallet
    pub fn app_metadata(&self) -> AppMetadata {
        AppMetadata {
            name: self.app.name.clone(),
            logo_url: self.app.logo_url.clone(),
            chain_ids: self.app.chain_ids.clone(),
            callback_url: self.app.callback_url.clone(),
        }
    }

    /// The configured wallet
    pub fn wallet_descriptor(&self) -> Result<WalletDescriptor, ConfigError> {
        let url = Url::parse(&self.wallet.url).map_err(|e| {
            ConfigError::ValidationError(format!("Invalid wallet URL '{}': {}", self.wallet.url, e))
        })?;
        Ok(WalletDescriptor::new(self.wallet.name.clone(), url))
    }

    /// Generate a sample configuration file content
    pub fn sample_toml() -> &'static str {
        r#"# wlink configuration

[app]
# Name shown by the wallet
name = "wlink"
# logo_url = "https://example.com/logo.png"
# Return address the wallet deep-links back to
callback_url = "wlink://callback"
# Supported chains, preferred first
chain_ids = [1]

[wallet]
# Identity that scopes the persisted channel
name = "default"
# URL the wallet is launched through
url = "https://keys.coinbase.com/connect"

[storage]
# Path to channel database (empty = default location)
# db_path = ""

[logging]
# Log level: "error", "warn", "info", "debug", "trace"
level = "warn"

[output]
# Output format: "table", "json", "quiet"
format = "table"
verbose = false
"#
    }
}

/// CLI configuration overrides
///
/// Command-line arguments take precedence over config file values.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    /// Output format override
    pub output_format: Option<String>,
    /// Verbose flag override
    pub verbose: Option<bool>,
    /// Debug flag override
    pub debug: Option<bool>,
    /// Wallet name override
    pub wallet: Option<String>,
}

impl Config {
    /// Apply CLI overrides to configuration
    pub fn with_overrides(mut self, overrides: &CliOverrides) -> Self {
        if let Some(ref format) = overrides.output_format {
            self.output.format = format.clone();
        }
        if let Some(verbose) = overrides.verbose {
            self.output.verbose = verbose;
        }
        if let Some(true) = overrides.debug {
            self.logging.level = "debug".to_string();
        }
        if let Some(ref wallet) = overrides.wallet {
            if !wallet.is_empty() {
                self.wallet.name = wallet.clone();
            }
        }
        self
    }
}
