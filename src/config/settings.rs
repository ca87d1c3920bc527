//! Service settings and configuration management.
//!
//! Settings are resolved from multiple sources with the usual precedence:
//! defaults, then a TOML or JSON file, then `KI_IDENTITY_*` environment
//! variables, then CLI arguments.

use super::account::{ProxyConfig, ProxyType};
use crate::fingerprint::DEFAULT_CHROME_VERSION;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML configuration.
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),

    /// Failed to serialize TOML configuration.
    #[error("Failed to serialize TOML configuration: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    /// Failed to parse JSON configuration.
    #[error("Failed to parse JSON configuration: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// Unsupported file format.
    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

/// Read a TOML or JSON file, choosing the parser by extension.
pub(crate) fn read_config_file<T, P>(path: P) -> Result<T, ConfigError>
where
    T: serde::de::DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;

    match file_extension(path).as_str() {
        "toml" => Ok(toml::from_str(&content)?),
        "json" => Ok(serde_json::from_str(&content)?),
        ext => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

fn file_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

fn env_flag(val: &str) -> bool {
    val.to_lowercase() == "true" || val == "1"
}

/// Top-level settings of the identity service.
///
/// # Example
///
/// ```rust
/// use ki_identity_browser::config::IdentitySettings;
///
/// let settings = IdentitySettings::default()
///     .with_api(true, 9300)
///     .with_low_quality_threshold(80);
/// assert!(settings.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentitySettings {
    /// Enable the HTTP control-plane server.
    #[serde(default = "default_api_enabled")]
    pub api_enabled: bool,

    /// Port for the HTTP control-plane server.
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Storage partition key prefix; the account id is appended.
    #[serde(default = "default_partition_prefix")]
    pub partition_prefix: String,

    /// Quality scores below this are logged as warnings.
    #[serde(default = "default_low_quality_threshold")]
    pub low_quality_threshold: u8,

    /// Chrome build advertised in derived user agents.
    #[serde(default = "default_chrome_version")]
    pub chrome_version: String,

    /// URL every new context navigates to.
    #[serde(default = "default_start_url")]
    pub start_url: String,

    /// Proxy applied to accounts that do not configure their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_proxy: Option<ProxyConfig>,

    /// Accounts started when the server comes up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accounts_file: Option<PathBuf>,
}

fn default_api_enabled() -> bool {
    true
}

fn default_api_port() -> u16 {
    9222
}

fn default_partition_prefix() -> String {
    "persist:account-".to_string()
}

fn default_low_quality_threshold() -> u8 {
    70
}

fn default_chrome_version() -> String {
    DEFAULT_CHROME_VERSION.to_string()
}

fn default_start_url() -> String {
    "about:blank".to_string()
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            api_enabled: default_api_enabled(),
            api_port: default_api_port(),
            partition_prefix: default_partition_prefix(),
            low_quality_threshold: default_low_quality_threshold(),
            chrome_version: default_chrome_version(),
            start_url: default_start_url(),
            default_proxy: None,
            accounts_file: None,
        }
    }
}

impl IdentitySettings {
    /// Creates settings with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads settings from a TOML or JSON file, detected by extension.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        read_config_file(path)
    }

    /// Saves settings to a configuration file. The format follows the extension.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = match file_extension(path).as_str() {
            "toml" => toml::to_string_pretty(self)?,
            "json" => serde_json::to_string_pretty(self)?,
            ext => return Err(ConfigError::UnsupportedFormat(ext.to_string())),
        };

        fs::write(path, content)?;
        Ok(())
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        settings.apply_env_overrides();
        settings
    }

    /// Applies `KI_IDENTITY_*` environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("KI_IDENTITY_API_ENABLED") {
            self.api_enabled = env_flag(&val);
        }

        if let Ok(val) = env::var("KI_IDENTITY_API_PORT") {
            if let Ok(port) = val.parse() {
                self.api_port = port;
            }
        }

        if let Ok(val) = env::var("KI_IDENTITY_PARTITION_PREFIX") {
            self.partition_prefix = val;
        }

        if let Ok(val) = env::var("KI_IDENTITY_LOW_QUALITY_THRESHOLD") {
            if let Ok(threshold) = val.parse() {
                self.low_quality_threshold = threshold;
            }
        }

        if let Ok(val) = env::var("KI_IDENTITY_CHROME_VERSION") {
            self.chrome_version = val;
        }

        if let Ok(val) = env::var("KI_IDENTITY_START_URL") {
            self.start_url = val;
        }

        if let Ok(val) = env::var("KI_IDENTITY_ACCOUNTS_FILE") {
            self.accounts_file = Some(PathBuf::from(val));
        }

        // Proxy configuration from environment
        if let Ok(host) = env::var("KI_IDENTITY_PROXY_HOST") {
            let port = env::var("KI_IDENTITY_PROXY_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080);

            let mut proxy = ProxyConfig::new(host, port);

            if let Ok(proxy_type) = env::var("KI_IDENTITY_PROXY_TYPE") {
                if let Ok(pt) = proxy_type.parse::<ProxyType>() {
                    proxy.proxy_type = pt;
                }
            }
            if let Ok(username) = env::var("KI_IDENTITY_PROXY_USERNAME") {
                proxy.username = Some(username);
            }
            if let Ok(password) = env::var("KI_IDENTITY_PROXY_PASSWORD") {
                proxy.password = Some(password);
            }

            self.default_proxy = Some(proxy);
        }
    }

    /// Returns these settings with environment overrides applied.
    pub fn merge_with_env(mut self) -> Self {
        self.apply_env_overrides();
        self
    }

    /// Returns these settings with CLI overrides applied.
    ///
    /// # Example
    ///
    /// ```rust
    /// use ki_identity_browser::config::{CliArgs, IdentitySettings};
    ///
    /// let args = CliArgs {
    ///     api_port: Some(9400),
    ///     ..Default::default()
    /// };
    ///
    /// let settings = IdentitySettings::default().merge_with_args(&args);
    /// assert_eq!(settings.api_port, 9400);
    /// ```
    pub fn merge_with_args(mut self, args: &CliArgs) -> Self {
        if let Some(api_enabled) = args.api_enabled {
            self.api_enabled = api_enabled;
        }
        if let Some(api_port) = args.api_port {
            self.api_port = api_port;
        }
        if let Some(ref prefix) = args.partition_prefix {
            self.partition_prefix = prefix.clone();
        }
        if let Some(threshold) = args.low_quality_threshold {
            self.low_quality_threshold = threshold;
        }
        if let Some(ref version) = args.chrome_version {
            self.chrome_version = version.clone();
        }
        if let Some(ref url) = args.start_url {
            self.start_url = url.clone();
        }
        if let Some(ref path) = args.accounts_file {
            self.accounts_file = Some(path.clone());
        }

        // Handle proxy from CLI
        if let Some(ref proxy_host) = args.proxy_host {
            let port = args.proxy_port.unwrap_or(8080);
            let mut proxy = ProxyConfig::new(proxy_host, port);

            if let Some(ref proxy_type) = args.proxy_type {
                if let Ok(pt) = proxy_type.parse() {
                    proxy.proxy_type = pt;
                }
            }
            if let Some(ref username) = args.proxy_username {
                proxy.username = Some(username.clone());
            }
            if let Some(ref password) = args.proxy_password {
                proxy.password = Some(password.clone());
            }

            self.default_proxy = Some(proxy);
        }

        self
    }

    /// Validates all settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_enabled && self.api_port == 0 {
            return Err(ConfigError::ValidationError(
                "API port cannot be 0 when API is enabled".to_string(),
            ));
        }

        if self.partition_prefix.is_empty() {
            return Err(ConfigError::ValidationError(
                "Partition prefix cannot be empty".to_string(),
            ));
        }

        if self.low_quality_threshold > 100 {
            return Err(ConfigError::ValidationError(
                "Low quality threshold cannot exceed 100".to_string(),
            ));
        }

        let version_ok = !self.chrome_version.is_empty()
            && self
                .chrome_version
                .split('.')
                .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));
        if !version_ok {
            return Err(ConfigError::ValidationError(format!(
                "Chrome version must be dotted digits, got: {}",
                self.chrome_version
            )));
        }

        if let Some(ref proxy) = self.default_proxy {
            proxy.validate()?;
        }

        if let Some(ref path) = self.accounts_file {
            if !path.exists() {
                return Err(ConfigError::ValidationError(format!(
                    "Accounts file does not exist: {}",
                    path.display()
                )));
            }
        }

        Ok(())
    }

    /// Storage partition for an account.
    pub fn partition_for(&self, account_id: &str) -> String {
        format!("{}{}", self.partition_prefix, account_id)
    }

    // Builder-style methods for convenient configuration

    /// Enables or disables the API server.
    pub fn with_api(mut self, enabled: bool, port: u16) -> Self {
        self.api_enabled = enabled;
        self.api_port = port;
        self
    }

    pub fn with_partition_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.partition_prefix = prefix.into();
        self
    }

    pub fn with_low_quality_threshold(mut self, threshold: u8) -> Self {
        self.low_quality_threshold = threshold;
        self
    }

    pub fn with_chrome_version(mut self, version: impl Into<String>) -> Self {
        self.chrome_version = version.into();
        self
    }

    pub fn with_start_url(mut self, url: impl Into<String>) -> Self {
        self.start_url = url.into();
        self
    }

    /// Sets the proxy used by accounts without their own.
    pub fn with_default_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.default_proxy = Some(proxy);
        self
    }
}

/// CLI overrides. All fields are optional to allow partial overrides.
#[derive(Debug, Default, Clone)]
pub struct CliArgs {
    pub api_enabled: Option<bool>,
    pub api_port: Option<u16>,
    pub partition_prefix: Option<String>,
    pub low_quality_threshold: Option<u8>,
    pub chrome_version: Option<String>,
    pub start_url: Option<String>,
    pub accounts_file: Option<PathBuf>,
    pub proxy_host: Option<String>,
    pub proxy_port: Option<u16>,
    /// Proxy type (http, https, socks5).
    pub proxy_type: Option<String>,
    pub proxy_username: Option<String>,
    pub proxy_password: Option<String>,
    /// Configuration file path.
    pub config_file: Option<PathBuf>,
}

impl CliArgs {
    /// Creates an empty CliArgs instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves final settings: defaults or file, then environment, then these
    /// arguments, then validation.
    pub fn load_settings(&self) -> Result<IdentitySettings, ConfigError> {
        let mut settings = if let Some(ref config_file) = self.config_file {
            IdentitySettings::from_file(config_file)?
        } else {
            IdentitySettings::default()
        };

        settings = settings.merge_with_env();
        settings = settings.merge_with_args(self);
        settings.validate()?;

        Ok(settings)
    }
}
