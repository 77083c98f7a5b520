//! TOML Configuration File Support
//!
//! Centralized configuration for the relay daemon and chat clients, loaded
//! from `~/.config/chat-relay/relay.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! The upstream API key is only ever read from `OPENAI_API_KEY`; it is never
//! stored in the file.
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:54321"
//! access_token = "local-dev-token"
//!
//! [upstream]
//! base_url = "https://api.openai.com"
//! chat_model = "gpt-4o-mini"
//! image_model = "dall-e-3"
//! image_size = "1024x1024"
//! image_quality = "standard"
//! request_timeout_secs = 120
//!
//! [client]
//! endpoint = "http://127.0.0.1:54321/functions/v1"
//! token = "local-dev-token"
//! turn_timeout_secs = 300
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default listen address for the daemon
pub const DEFAULT_BIND: &str = "127.0.0.1:54321";

/// Default OpenAI API base
pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://api.openai.com";

/// Default base URL clients send requests to
pub const DEFAULT_CLIENT_ENDPOINT: &str = "http://127.0.0.1:54321/functions/v1";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where the configuration came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[server]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerToml {
    /// Listen address, e.g. `127.0.0.1:54321`
    pub bind: Option<String>,
    /// Bearer token required on every request (unset = no check)
    pub access_token: Option<String>,
}

/// `[upstream]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamToml {
    /// API base URL
    pub base_url: Option<String>,
    /// Chat completion model
    pub chat_model: Option<String>,
    /// Image generation model
    pub image_model: Option<String>,
    /// Generated image size
    pub image_size: Option<String>,
    /// Generated image quality
    pub image_quality: Option<String>,
    /// Per-request timeout for non-streaming calls
    pub request_timeout_secs: Option<u64>,
}

/// `[client]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientToml {
    /// Base URL the `chat-text` and `chat-image` paths hang off
    pub endpoint: Option<String>,
    /// Bearer token sent with every request
    pub token: Option<String>,
    /// Upper bound on one turn (unset = no limit)
    pub turn_timeout_secs: Option<u64>,
}

/// Root TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayToml {
    /// Daemon settings
    pub server: ServerToml,
    /// Upstream generation service
    pub upstream: UpstreamToml,
    /// Chat client settings
    pub client: ClientToml,
}

// =============================================================================
// Resolved Settings
// =============================================================================

/// Resolved daemon settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerSettings {
    /// Listen address
    pub bind: SocketAddr,
    /// Bearer token required on every request
    pub access_token: Option<String>,
    /// Upstream API key (`OPENAI_API_KEY`)
    pub api_key: Option<String>,
}

/// Resolved upstream settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpstreamSettings {
    /// API base URL, without trailing slash
    pub base_url: String,
    /// Chat completion model
    pub chat_model: String,
    /// Image generation model
    pub image_model: String,
    /// Generated image size
    pub image_size: String,
    /// Generated image quality
    pub image_quality: String,
    /// Per-request timeout for non-streaming calls
    pub request_timeout: Duration,
}

/// Resolved chat client settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientSettings {
    /// Base URL, without trailing slash
    pub endpoint: String,
    /// Bearer token
    pub token: Option<String>,
    /// Upper bound on one turn
    pub turn_timeout: Option<Duration>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 54321)),
            access_token: None,
            api_key: None,
        }
    }
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_UPSTREAM_BASE_URL.to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            image_model: "dall-e-3".to_string(),
            image_size: "1024x1024".to_string(),
            image_quality: "standard".to_string(),
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_CLIENT_ENDPOINT.to_string(),
            token: None,
            turn_timeout: None,
        }
    }
}

/// Fully resolved configuration
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Daemon settings
    pub server: ServerSettings,
    /// Upstream generation service
    pub upstream: UpstreamSettings,
    /// Chat client settings
    pub client: ClientSettings,
    source: ConfigSource,
    config_file_path: Option<PathBuf>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            upstream: UpstreamSettings::default(),
            client: ClientSettings::default(),
            source: ConfigSource::Default,
            config_file_path: None,
        }
    }
}

impl RelayConfig {
    /// Where the highest-priority values came from
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// The file values were loaded from, if any
    #[must_use]
    pub fn config_file_path(&self) -> Option<&PathBuf> {
        self.config_file_path.as_ref()
    }

    /// Reject values that cannot work
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("upstream.chat_model", &self.upstream.chat_model),
            ("upstream.image_model", &self.upstream.image_model),
            ("upstream.base_url", &self.upstream.base_url),
            ("client.endpoint", &self.client.endpoint),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must not be empty"
                )));
            }
        }
        if self.upstream.request_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "upstream.request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.client.turn_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::ValidationError(
                "client.turn_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/chat-relay/relay.toml` or equivalent.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("chat-relay").join("relay.toml"))
}

/// Load configuration from the default path
///
/// # Errors
///
/// Fails if the file exists but cannot be read or parsed, or if the merged
/// values do not validate.
pub fn load_config() -> Result<RelayConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path, then apply the process environment
///
/// A missing file is not an error; defaults are used instead.
///
/// # Errors
///
/// Fails if the file exists but cannot be read or parsed, or if the merged
/// values do not validate.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<RelayConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration using `env` to look up environment variables
///
/// # Errors
///
/// Same as [`load_config_from_path`].
pub fn load_config_with_env(
    path: Option<PathBuf>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<RelayConfig, ConfigError> {
    let mut config = RelayConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: RelayToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config)?;
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env)?;
    config.validate()?;
    Ok(config)
}

fn parse_bind(value: &str) -> Result<SocketAddr, ConfigError> {
    value
        .parse()
        .map_err(|e| ConfigError::ValidationError(format!("Invalid bind address {value:?}: {e}")))
}

fn trim_url(value: &str) -> String {
    value.trim_end_matches('/').to_string()
}

fn apply_toml_config(config: &mut RelayConfig, toml: &RelayToml) -> Result<(), ConfigError> {
    if let Some(ref bind) = toml.server.bind {
        config.server.bind = parse_bind(bind)?;
    }
    if let Some(ref token) = toml.server.access_token {
        config.server.access_token = Some(token.clone());
    }

    let upstream = &toml.upstream;
    if let Some(ref url) = upstream.base_url {
        config.upstream.base_url = trim_url(url);
    }
    if let Some(ref model) = upstream.chat_model {
        config.upstream.chat_model.clone_from(model);
    }
    if let Some(ref model) = upstream.image_model {
        config.upstream.image_model.clone_from(model);
    }
    if let Some(ref size) = upstream.image_size {
        config.upstream.image_size.clone_from(size);
    }
    if let Some(ref quality) = upstream.image_quality {
        config.upstream.image_quality.clone_from(quality);
    }
    if let Some(secs) = upstream.request_timeout_secs {
        config.upstream.request_timeout = Duration::from_secs(secs);
    }

    if let Some(ref endpoint) = toml.client.endpoint {
        config.client.endpoint = trim_url(endpoint);
    }
    if let Some(ref token) = toml.client.token {
        config.client.token = Some(token.clone());
    }
    if let Some(secs) = toml.client.turn_timeout_secs {
        config.client.turn_timeout = Some(Duration::from_secs(secs));
    }

    Ok(())
}

fn apply_env_config(
    config: &mut RelayConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    let mut touched = false;

    if let Some(key) = env("OPENAI_API_KEY").filter(|v| !v.is_empty()) {
        config.server.api_key = Some(key);
    }
    if let Some(bind) = env("RELAY_BIND") {
        config.server.bind = parse_bind(&bind)?;
        touched = true;
    }
    if let Some(token) = env("RELAY_ACCESS_TOKEN").filter(|v| !v.is_empty()) {
        config.server.access_token = Some(token);
        touched = true;
    }
    if let Some(url) = env("OPENAI_BASE_URL") {
        config.upstream.base_url = trim_url(&url);
        touched = true;
    }
    if let Some(endpoint) = env("CHAT_ENDPOINT") {
        config.client.endpoint = trim_url(&endpoint);
        touched = true;
    }
    if let Some(token) = env("CHAT_TOKEN").filter(|v| !v.is_empty()) {
        config.client.token = Some(token);
        touched = true;
    }

    if touched {
        config.source = ConfigSource::Env;
    }
    Ok(())
}

// =============================================================================
// CLI Overrides
// =============================================================================

/// Values supplied on the command line, applied last
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Listen address
    pub bind: Option<SocketAddr>,
    /// Daemon bearer token
    pub access_token: Option<String>,
    /// Chat completion model
    pub chat_model: Option<String>,
    /// Client endpoint
    pub endpoint: Option<String>,
    /// Client bearer token
    pub token: Option<String>,
    /// Client turn timeout
    pub turn_timeout_secs: Option<u64>,
}

impl ConfigOverrides {
    /// Create empty overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override listen address
    #[must_use]
    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = Some(bind);
        self
    }

    /// Override chat model
    #[must_use]
    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = Some(model.into());
        self
    }

    /// Override client endpoint
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Apply overrides, then re-validate
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if an override is invalid.
    pub fn apply(&self, config: &mut RelayConfig) -> Result<(), ConfigError> {
        let mut touched = false;

        if let Some(bind) = self.bind {
            config.server.bind = bind;
            touched = true;
        }
        if let Some(ref token) = self.access_token {
            config.server.access_token = Some(token.clone());
            touched = true;
        }
        if let Some(ref model) = self.chat_model {
            config.upstream.chat_model.clone_from(model);
            touched = true;
        }
        if let Some(ref endpoint) = self.endpoint {
            config.client.endpoint = trim_url(endpoint);
            touched = true;
        }
        if let Some(ref token) = self.token {
            config.client.token = Some(token.clone());
            touched = true;
        }
        if let Some(secs) = self.turn_timeout_secs {
            config.client.turn_timeout = Some(Duration::from_secs(secs));
            touched = true;
        }

        if touched {
            config.source = ConfigSource::Cli;
        }
        config.validate()
    }
}
