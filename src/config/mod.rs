pub mod validation;

use serde::{Deserialize, Serialize};
use std::fmt;

use self::validation::validate_config;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Unit the chunker counts when slicing a completed text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChunkUnit {
    #[default]
    Words,
    Chars,
}

impl fmt::Display for ChunkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkUnit::Words => write!(f, "words"),
            ChunkUnit::Chars => write!(f, "chars"),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    /// Upstream request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    #[serde(default = "default_http_pool_max_idle_per_host")]
    pub http_pool_max_idle_per_host: usize,
    #[serde(default = "default_http_pool_idle_timeout_secs")]
    pub http_pool_idle_timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_worker_threads: Option<usize>,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_timeout() -> u64 {
    300
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_http_pool_max_idle_per_host() -> usize {
    16
}
fn default_http_pool_idle_timeout_secs() -> u64 {
    15
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            timeout: default_timeout(),
            connect_timeout: default_connect_timeout(),
            http_pool_max_idle_per_host: default_http_pool_max_idle_per_host(),
            http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
            runtime_worker_threads: None,
        }
    }
}

/// The single upstream chat-completion provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Server-side credential. A request bearer token takes precedence.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub default_model: Option<String>,
}

fn default_base_url() -> String {
    "https://api.openai.com".to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            default_model: None,
        }
    }
}

impl UpstreamConfig {
    /// Credential configured on the server, ignoring blank values.
    #[must_use]
    pub fn credential(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

/// Pacing and chunking knobs for emulated streams.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default)]
    pub chunk_unit: ChunkUnit,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,
    #[serde(default = "default_chunk_jitter_ms")]
    pub chunk_jitter_ms: u64,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_heartbeat_interval_ms() -> u64 {
    2_500
}
fn default_chunk_size() -> usize {
    8
}
fn default_chunk_delay_ms() -> u64 {
    50
}
fn default_chunk_jitter_ms() -> u64 {
    20
}
fn default_channel_capacity() -> usize {
    64
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            chunk_unit: ChunkUnit::default(),
            chunk_size: default_chunk_size(),
            chunk_delay_ms: default_chunk_delay_ms(),
            chunk_jitter_ms: default_chunk_jitter_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// Load configuration from an optional YAML file, apply environment
/// overrides, and validate the result.
///
/// A missing file is not an error; defaults are used instead.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when the file exists but cannot be read,
/// [`ConfigError::Yaml`] when parsing fails, or [`ConfigError::Validation`]
/// when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let mut config = match std::fs::read_to_string(path) {
        Ok(contents) => serde_yaml::from_str(&contents)?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
        Err(err) => return Err(err.into()),
    };
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    validate_config(&config)?;
    Ok(config)
}

/// Apply environment overrides on top of file-based settings.
///
/// An unparsable `PORT` is logged and ignored.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

    if let Some(key) = non_empty("API_KEY").or_else(|| non_empty("OPENAI_API_KEY")) {
        config.upstream.api_key = Some(key);
    }
    if let Some(base_url) = non_empty("UPSTREAM_BASE_URL").or_else(|| non_empty("BASE_URL")) {
        config.upstream.base_url = base_url;
    }
    if let Some(port) = non_empty("PORT") {
        match port.trim().parse::<u16>() {
            Ok(port) => config.server.port = port,
            Err(_) => tracing::warn!(value = %port, "ignoring invalid PORT override"),
        }
    }
    if let Some(level) = non_empty("LOG_LEVEL") {
        config.features.log_level = level;
    }
}
