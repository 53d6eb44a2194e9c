//! Configuration management for the tutor relay.
//!
//! The relay reads an optional JSON file at `~/.tutor-relay/config.json`
//! (or the path named by `TUTOR_CONFIG`) and then applies environment
//! overrides.
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `TUTOR_CONFIG` → path of the config file
//! - `TUTOR_HOST` → server.host
//! - `TUTOR_PORT` → server.port
//! - `TUTOR_LOG_LEVEL` → observability.log_level
//! - `TUTOR_LOG_FORMAT` → observability.log_format
//! - `TUTOR_MODEL` → upstream.model
//! - `OPENAI_BASE_URL` → upstream.base_url
//! - `OPENAI_API_KEY` → upstream.api_key

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".tutor-relay"),
        |dirs| dirs.home_dir().join(".tutor-relay"),
    )
}

/// Get the configuration file path, honoring `TUTOR_CONFIG`.
pub fn config_path() -> PathBuf {
    match std::env::var("TUTOR_CONFIG") {
        Ok(path) if !path.trim().is_empty() => PathBuf::from(shellexpand::tilde(&path).as_ref()),
        _ => config_dir().join("config.json"),
    }
}

/// Where the configuration comes from.
///
/// Resolved before logging is up, reported once it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// An existing config file
    File(PathBuf),
    /// No file at this path; defaults plus environment
    Defaults(PathBuf),
}

impl ConfigSource {
    /// Resolve the source for the default config path.
    pub fn locate() -> Self {
        Self::locate_at(config_path())
    }

    pub fn locate_at(path: PathBuf) -> Self {
        if path.exists() {
            Self::File(path)
        } else {
            Self::Defaults(path)
        }
    }

    /// Emit the startup line describing this source.
    pub fn log(&self) {
        match self {
            Self::File(path) => tracing::info!(path = %path.display(), "Loaded config file"),
            Self::Defaults(path) => {
                tracing::info!(path = %path.display(), "Config file not found, using defaults")
            }
        }
    }
}

/// Persona seeded as the first turn of every transcript.
pub const DEFAULT_PERSONA: &str = "You are a python tutor AI, completely dedicated to teach users how to learn python from scratch. Please provide clear instructions on the Python concepts, best practices and syntax. Help create a path of learning for users to be able to create real life, production ready python applications.";

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Listener settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream completion / image provider
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Conversation relay behavior
    #[serde(default)]
    pub relay: RelayConfig,

    /// Image generation parameters
    #[serde(default)]
    pub image: ImageConfig,

    /// Logging
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from a resolved source.
    pub fn load_source(source: &ConfigSource) -> Result<Self> {
        match source {
            ConfigSource::File(path) => Self::load_from(path),
            ConfigSource::Defaults(_) => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load from a resolved source, then apply environment overrides.
    pub fn load_source_with_env(source: &ConfigSource) -> Result<Self> {
        let mut config = Self::load_source(source)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply process environment overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (the process environment in production).
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("TUTOR_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("TUTOR_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }

        if let Some(level) = lookup("TUTOR_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("TUTOR_LOG_FORMAT") {
            self.observability.log_format = format;
        }

        if let Some(model) = lookup("TUTOR_MODEL") {
            self.upstream.model = model;
        }
        if let Some(base_url) = lookup("OPENAI_BASE_URL") {
            self.upstream.base_url = base_url;
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.upstream.api_key = Some(key);
        }
    }

    /// The upstream credential, if one is configured and non-empty.
    pub fn api_key(&self) -> Option<&str> {
        self.upstream
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// Socket address string the server binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

// ============================================================================
// Sections
// ============================================================================

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    8000
}

/// Upstream OpenAI-compatible provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL without the `/v1/...` suffix
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API credential (required at startup)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Chat completion model
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature, fixed for every call
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// HTTP client timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            timeout_secs: default_http_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com".into()
}

fn default_model() -> String {
    "gpt-4".into()
}

fn default_temperature() -> f64 {
    0.6
}

fn default_http_timeout() -> u64 {
    300
}

/// Conversation relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// System persona seeded into every new transcript
    #[serde(default = "default_persona")]
    pub persona: String,

    /// Bound on opening the upstream stream and on each fragment wait
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            persona: default_persona(),
            upstream_timeout_secs: default_upstream_timeout(),
        }
    }
}

fn default_persona() -> String {
    DEFAULT_PERSONA.into()
}

fn default_upstream_timeout() -> u64 {
    60
}

/// Image generation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Square resolution, e.g. `256x256`
    #[serde(default = "default_image_size")]
    pub size: String,

    /// Number of images requested
    #[serde(default = "default_image_count")]
    pub count: u32,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            size: default_image_size(),
            count: default_image_count(),
        }
    }
}

fn default_image_size() -> String {
    "256x256".into()
}

fn default_image_count() -> u32 {
    1
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// `pretty` or `json`
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}
