//! Server configuration loading from file and environment variables.

use actyte_voice::{DEFAULT_AZURE_VOICE_NAME, DEFAULT_OPENAI_MODEL};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Voice pipeline settings.
    #[serde(default)]
    pub voice: VoiceConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Route the conversation websocket is served on.
    #[serde(default = "default_conversation_endpoint")]
    pub conversation_endpoint: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "actyte_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Provider choices for the agent and synthesizer.
#[derive(Debug, Clone, Deserialize)]
pub struct VoiceConfig {
    /// Azure neural voice used for the persona.
    #[serde(default = "default_voice_name")]
    pub voice_name: String,

    /// Chat-completions model backing the agent.
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8000
}

fn default_conversation_endpoint() -> String {
    "/api/python/conversation".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_voice_name() -> String {
    DEFAULT_AZURE_VOICE_NAME.to_string()
}

fn default_openai_model() -> String {
    DEFAULT_OPENAI_MODEL.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            conversation_endpoint: default_conversation_endpoint(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            voice_name: default_voice_name(),
            openai_model: default_openai_model(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A setting parsed but cannot be used.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

impl Config {
    /// Checks values that would otherwise fail at router construction.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a conversation endpoint that is
    /// not an absolute path below the root.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let endpoint = &self.server.conversation_endpoint;
        let invalid = |reason: &str| ConfigError::Invalid {
            field: "server.conversation_endpoint",
            reason: format!("{} ({:?})", reason, endpoint),
        };

        if !endpoint.starts_with('/') {
            return Err(invalid("must start with '/'"));
        }
        if endpoint.trim_end_matches('/').is_empty() {
            return Err(invalid("must not be the root path"));
        }
        if endpoint.contains(char::is_whitespace) || endpoint.contains("//") {
            return Err(invalid("must be a single normalized path"));
        }
        Ok(())
    }
}

/// Loads configuration from a TOML file, falling back to defaults, then
/// applies overrides from the process environment.
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed,
/// or holds an unusable value.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

/// Applies environment overrides read through `lookup`.
///
/// - `ACTYTE_HOST` overrides `server.host`
/// - `ACTYTE_PORT` overrides `server.port`
/// - `ACTYTE_LOG_LEVEL` overrides `logging.level`
/// - `ACTYTE_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `ACTYTE_VOICE_NAME` overrides `voice.voice_name`
/// - `ACTYTE_OPENAI_MODEL` overrides `voice.openai_model`
///
/// Unparseable host and port values are ignored.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("ACTYTE_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = lookup("ACTYTE_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(level) = lookup("ACTYTE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("ACTYTE_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(voice) = lookup("ACTYTE_VOICE_NAME").filter(|v| !v.trim().is_empty()) {
        config.voice.voice_name = voice;
    }
    if let Some(model) = lookup("ACTYTE_OPENAI_MODEL").filter(|v| !v.trim().is_empty()) {
        config.voice.openai_model = model;
    }
}
