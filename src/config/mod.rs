mod env;
pub mod validation;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use self::env::{apply_env_overrides, CONFIG_PATH_ENV};
use self::validation::validate_config;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid environment variable {name}: {message}")]
    Env { name: &'static str, message: String },
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// How the upstream Dify app is driven; selects the endpoint and query shaping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BotType {
    #[default]
    Chat,
    Completion,
    Workflow,
}

impl BotType {
    /// Endpoint path appended to the upstream base URL.
    #[must_use]
    pub fn api_path(self) -> &'static str {
        match self {
            BotType::Chat => "/chat-messages",
            BotType::Completion => "/completion-messages",
            BotType::Workflow => "/workflows/run",
        }
    }
}

impl fmt::Display for BotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BotType::Chat => write!(f, "Chat"),
            BotType::Completion => write!(f, "Completion"),
            BotType::Workflow => write!(f, "Workflow"),
        }
    }
}

impl FromStr for BotType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Chat" => Ok(BotType::Chat),
            "Completion" => Ok(BotType::Completion),
            "Workflow" => Ok(BotType::Workflow),
            other => Err(format!(
                "unknown bot type '{other}' (expected Chat, Completion or Workflow)"
            )),
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
    /// Upper bound, in seconds, for acquiring the upstream response.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_http_pool_max_idle_per_host")]
    pub http_pool_max_idle_per_host: usize,
    #[serde(default = "default_http_pool_idle_timeout_secs")]
    pub http_pool_idle_timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_worker_threads: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_max_blocking_threads: Option<usize>,
    #[serde(default)]
    pub http_use_env_proxy: bool,
}

fn default_port() -> u16 {
    3000
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_timeout() -> u64 {
    30
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
            http_pool_max_idle_per_host: default_http_pool_max_idle_per_host(),
            http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
            runtime_worker_threads: None,
            runtime_max_blocking_threads: None,
            http_use_env_proxy: false,
        }
    }
}

/// The Dify app this gateway fronts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub bot_type: BotType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_variable: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_variable: Option<String>,
    #[serde(default = "default_user")]
    pub user: String,
}

fn default_user() -> String {
    "apiuser".to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            bot_type: BotType::default(),
            input_variable: None,
            output_variable: None,
            user: default_user(),
        }
    }
}

/// Usage counters reported when the upstream omits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageDefaults {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Default for UsageDefaults {
    fn default() -> Self {
        Self {
            prompt_tokens: 100,
            completion_tokens: 10,
            total_tokens: 110,
        }
    }
}

/// Knobs that paper over inconsistent upstream behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompatConfig {
    #[serde(default)]
    pub default_usage: UsageDefaults,
    /// In buffered mode, ignore `workflow_finished` once `message` events
    /// already supplied the answer.
    #[serde(default = "default_true")]
    pub skip_workflow_finished_after_message: bool,
    #[serde(default = "default_system_fingerprint")]
    pub system_fingerprint: String,
}

fn default_true() -> bool {
    true
}
fn default_system_fingerprint() -> String {
    "fp_2f57f81c11".to_string()
}

impl Default for CompatConfig {
    fn default() -> Self {
        Self {
            default_usage: UsageDefaults::default(),
            skip_workflow_finished_after_message: true,
            system_fingerprint: default_system_fingerprint(),
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
    pub compat: CompatConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// Load configuration from an optional YAML file, apply environment
/// overrides, and validate the result.
///
/// A missing file is not an error: the service can be configured from the
/// environment alone.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading an existing file fails,
/// [`ConfigError::Yaml`] when parsing fails, [`ConfigError::Env`] for a
/// malformed override, or [`ConfigError::Validation`] when semantic
/// validation fails (for example, no upstream base URL).
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    load_config_with_env(path, |name| std::env::var(name).ok())
}

/// [`load_config`] with an injectable environment lookup.
///
/// # Errors
///
/// Same as [`load_config`].
pub fn load_config_with_env<F>(path: &str, lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match std::fs::read_to_string(path) {
        Ok(contents) => serde_yaml::from_str(&contents)?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
        Err(err) => return Err(err.into()),
    };
    apply_env_overrides(&mut config, lookup)?;
    validate_config(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_example_config() {
        let config = load_config_with_env("config.example.yaml", |_| None);
        assert!(
            config.is_ok(),
            "Failed to load example config: {:?}",
            config.err()
        );
        let config = config.unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.timeout, 30);
        assert_eq!(config.upstream.bot_type, BotType::Chat);
        assert_eq!(config.compat.default_usage, UsageDefaults::default());
        assert!(config.compat.skip_workflow_finished_after_message);
    }

    #[test]
    fn test_missing_file_uses_env_only() {
        let config = load_config_with_env("does-not-exist.yaml", |name| match name {
            "DIFY_API_URL" => Some("https://api.dify.ai/v1".to_string()),
            "BOT_TYPE" => Some("Workflow".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.upstream.base_url, "https://api.dify.ai/v1");
        assert_eq!(config.upstream.bot_type, BotType::Workflow);
    }

    #[test]
    fn test_missing_base_url_fails() {
        let err = load_config_with_env("does-not-exist.yaml", |_| None).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_bot_type_paths() {
        assert_eq!(BotType::Chat.api_path(), "/chat-messages");
        assert_eq!(BotType::Completion.api_path(), "/completion-messages");
        assert_eq!(BotType::Workflow.api_path(), "/workflows/run");
    }

    #[test]
    fn test_bot_type_serde() {
        let json = serde_json::to_string(&BotType::Workflow).unwrap();
        assert_eq!(json, "\"Workflow\"");
        let mode: BotType = serde_yaml::from_str("Completion").unwrap();
        assert_eq!(mode, BotType::Completion);
        assert!(serde_yaml::from_str::<BotType>("Agent").is_err());
    }

    #[test]
    fn test_bot_type_from_str_rejects_unknown() {
        assert_eq!("Chat".parse::<BotType>(), Ok(BotType::Chat));
        assert!("chat".parse::<BotType>().is_err());
    }
}
