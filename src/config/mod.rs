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
    #[error("Invalid environment override {0}")]
    Env(String),
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_http_pool_max_idle_per_host")]
    pub http_pool_max_idle_per_host: usize,
    #[serde(default = "default_http_pool_idle_timeout_secs")]
    pub http_pool_idle_timeout_secs: u64,
    #[serde(default)]
    pub runtime_worker_threads: Option<usize>,
    #[serde(default)]
    pub runtime_max_blocking_threads: Option<usize>,
}

fn default_port() -> u16 {
    8080
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_timeout() -> u64 {
    60
}
fn default_connect_timeout() -> u64 {
    5
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
            connect_timeout_secs: default_connect_timeout(),
            http_pool_max_idle_per_host: default_http_pool_max_idle_per_host(),
            http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
            runtime_worker_threads: None,
            runtime_max_blocking_threads: None,
        }
    }
}

/// TensorFlow Serving backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub default_model_name: Option<String>,
    #[serde(default)]
    pub multi_model: bool,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8501".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            default_model_name: None,
            multi_model: false,
        }
    }
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub csv_full_escaping: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            csv_full_escaping: false,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

const ENV_BIND_PORT: &str = "SAGEMAKER_BIND_TO_PORT";
const ENV_DEFAULT_MODEL: &str = "SAGEMAKER_TFS_DEFAULT_MODEL_NAME";
const ENV_MULTI_MODEL: &str = "SAGEMAKER_MULTI_MODEL";
const ENV_TFS_REST_PORT: &str = "TFS_REST_PORT";

/// Value the hosting platform exports when no default model is configured.
const UNSET_MODEL_SENTINEL: &str = "None";

/// Load configuration from a YAML file, apply environment overrides, and validate.
///
/// A missing or empty file yields the built-in defaults, so the gateway can run
/// from environment variables alone.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails for any reason other
/// than it not existing, [`ConfigError::Yaml`] when parsing fails,
/// [`ConfigError::Env`] when an environment override does not parse, or
/// [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let mut config = match std::fs::read_to_string(path) {
        Ok(contents) if contents.trim().is_empty() => AppConfig::default(),
        Ok(contents) => serde_yaml::from_str(&contents)?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
        Err(err) => return Err(ConfigError::Io(err)),
    };
    apply_env_overrides_from(&mut config, |name| std::env::var(name).ok())?;
    validate_config(&config)?;
    Ok(config)
}

/// Apply the hosting platform's environment overrides on top of the file config.
///
/// The lookup is injected so tests can drive this from a map instead of process
/// environment.
fn apply_env_overrides_from<F>(config: &mut AppConfig, get: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = get(ENV_BIND_PORT) {
        config.server.port = parse_env(ENV_BIND_PORT, &raw)?;
    }
    if let Some(raw) = get(ENV_DEFAULT_MODEL) {
        config.backend.default_model_name =
            (!raw.is_empty() && raw != UNSET_MODEL_SENTINEL).then_some(raw);
    }
    if let Some(raw) = get(ENV_MULTI_MODEL) {
        config.backend.multi_model = match raw.to_ascii_lowercase().as_str() {
            "true" => true,
            "false" => false,
            _ => {
                return Err(ConfigError::Env(format!(
                    "{ENV_MULTI_MODEL}={raw}: expected \"true\" or \"false\""
                )))
            }
        };
    }
    if let Some(raw) = get(ENV_TFS_REST_PORT) {
        let port: u16 = parse_env(ENV_TFS_REST_PORT, &raw)?;
        config.backend.base_url = format!("http://127.0.0.1:{port}");
    }
    Ok(())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    raw.parse()
        .map_err(|err| ConfigError::Env(format!("{name}={raw}: {err}")))
}
