use config::{Config, Environment};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::providers::configs::{OpenAiProviderConfig, ProviderConfig, OPENAI_HOST, OPENAI_MODEL};

pub const ENV_PREFIX: &str = "WAYFINDER";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },

    #[error("Invalid server address: {0}")]
    InvalidAddress(String),

    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// Name of the environment variable that sets a settings field.
///
/// Bare field names belong to the provider section, the only one with required fields.
pub fn to_env_var(field: &str) -> String {
    let path = if field.contains('.') {
        field.to_string()
    } else {
        format!("provider.{}", field)
    };
    format!("{}_{}", ENV_PREFIX, path.replace('.', "__").to_uppercase())
}

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(format!("{}:{}", self.host, self.port)))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum ProviderSettings {
    /// Any OpenAI-compatible chat completions endpoint
    OpenAi {
        #[serde(default = "default_openai_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
        /// Seconds before a model request is abandoned
        #[serde(default = "default_model_timeout")]
        timeout: u64,
    },
}

impl ProviderSettings {
    pub fn into_config(self) -> ProviderConfig {
        match self {
            ProviderSettings::OpenAi {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
                timeout,
            } => ProviderConfig::OpenAi(OpenAiProviderConfig {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
                timeout: Duration::from_secs(timeout),
            }),
        }
    }
}

/// Knobs of the agent loop and its secondary model calls
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    #[serde(default = "default_recursion_limit")]
    pub recursion_limit: usize,
    /// Character budget of the element list handed to the relevance filter
    #[serde(default = "default_filter_budget")]
    pub filter_budget: usize,
    #[serde(default = "default_model_timeout")]
    pub model_timeout: u64,
    #[serde(default = "default_verifier_timeout")]
    pub verifier_timeout: u64,
    #[serde(default)]
    pub filter_model: Option<String>,
    #[serde(default)]
    pub verifier_model: Option<String>,
    #[serde(default)]
    pub titling_model: Option<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            recursion_limit: default_recursion_limit(),
            filter_budget: default_filter_budget(),
            model_timeout: default_model_timeout(),
            verifier_timeout: default_verifier_timeout(),
            filter_model: None,
            verifier_model: None,
            titling_model: None,
        }
    }
}

impl AgentSettings {
    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout)
    }

    pub fn verifier_timeout(&self) -> Duration {
        Duration::from_secs(self.verifier_timeout)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrowserSettings {
    #[serde(default)]
    pub headless: bool,
    /// Seconds a single browser action may take
    #[serde(default = "default_action_timeout")]
    pub action_timeout: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: false,
            action_timeout: default_action_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageSettings {
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl StorageSettings {
    /// Configured directory, or `~/.config/wayfinder`
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config")
                .join("wayfinder")
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub provider: ProviderSettings,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub browser: BrowserSettings,
    #[serde(default)]
    pub storage: StorageSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            .set_default("provider.type", "openai")?
            .set_default("provider.host", default_openai_host())?
            .set_default("provider.model", default_model())?
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let result: Result<Self, config::ConfigError> = config.try_deserialize();

        match result {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                // Handle both NotFound and missing field message variants
                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    // Extract field name from error message "missing field `api_key`"
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .split('`')
                        .next()
                        .unwrap_or_default();
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else if let config::ConfigError::NotFound(field) = &err {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_model() -> String {
    OPENAI_MODEL.to_string()
}

fn default_openai_host() -> String {
    OPENAI_HOST.to_string()
}

fn default_window_size() -> usize {
    10
}

fn default_recursion_limit() -> usize {
    50
}

fn default_filter_budget() -> usize {
    32_000
}

fn default_model_timeout() -> u64 {
    120
}

fn default_verifier_timeout() -> u64 {
    60
}

fn default_action_timeout() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clean_env() {
        for (key, _) in env::vars() {
            if key.starts_with("WAYFINDER_") {
                env::remove_var(&key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_default_settings() {
        clean_env();
        env::set_var("WAYFINDER_PROVIDER__API_KEY", "test-key");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.agent.window_size, 10);
        assert_eq!(settings.agent.recursion_limit, 50);
        assert_eq!(settings.agent.filter_budget, 32_000);
        assert_eq!(settings.browser.action_timeout, 30);
        assert!(!settings.browser.headless);
        assert!(settings.storage.data_dir().ends_with(".config/wayfinder"));

        let ProviderSettings::OpenAi {
            host,
            api_key,
            model,
            temperature,
            max_tokens,
            timeout,
        } = settings.provider;
        assert_eq!(host, "https://api.openai.com");
        assert_eq!(api_key, "test-key");
        assert_eq!(model, "gpt-4o-mini");
        assert_eq!(temperature, None);
        assert_eq!(max_tokens, None);
        assert_eq!(timeout, 120);

        clean_env();
    }

    #[test]
    #[serial]
    fn test_environment_override() {
        clean_env();
        env::set_var("WAYFINDER_SERVER__PORT", "8080");
        env::set_var("WAYFINDER_PROVIDER__API_KEY", "hf-token");
        env::set_var("WAYFINDER_PROVIDER__HOST", "https://router.huggingface.co");
        env::set_var("WAYFINDER_PROVIDER__MODEL", "meta-llama/Llama-3.1-70B-Instruct");
        env::set_var("WAYFINDER_PROVIDER__TEMPERATURE", "0.1");
        env::set_var("WAYFINDER_AGENT__WINDOW_SIZE", "6");
        env::set_var("WAYFINDER_AGENT__VERIFIER_MODEL", "judge");
        env::set_var("WAYFINDER_BROWSER__HEADLESS", "true");
        env::set_var("WAYFINDER_STORAGE__DATA_DIR", "/tmp/wayfinder-test");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.agent.window_size, 6);
        assert_eq!(settings.agent.verifier_model.as_deref(), Some("judge"));
        assert!(settings.browser.headless);
        assert_eq!(
            settings.storage.data_dir(),
            PathBuf::from("/tmp/wayfinder-test")
        );

        let ProviderSettings::OpenAi {
            host,
            model,
            temperature,
            ..
        } = settings.provider;
        assert_eq!(host, "https://router.huggingface.co");
        assert_eq!(model, "meta-llama/Llama-3.1-70B-Instruct");
        assert_eq!(temperature, Some(0.1));

        clean_env();
    }

    #[test]
    #[serial]
    fn test_missing_api_key() {
        clean_env();

        match Settings::new() {
            Err(ConfigError::MissingEnvVar { env_var }) => {
                assert_eq!(env_var, "WAYFINDER_PROVIDER__API_KEY");
            }
            other => panic!("Expected MissingEnvVar, got {:?}", other),
        }
    }

    #[test]
    fn test_to_env_var() {
        assert_eq!(to_env_var("api_key"), "WAYFINDER_PROVIDER__API_KEY");
        assert_eq!(to_env_var("server.port"), "WAYFINDER_SERVER__PORT");
    }

    #[test]
    fn test_socket_addr_conversion() {
        let server_settings = ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 3000,
        };
        assert_eq!(
            server_settings.socket_addr().unwrap().to_string(),
            "127.0.0.1:3000"
        );

        let bad = ServerSettings {
            host: "not a host".to_string(),
            port: 3000,
        };
        assert!(matches!(
            bad.socket_addr(),
            Err(ConfigError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_into_provider_config() {
        let settings = ProviderSettings::OpenAi {
            host: "http://localhost:11434".to_string(),
            api_key: "ollama".to_string(),
            model: "qwen2.5".to_string(),
            temperature: Some(0.1),
            max_tokens: Some(2048),
            timeout: 30,
        };
        let ProviderConfig::OpenAi(config) = settings.into_config();
        assert_eq!(config.host, "http://localhost:11434");
        assert_eq!(config.timeout, Duration::from_secs(30));
    }
}
