use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for PromptBoostr
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub openai: OpenAIConfig,
    pub generate: GenerateConfig,
    pub wizard: WizardConfig,
    #[serde(default)]
    pub questions: QuestionsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    pub bind: String,
    /// Optional bearer token required on every route except /health
    #[serde(default)]
    pub bearer_token: Option<String>,
    pub body_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub request_timeout_seconds: u64,
    /// Answer every completion locally instead of calling the API
    #[serde(default)]
    pub mock: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateConfig {
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WizardConfig {
    pub temperature: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuestionsConfig {
    /// YAML question tree; the built-in tree is used when unset
    #[serde(default)]
    pub path: Option<String>,
}

const PLACEHOLDER_API_KEY: &str = "PLACEHOLDER_OPENAI_API_KEY";

impl Config {
    /// Load configuration from file with environment variable overrides.
    /// Always returns a usable config.
    pub fn load() -> Self {
        let env_paths = ["../.env", ".env"];

        let mut env_loaded = false;
        for path in &env_paths {
            if dotenvy::from_path(path).is_ok() {
                tracing::info!("Loaded .env from: {}", path);
                env_loaded = true;
                break;
            }
        }

        if !env_loaded {
            tracing::warn!("No .env file found - continuing with env vars only");
        }

        let config_path = env::var("PB_CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());

        let mut config = Self::from_file(&config_path);
        config.apply_env_overrides();

        if let Err(e) = config.validate() {
            tracing::warn!("Config validation warnings: {} - continuing anyway", e);
        }

        config
    }

    fn from_file(config_path: &str) -> Self {
        if !Path::new(config_path).exists() {
            tracing::warn!("Config file not found at {} - using defaults", config_path);
            return Self::default();
        }

        match fs::read_to_string(config_path) {
            Ok(contents) => match serde_yaml::from_str::<Config>(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded configuration from {}", config_path);
                    config
                }
                Err(e) => {
                    tracing::error!(
                        "Failed to parse config file {}: {} - using defaults",
                        config_path,
                        e
                    );
                    Self::default()
                }
            },
            Err(e) => {
                tracing::error!(
                    "Failed to read config file {}: {} - using defaults",
                    config_path,
                    e
                );
                Self::default()
            }
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Server overrides
        if let Some(bind) = lookup("PB_HTTP_BIND") {
            self.server.bind = bind;
        }
        if let Some(token) = lookup("PB_BEARER_TOKEN") {
            self.server.bearer_token = Some(token).filter(|t| !t.is_empty());
        }

        // OpenAI overrides
        if let Some(api_key) = lookup("OPENAI_API_KEY") {
            self.openai.api_key = api_key;
        }
        if let Some(base_url) = lookup("OPENAI_BASE_URL") {
            self.openai.base_url = base_url;
        }
        if let Some(model) = lookup("OPENAI_MODEL") {
            self.openai.model = model;
        }
        if let Some(mock) = lookup("MOCK_AI") {
            self.openai.mock = mock.eq_ignore_ascii_case("true") || mock == "1";
        }
        if let Some(timeout) = lookup("PB_REQUEST_TIMEOUT_SECONDS") {
            if let Ok(secs) = timeout.parse() {
                self.openai.request_timeout_seconds = secs;
            }
        }

        if let Some(max_tokens) = lookup("PB_GENERATE_MAX_TOKENS") {
            if let Ok(v) = max_tokens.parse() {
                self.generate.max_tokens = v;
            }
        }
        if let Some(temperature) = lookup("PB_WIZARD_TEMPERATURE") {
            if let Ok(v) = temperature.parse() {
                self.wizard.temperature = v;
            }
        }
        if let Some(path) = lookup("PB_QUESTIONS_PATH") {
            self.questions.path = Some(path);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.server.bind.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!(
                "server.bind '{}' is not a host:port address",
                self.server.bind
            )
            .into());
        }

        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes cannot be 0".into());
        }

        if self.openai.request_timeout_seconds == 0 {
            return Err("openai.request_timeout_seconds cannot be 0".into());
        }

        if !(0.0..=2.0).contains(&self.wizard.temperature) {
            return Err("wizard.temperature must be between 0.0 and 2.0".into());
        }

        if self.generate.max_tokens == 0 {
            return Err("generate.max_tokens cannot be 0".into());
        }

        if !self.openai.mock
            && (self.openai.api_key == PLACEHOLDER_API_KEY || self.openai.api_key.is_empty())
        {
            return Err("OPENAI_API_KEY environment variable must be set (or MOCK_AI=true)".into());
        }

        Ok(())
    }

    /// Get upstream request timeout as Duration
    pub fn get_request_timeout(&self) -> Duration {
        Duration::from_secs(self.openai.request_timeout_seconds)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                name: "prompt-boostr".to_string(),
                bind: "127.0.0.1:8787".to_string(),
                bearer_token: None,
                body_limit_bytes: 64 * 1024,
            },
            openai: OpenAIConfig {
                api_key: PLACEHOLDER_API_KEY.to_string(),
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o-mini".to_string(),
                request_timeout_seconds: 60,
                mock: false,
            },
            generate: GenerateConfig { max_tokens: 2048 },
            wizard: WizardConfig { temperature: 0.5 },
            questions: QuestionsConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_needs_api_key() {
        let cfg = Config::default();
        assert!(cfg.validate().is_err());

        let mut mocked = Config::default();
        mocked.openai.mock = true;
        assert!(mocked.validate().is_ok());
    }

    #[test]
    fn test_env_overrides_apply() {
        let mut cfg = Config::default();
        cfg.apply_overrides(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_MODEL", "gpt-4o"),
            ("MOCK_AI", "TRUE"),
            ("PB_GENERATE_MAX_TOKENS", "512"),
            ("PB_WIZARD_TEMPERATURE", "not-a-number"),
            ("PB_BEARER_TOKEN", ""),
        ]));
        assert_eq!(cfg.openai.api_key, "sk-test");
        assert_eq!(cfg.openai.model, "gpt-4o");
        assert!(cfg.openai.mock);
        assert_eq!(cfg.generate.max_tokens, 512);
        // Unparseable values keep the previous setting
        assert!((cfg.wizard.temperature - 0.5).abs() < 1e-6);
        assert!(cfg.server.bearer_token.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_yaml_config_round_trip_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut cfg = Config::default();
        cfg.server.bind = "0.0.0.0:9000".to_string();
        cfg.questions.path = Some("questions.yaml".to_string());
        fs::write(&path, serde_yaml::to_string(&cfg).unwrap()).unwrap();

        let loaded = Config::from_file(path.to_str().unwrap());
        assert_eq!(loaded.server.bind, "0.0.0.0:9000");
        assert_eq!(loaded.questions.path.as_deref(), Some("questions.yaml"));

        let missing = Config::from_file(dir.path().join("nope.yaml").to_str().unwrap());
        assert_eq!(missing.server.bind, "127.0.0.1:8787");
    }

    #[test]
    fn test_invalid_bind_is_reported() {
        let mut cfg = Config::default();
        cfg.openai.mock = true;
        cfg.server.bind = "localhost".to_string();
        assert!(cfg.validate().is_err());
    }
}
