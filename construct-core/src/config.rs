//! Configuration types for the Construct harness

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::model::{DEFAULT_MAX_STEPS, DEFAULT_TIMEOUT_S};

/// Main configuration for the Construct harness
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConstructConfig {
    /// Remote environment credentials
    #[serde(default)]
    pub environment: EnvironmentConfig,

    /// LLM provider used by the policy and the judges (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm: Option<LLMProviderConfig>,

    /// Defaults applied to scenarios built with [`crate::model::Scenario::builder_with_defaults`]
    #[serde(default)]
    pub defaults: ScenarioDefaults,
}

/// Remote environment configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EnvironmentConfig {
    /// API key for the environment service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Custom service endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Scenario defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioDefaults {
    /// Step budget
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Wall-clock budget for one run
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,

    /// Portrait stream orientation
    #[serde(default = "default_portrait")]
    pub portrait: bool,
}

fn default_max_steps() -> usize {
    DEFAULT_MAX_STEPS
}

fn default_timeout() -> Duration {
    Duration::from_secs_f64(DEFAULT_TIMEOUT_S)
}

fn default_portrait() -> bool {
    true
}

impl Default for ScenarioDefaults {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            timeout: default_timeout(),
            portrait: default_portrait(),
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMProviderConfig {
    /// Provider type
    pub provider: LLMProvider,

    /// Model name (empty selects the provider default)
    #[serde(default)]
    pub model: String,

    /// API key (if needed, prefer env vars)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL (for custom or OpenAI-compatible endpoints)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// LLM provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LLMProvider {
    OpenAI,
    /// Gemini through its OpenAI-compatible endpoint
    Gemini,
}

impl LLMProvider {
    /// Environment variables consulted for the API key, in order
    pub fn api_key_vars(&self) -> &'static [&'static str] {
        match self {
            LLMProvider::OpenAI => &["OPENAI_API_KEY"],
            LLMProvider::Gemini => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            LLMProvider::OpenAI => "gpt-4o",
            LLMProvider::Gemini => "gemini-2.0-flash",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            LLMProvider::OpenAI => "https://api.openai.com/v1",
            LLMProvider::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
        }
    }
}

/// Builder for ConstructConfig
pub struct ConfigBuilder {
    config: ConstructConfig,
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self {
            config: ConstructConfig::default(),
        }
    }

    /// Set environment configuration
    pub fn environment(mut self, config: EnvironmentConfig) -> Self {
        self.config.environment = config;
        self
    }

    /// Set LLM configuration
    pub fn llm(mut self, config: LLMProviderConfig) -> Self {
        self.config.llm = Some(config);
        self
    }

    /// Set scenario defaults
    pub fn defaults(mut self, defaults: ScenarioDefaults) -> Self {
        self.config.defaults = defaults;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ConstructConfig {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstructConfig {
    /// Load configuration from file and environment variables.
    ///
    /// Loads in this order:
    /// 1. Default configuration
    /// 2. Configuration file (construct.toml, then the path in CONSTRUCT_CONFIG_PATH)
    /// 3. `CONSTRUCT_`-prefixed environment variables (`__` separates nested keys)
    /// 4. Well-known credential variables (`ODYSSEY_API_KEY`, provider API keys)
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration source is invalid.
    pub fn load() -> crate::error::Result<Self> {
        use figment::{
            Figment,
            providers::{Env, Format, Serialized, Toml},
        };

        let mut figment = Figment::from(Serialized::defaults(ConstructConfig::default()))
            .merge(Toml::file("construct.toml"));

        // Check for custom config path
        if let Ok(path) = std::env::var("CONSTRUCT_CONFIG_PATH") {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("CONSTRUCT_").ignore(&["CONFIG_PATH"]).split("__"));

        let mut config: ConstructConfig = figment.extract().map_err(|e| {
            crate::error::ConstructError::Configuration(format!(
                "Failed to load configuration: {}",
                e
            ))
        })?;

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::error::Result<Self> {
        use figment::{
            Figment,
            providers::{Format, Serialized, Toml},
        };

        let config: ConstructConfig = Figment::from(Serialized::defaults(ConstructConfig::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| {
                crate::error::ConstructError::Configuration(format!(
                    "Failed to load configuration file: {}",
                    e
                ))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Fill credentials that are conventionally supplied through plain env vars.
    fn apply_env_overrides(&mut self) {
        if self.environment.api_key.is_none() {
            self.environment.api_key = std::env::var("ODYSSEY_API_KEY").ok();
        }

        if let Some(llm) = self.llm.as_mut() {
            if llm.api_key.is_none() {
                llm.api_key = llm
                    .provider
                    .api_key_vars()
                    .iter()
                    .find_map(|var| std::env::var(var).ok());
            }
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.defaults.timeout.is_zero() {
            return Err(crate::error::ConstructError::Configuration(
                "defaults.timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
