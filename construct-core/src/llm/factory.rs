//! Factory for creating LLM providers from configuration

use crate::config::LLMProviderConfig;
use crate::error::Result;
use crate::llm::LLMProvider;
use std::sync::Arc;

#[cfg(feature = "llm-openai")]
use crate::llm::providers::openai::OpenAIProvider;

/// Factory for creating LLM providers
pub struct LLMProviderFactory;

impl LLMProviderFactory {
    /// Create an LLM provider from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot be created (e.g., missing API key)
    #[cfg(feature = "llm-openai")]
    pub fn create(config: &LLMProviderConfig) -> Result<Arc<dyn LLMProvider>> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| {
                config
                    .provider
                    .api_key_vars()
                    .iter()
                    .find_map(|var| std::env::var(var).ok())
            })
            .ok_or_else(|| {
                crate::error::ConstructError::Configuration(format!(
                    "No API key for {:?}; set one of {}",
                    config.provider,
                    config.provider.api_key_vars().join(", ")
                ))
            })?;

        let model = if config.model.is_empty() {
            None
        } else {
            Some(config.model.clone())
        };

        tracing::debug!(provider = ?config.provider, model = ?model, "creating LLM provider");

        Ok(Arc::new(OpenAIProvider::for_provider(
            config.provider,
            api_key,
            model,
            config.base_url.clone(),
        )))
    }

    /// Create an LLM provider from configuration
    ///
    /// # Errors
    ///
    /// Always errors: provider clients require the `llm-openai` feature
    #[cfg(not(feature = "llm-openai"))]
    pub fn create(config: &LLMProviderConfig) -> Result<Arc<dyn LLMProvider>> {
        Err(crate::error::ConstructError::Configuration(format!(
            "{:?} provider requires 'llm-openai' feature",
            config.provider
        )))
    }

    /// Create from ConstructConfig (if LLM config is present)
    pub fn from_config(config: Option<&LLMProviderConfig>) -> Result<Option<Arc<dyn LLMProvider>>> {
        config.map(Self::create).transpose()
    }
}
