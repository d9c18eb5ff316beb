//! OpenAI provider adapter.

use std::sync::Arc;

use crate::llm::provider::{LlmProvider, ProviderConfig, ProviderType};
use crate::llm::providers::base::OpenAICompatible;
use crate::llm::providers::openai_compatible::OpenAICompatibleProvider;

pub struct OpenAIAdapter {
    base_url: String,
    api_key: Option<String>,
}

impl OpenAIAdapter {
    pub fn new(api_key: Option<String>, base_url: Option<String>) -> Self {
        Self {
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            api_key,
        }
    }
}

impl OpenAICompatible for OpenAIAdapter {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }
}

pub type OpenAIProvider = OpenAICompatibleProvider<OpenAIAdapter>;

impl OpenAIProvider {
    pub fn create(config: ProviderConfig) -> Arc<dyn LlmProvider> {
        let adapter = OpenAIAdapter::new(config.api_key.clone(), config.base_url.clone());
        Arc::new(OpenAICompatibleProvider::new(adapter, config))
    }

    pub fn from_config(api_key: String, text_model: String, embedding_model: String) -> Arc<dyn LlmProvider> {
        let config = ProviderConfig {
            provider: ProviderType::OpenAI,
            name: "openai".to_string(),
            api_key: Some(api_key),
            base_url: None,
            text_model,
            embedding_model: Some(embedding_model),
            max_tokens: 4096,
            temperature: 0.7,
            timeout: 120,
        };
        Self::create(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_the_public_api_base_url() {
        let adapter = OpenAIAdapter::new(Some("test-key".to_string()), None);
        assert_eq!(adapter.base_url(), "https://api.openai.com/v1");
    }

    #[test]
    fn honors_a_custom_base_url() {
        let adapter = OpenAIAdapter::new(
            Some("test-key".to_string()),
            Some("https://custom.endpoint.com/v1".to_string()),
        );
        assert_eq!(adapter.base_url(), "https://custom.endpoint.com/v1");
    }
}
