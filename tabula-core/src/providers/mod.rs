//! LLM provider implementations.
//!
//! Use `create_provider()` to instantiate the provider named by the config.

pub mod openai_compat;

use crate::brain::LlmProvider;
use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::types::{CompletionRequest, CompletionResponse};
use async_trait::async_trait;
use std::sync::Arc;

pub use openai_compat::OpenAiCompatibleProvider;

/// Build the provider described by `config`.
///
/// Every supported backend speaks the OpenAI chat completions format, so the
/// provider name only decides the default base URL.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.provider.to_ascii_lowercase().as_str() {
        "openai" | "azure" | "vllm" | "lmstudio" => {
            Ok(Arc::new(OpenAiCompatibleProvider::new(config)?))
        }
        "ollama" => {
            let mut local = config.clone();
            if local.base_url.is_none() {
                local.base_url = Some("http://localhost:11434/v1".to_string());
            }
            Ok(Arc::new(OpenAiCompatibleProvider::new(&local)?))
        }
        other => Err(LlmError::ApiRequest {
            message: format!("Unsupported provider: {}", other),
        }),
    }
}

/// Stands in for a provider that could not be built. Every call fails, so
/// narrative stages take their deterministic fallbacks.
pub struct UnavailableProvider {
    model: String,
    reason: String,
}

impl UnavailableProvider {
    pub fn new(model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl LlmProvider for UnavailableProvider {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        Err(LlmError::Connection {
            message: format!("LLM provider unavailable: {}", self.reason),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_provider_unknown() {
        let config = LlmConfig {
            provider: "telepathy".into(),
            ..LlmConfig::default()
        };
        let err = create_provider(&config).err().unwrap();
        assert!(err.to_string().contains("Unsupported provider"));
    }

    #[test]
    fn test_create_provider_ollama_defaults_local() {
        let config = LlmConfig {
            provider: "ollama".into(),
            model: "llama3.1:8b".into(),
            api_key_env: "TABULA_TEST_KEY_THAT_IS_NEVER_SET".into(),
            ..LlmConfig::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "llama3.1:8b");
    }

    #[tokio::test]
    async fn test_unavailable_provider_always_fails() {
        let provider = UnavailableProvider::new("gpt-4o", "no key");
        assert_eq!(provider.model_name(), "gpt-4o");
        let err = provider
            .complete(CompletionRequest::prompt("sys", "hi"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no key"));
    }
}
