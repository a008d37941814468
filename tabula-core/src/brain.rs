//! Brain module: the LLM completion contract and a thin wrapper around it.
//!
//! Every narrative stage of the pipeline talks to the model through
//! [`Brain`], which owns an `Arc<dyn LlmProvider>`, applies the configured
//! model and token limit, tracks usage, and parses JSON-mode completions.

use crate::error::LlmError;
use crate::types::{CompletionRequest, CompletionResponse, Message, TokenUsage};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Trait for LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Return the model name.
    fn model_name(&self) -> &str;
}

/// Wraps a provider with request defaults and usage accounting.
pub struct Brain {
    provider: Arc<dyn LlmProvider>,
    model: Option<String>,
    max_tokens: Option<usize>,
    total_usage: Mutex<TokenUsage>,
}

impl Brain {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            model: None,
            max_tokens: None,
            total_usage: Mutex::new(TokenUsage::default()),
        }
    }

    /// Override the model name sent with every request.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    /// Accumulated token usage across every call made through this brain.
    pub fn total_usage(&self) -> TokenUsage {
        self.total_usage
            .lock()
            .map(|usage| *usage)
            .unwrap_or_default()
    }

    /// Send a request and return the raw response, applying brain defaults.
    pub async fn complete(
        &self,
        mut request: CompletionRequest,
    ) -> Result<CompletionResponse, LlmError> {
        if request.model.is_none() {
            request.model = self.model.clone();
        }
        if request.max_tokens.is_none() {
            request.max_tokens = self.max_tokens;
        }
        let response = self.provider.complete(request).await?;
        if let Ok(mut usage) = self.total_usage.lock() {
            usage.accumulate(&response.usage);
        }
        Ok(response)
    }

    /// Ask for free text. Empty completions are reported as errors.
    pub async fn ask(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> Result<String, LlmError> {
        let request = CompletionRequest::prompt(system, user).with_temperature(temperature);
        let response = self.complete(request).await?;
        let text = response.text().trim();
        if text.is_empty() {
            return Err(LlmError::EmptyCompletion);
        }
        Ok(text.to_string())
    }

    /// Ask for a JSON object (JSON mode) and parse it.
    pub async fn ask_json(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> Result<Value, LlmError> {
        let request = CompletionRequest::prompt(system, user)
            .with_temperature(temperature)
            .with_json_mode();
        let response = self.complete(request).await?;
        debug!(
            model = %response.model,
            chars = response.text().len(),
            "Parsing JSON completion"
        );
        parse_json_object(response.text())
    }
}

/// Parse a completion that should contain one JSON object.
///
/// Tolerates Markdown code fences and prose around the object.
pub fn parse_json_object(text: &str) -> Result<Value, LlmError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(LlmError::EmptyCompletion);
    }
    let start = trimmed.find('{');
    let end = trimmed.rfind('}');
    let candidate = match (start, end) {
        (Some(s), Some(e)) if e > s => &trimmed[s..=e],
        _ => {
            return Err(LlmError::ResponseParse {
                message: "No JSON object in completion".to_string(),
            });
        }
    };
    let value: Value = serde_json::from_str(candidate).map_err(|e| LlmError::ResponseParse {
        message: format!("Invalid JSON: {}", e),
    })?;
    if !value.is_object() {
        return Err(LlmError::ResponseParse {
            message: "Completion JSON is not an object".to_string(),
        });
    }
    Ok(value)
}

type MockHandler = dyn Fn(&CompletionRequest) -> Option<String> + Send + Sync;

/// A mock LLM provider for testing.
///
/// Replies come from a handler when one is installed, otherwise from a FIFO
/// queue. A handler returning `None` produces an API error, which lets tests
/// exercise every fallback path.
pub struct MockLlmProvider {
    model: String,
    responses: Mutex<VecDeque<String>>,
    handler: Option<Box<MockHandler>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            responses: Mutex::new(VecDeque::new()),
            handler: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a MockLlmProvider that always returns the given text.
    ///
    /// Queues multiple copies of the response so it can handle multiple calls.
    pub fn with_response(text: &str) -> Self {
        let provider = Self::new();
        for _ in 0..20 {
            provider.queue_response(text);
        }
        provider
    }

    /// Route every request through `handler`.
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            handler: Some(Box::new(handler)),
            ..Self::new()
        }
    }

    /// A provider whose every call fails.
    pub fn failing() -> Self {
        Self::with_handler(|_| None)
    }

    /// Queue a response to be returned by the next `complete` call.
    pub fn queue_response(&self, text: &str) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(text.to_string());
        }
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Create a simple text response for testing.
    pub fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            message: Message::assistant(text),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
            model: "mock-model".to_string(),
            finish_reason: Some("stop".to_string()),
        }
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request.clone());
        }
        if let Some(handler) = &self.handler {
            return handler(&request)
                .map(|text| Self::text_response(&text))
                .ok_or_else(|| LlmError::ApiRequest {
                    message: "mock provider refused the request".to_string(),
                });
        }
        let next = self
            .responses
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());
        Ok(Self::text_response(next.as_deref().unwrap_or(
            "I'm a mock LLM. No queued responses available.",
        )))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_provider_queue() {
        let provider = MockLlmProvider::new();
        provider.queue_response("first");
        provider.queue_response("second");
        let a = provider.complete(CompletionRequest::default()).await.unwrap();
        let b = provider.complete(CompletionRequest::default()).await.unwrap();
        assert_eq!(a.text(), "first");
        assert_eq!(b.text(), "second");
    }

    #[tokio::test]
    async fn test_mock_provider_empty_queue_fallback() {
        let provider = MockLlmProvider::new();
        let resp = provider.complete(CompletionRequest::default()).await.unwrap();
        assert!(resp.text().contains("mock LLM"));
    }

    #[tokio::test]
    async fn test_mock_failing() {
        let provider = MockLlmProvider::failing();
        let err = provider
            .complete(CompletionRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::ApiRequest { .. }));
    }

    #[tokio::test]
    async fn test_brain_ask_json_sets_json_mode() {
        let mock = Arc::new(MockLlmProvider::with_response(r#"{"ok": true}"#));
        let brain = Brain::new(mock.clone()).with_model("gpt-4o");
        let value = brain.ask_json("sys", "user", 0.3).await.unwrap();
        assert_eq!(value["ok"], true);

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].json_mode);
        assert_eq!(requests[0].model.as_deref(), Some("gpt-4o"));
    }

    #[tokio::test]
    async fn test_brain_tracks_usage() {
        let brain = Brain::new(Arc::new(MockLlmProvider::with_response("hello")));
        brain.ask("sys", "user", 0.4).await.unwrap();
        brain.ask("sys", "user", 0.4).await.unwrap();
        assert_eq!(brain.total_usage().total(), 300);
    }

    #[tokio::test]
    async fn test_brain_ask_rejects_blank() {
        let brain = Brain::new(Arc::new(MockLlmProvider::with_response("   ")));
        let err = brain.ask("sys", "user", 0.4).await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyCompletion));
    }

    #[test]
    fn test_parse_json_object_fenced() {
        let text = "```json\n{\"segments\": []}\n```";
        let value = parse_json_object(text).unwrap();
        assert!(value["segments"].is_array());
    }

    #[test]
    fn test_parse_json_object_rejects_garbage() {
        assert!(matches!(
            parse_json_object("not json at all"),
            Err(LlmError::ResponseParse { .. })
        ));
        assert!(matches!(
            parse_json_object(""),
            Err(LlmError::EmptyCompletion)
        ));
        assert!(parse_json_object("{broken").is_err());
    }
}
