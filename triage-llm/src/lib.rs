//! Triage LLM Client
//!
//! A small client for OpenAI-compatible chat-completions endpoints.
//!
//! Analysis code depends on the [`ChatClient`] trait rather than the concrete
//! HTTP client so tests can substitute scripted responses.
//!
//! # Example
//!
//! ```no_run
//! use triage_llm::{ChatClient, ChatRequest, OpenAiClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), triage_llm::LlmError> {
//!     let client = OpenAiClient::new("https://api.openai.com/v1", "sk-...", "gpt-4o-mini");
//!     let answer = client
//!         .chat(ChatRequest::new("You are terse.", "Say hi").with_temperature(0.3))
//!         .await?;
//!     println!("{}", answer);
//!     Ok(())
//! }
//! ```

mod chat;
pub mod error;

pub use chat::{ChatMessage, ChatRequest};
pub use error::{LlmError, Result};

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::chat::{CompletionBody, CompletionResponse};

/// Anything that can answer a chat request with text
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Sends the request and returns the first completion's content
    async fn chat(&self, request: ChatRequest) -> Result<String>;
}

/// HTTP client for an OpenAI-compatible `/chat/completions` endpoint
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    /// Base URL of the API (e.g., "https://api.openai.com/v1")
    base_url: String,
    api_key: String,
    model: String,
    /// HTTP client instance
    client: Client,
}

impl OpenAiClient {
    /// Create a new client with reqwest defaults
    ///
    /// # Arguments
    /// * `base_url` - The API base URL, without the `/chat/completions` suffix
    /// * `api_key` - Bearer token
    /// * `model` - Model name sent with every request
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self::with_client(base_url, api_key, model, Client::new())
    }

    /// Create a client whose requests time out after `timeout`
    ///
    /// Connection establishment is bounded separately at 10 seconds.
    pub fn with_timeout(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10).min(timeout))
            .build()
            .map_err(|e| LlmError::Request(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(base_url, api_key, model, client))
    }

    /// Create a client with a custom HTTP client
    pub fn with_client(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        client: Client,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        }
    }

    /// Get the base URL of the API
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the configured model name
    pub fn model(&self) -> &str {
        &self.model
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Check the status code and extract the first completion's content
    async fn handle_response(&self, response: reqwest::Response) -> Result<String> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LlmError::from_status(status.as_u16(), error_text));
        }

        let body = response.text().await?;
        let completion: CompletionResponse = serde_json::from_str(&body)
            .map_err(|e| LlmError::Parse(format!("Failed to parse JSON response: {}", e)))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(LlmError::EmptyResponse)?;

        if content.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        Ok(content)
    }
}

#[async_trait]
impl ChatClient for OpenAiClient {
    async fn chat(&self, request: ChatRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = CompletionBody {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        tracing::debug!(
            "Sending chat request to {} (model={}, messages={})",
            url,
            self.model,
            request.messages.len()
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        self.handle_response(response).await
    }
}
