//! Clients for the external generative-AI provider.
//!
//! The chat gateway only depends on the [`LlmDriver`] trait, which streams
//! the assistant's reply as plain text fragments. Image generation goes
//! through the separate [`ImageGenerator`] trait.
//!
//! # Drivers
//!
//! - [`ChatCompletionsDriver`]: OpenAI-compatible `/v1/chat/completions` with `stream: true`
//! - [`ImagesClient`]: OpenAI-compatible `/v1/images/generations`

pub mod chat_completions;
pub mod images;
pub mod provider;

pub use chat_completions::ChatCompletionsDriver;
pub use images::{ImageGenerator, ImagesClient, describe_image_error};
pub use provider::Provider;

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};

/// Model used when `LLM_MODEL` is not set.
pub const DEFAULT_MODEL: &str = "chatgpt-4o-latest";

/// Provider connection and sampling settings.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    /// Base URL for the API (e.g., `https://api.openai.com`).
    pub base_url: String,
    /// API key, sent as a bearer token (or `api-key` header on Azure).
    pub api_key: String,
    /// Model identifier.
    pub model: String,
    /// Provider type, detected from `base_url`.
    pub provider: Provider,
    /// Sampling temperature for chat completions.
    pub temperature: f64,
    /// Upper bound on generated tokens per reply.
    pub max_tokens: u32,
}

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System prompt.
    System,
    /// User message.
    User,
    /// Assistant response.
    Assistant,
}

/// One entry in a conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message author.
    pub role: MessageRole,
    /// Text content.
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Errors raised while talking to the provider.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Transport-level failure (connect, TLS, body read, timeout).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message extracted from the response body.
        message: String,
    },

    /// A response body or stream frame was not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The response parsed but lacked an expected field.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// Whether this error came from a request timing out.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout(),
            Self::Api { status, .. } => *status == 408 || *status == 504,
            _ => false,
        }
    }

    /// Whether the provider rejected the request for rate limiting.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Api { status: 429, .. })
    }

    /// Build an [`LlmError::Api`] from a failed response, pulling the message
    /// out of an `{"error": {"message": ...}}` body when present.
    pub(crate) async fn from_response(resp: reqwest::Response) -> Self {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(|m| m.as_str())
                    .map(ToString::to_string)
            })
            .unwrap_or(body);
        Self::Api { status, message }
    }
}

/// A streamed sequence of assistant text fragments.
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// Request to an LLM driver.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Full conversation log, system prompt first.
    pub messages: Vec<Message>,
}

/// Trait for streaming completion drivers.
///
/// Implementations emit the assistant reply as text fragments in the order
/// the provider produced them. The stream ends when the reply is complete.
#[async_trait::async_trait]
pub trait LlmDriver: Send + Sync {
    /// Start a streamed completion.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be sent or is rejected. Errors
    /// after the first fragment surface as items of the stream.
    async fn stream(&self, req: CompletionRequest) -> Result<CompletionStream, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_wire_shape() {
        let json = serde_json::to_value(Message::assistant("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "assistant", "content": "hi"}));
    }

    #[test]
    fn test_rate_limit_detection() {
        let err = LlmError::Api {
            status: 429,
            message: "slow down".to_string(),
        };
        assert!(err.is_rate_limited());
        assert!(!err.is_timeout());
    }
}
