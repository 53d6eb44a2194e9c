//! Upstream provider abstraction for text completion and image generation.
//!
//! The relay only needs two capabilities from a vendor: a streamed chat
//! completion and a single image generation. Both are modeled as traits so the
//! HTTP client can be swapped for a stub in tests.

mod openai;
pub mod sse;

pub use openai::OpenAIProvider;

use crate::session::Turn;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

// ============================================================================
// Provider Traits
// ============================================================================

/// Lazy, finite, non-restartable sequence of assistant output fragments.
///
/// Dropping the stream before it ends cancels the underlying request.
pub type FragmentStream = BoxStream<'static, Result<String, ProviderError>>;

/// Upstream capability that streams chat completions.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Open a streamed chat completion.
    ///
    /// Errors returned here happen before any fragment is produced; errors
    /// surfaced as stream items happen mid-stream.
    async fn stream_chat(&self, request: ChatRequest) -> Result<FragmentStream, ProviderError>;
}

/// Upstream capability that generates images from a prompt.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Generate images for a prompt.
    async fn generate_image(&self, request: ImageRequest) -> Result<ImageResponse, ProviderError>;
}

/// Error from a provider.
#[derive(Debug, Clone)]
pub struct ProviderError {
    pub provider: String,
    pub model: String,
    pub message: String,
    pub status_code: Option<u16>,
}

impl ProviderError {
    /// Create an error that carries no HTTP status.
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            message: message.into(),
            status_code: None,
        }
    }

    /// Attach the HTTP status returned by the upstream.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:{}] {}", self.provider, self.model, self.message)
    }
}

impl std::error::Error for ProviderError {}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Streamed chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model to use
    pub model: String,
    /// Messages in the conversation, system persona first
    pub messages: Vec<Message>,
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// A message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl From<&Turn> for Message {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role.as_str().to_string(),
            content: turn.content.clone(),
        }
    }
}

/// Image generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRequest {
    pub prompt: String,
    /// Number of images
    pub n: u32,
    /// Resolution, e.g. `256x256`
    pub size: String,
}

/// Image generation response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageResponse {
    /// Locators of the generated assets, in upstream order
    pub urls: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;

    #[test]
    fn test_message_from_turn() {
        let turn = Turn::new(Role::Assistant, "Lists are ordered.");
        let message = Message::from(&turn);
        assert_eq!(message.role, "assistant");
        assert_eq!(message.content, "Lists are ordered.");
    }

    #[test]
    fn test_chat_request_serialization() {
        let request = ChatRequest {
            model: "gpt-4".into(),
            messages: vec![Message {
                role: "user".into(),
                content: "Hello".into(),
            }],
            temperature: None,
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("gpt-4"));
        assert!(json.contains("Hello"));
        assert!(!json.contains("temperature"));
    }

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::new("openai", "gpt-4", "API error: boom").with_status(500);
        assert_eq!(err.to_string(), "[openai:gpt-4] API error: boom");
        assert_eq!(err.status_code, Some(500));
    }
}
