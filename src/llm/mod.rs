//! Upstream model client abstraction.
//!
//! The request handler talks to the hosted model through the [`ChatModel`]
//! trait. Each user session owns one [`ConversationHandle`], which the client
//! reads and extends on every call; the rest of the service only passes it
//! through.
//!
//! # Drivers
//!
//! - [`GeminiDriver`]: Google Gemini `generateContent` API
//!
//! # Example
//!
//! ```rust,ignore
//! use gemini_relay::llm::{ChatModel, ConversationHandle, GeminiDriver, GeminiSettings};
//!
//! let driver = GeminiDriver::new(GeminiSettings::new("api-key"));
//! let mut conversation = ConversationHandle::new();
//! let reply = driver.send_message(&mut conversation, "hello").await?;
//! ```

pub mod gemini;

pub use gemini::GeminiDriver;

use serde::Serialize;

/// Default Gemini API base URL.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default Gemini model.
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Connection and generation settings for the Gemini API.
#[derive(Clone)]
pub struct GeminiSettings {
    /// Base URL for the API (e.g., `https://generativelanguage.googleapis.com`).
    pub base_url: String,
    /// API key sent as `x-goog-api-key`.
    pub api_key: String,
    /// Model identifier (e.g., `gemini-1.5-flash`).
    pub model: String,
    /// Sampling parameters sent with every request.
    pub generation: GenerationConfig,
}

impl GeminiSettings {
    /// Settings with the default endpoint, model and generation parameters.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            generation: GenerationConfig::default(),
        }
    }
}

impl std::fmt::Debug for GeminiSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Generation parameters, serialized as Gemini's `generationConfig`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
    pub response_mime_type: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_p: 0.95,
            top_k: 64,
            max_output_tokens: 8192,
            response_mime_type: "text/plain".to_string(),
        }
    }
}

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// Text sent by the user.
    User,
    /// Text generated by the model.
    Model,
}

/// A single turn of upstream conversation state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
}

/// Upstream conversation state for one user.
///
/// Only a [`ChatModel`] reads or extends the turns. The handle is not
/// `Clone`: each session owns exactly one.
#[derive(Debug, Default)]
pub struct ConversationHandle {
    turns: Vec<Turn>,
}

impl ConversationHandle {
    /// A fresh handle with no prior turns.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Prior turns, oldest first.
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Record a completed user/model exchange.
    pub fn push_exchange(&mut self, user_text: impl Into<String>, model_text: impl Into<String>) {
        self.turns.push(Turn {
            role: TurnRole::User,
            text: user_text.into(),
        });
        self.turns.push(Turn {
            role: TurnRole::Model,
            text: model_text.into(),
        });
    }
}

/// Errors from the upstream model service.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// The request could not be sent or the body could not be read.
    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The upstream answered with a non-success status.
    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The upstream body could not be decoded.
    #[error("malformed upstream response: {0}")]
    Malformed(String),

    /// The prompt was rejected by the upstream safety filters.
    #[error("prompt blocked by upstream: {0}")]
    Blocked(String),

    /// The upstream answered without any candidate text.
    #[error("upstream response contained no text")]
    EmptyResponse,
}

/// A conversational model that keeps multi-turn context in a
/// [`ConversationHandle`].
#[async_trait::async_trait]
pub trait ChatModel: Send + Sync + std::fmt::Debug {
    /// Send `text` as the next user turn and return the model's reply.
    ///
    /// On success the exchange is appended to `conversation`; on failure the
    /// handle is left unchanged.
    async fn send_message(
        &self,
        conversation: &mut ConversationHandle,
        text: &str,
    ) -> Result<String, LlmError>;
}
