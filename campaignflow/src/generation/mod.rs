//! The external generation capability.
//!
//! The pipeline only depends on the narrow [`GenerationProvider`] contract:
//! a request carrying the agent instructions and the conversation so far, and
//! either a text response or a transient/permanent error. How the model is
//! hosted is up to the implementation.

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::HttpGenerationProvider;

use crate::core::OutputKind;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The pipeline.
    User,
    /// The model.
    Assistant,
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who wrote it.
    pub role: Role,
    /// Text content.
    pub content: String,
}

impl Message {
    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A request to the generation capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The stage being generated.
    pub stage_id: String,
    /// Session shared by all stages of one run.
    pub session_id: String,
    /// Model override from the agent role, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Agent role instructions.
    pub instructions: String,
    /// Conversation, starting with the rendered prompt.
    pub messages: Vec<Message>,
    /// Response format hint.
    pub output_kind: OutputKind,
}

impl GenerationRequest {
    /// Creates a request with a single user prompt.
    #[must_use]
    pub fn new(
        stage_id: impl Into<String>,
        session_id: impl Into<String>,
        prompt: impl Into<String>,
        output_kind: OutputKind,
    ) -> Self {
        Self {
            stage_id: stage_id.into(),
            session_id: session_id.into(),
            model: None,
            instructions: String::new(),
            messages: vec![Message::user(prompt)],
            output_kind,
        }
    }

    /// Sets the agent instructions.
    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Sets the model override.
    #[must_use]
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    /// Returns the rendered prompt (the first user message).
    #[must_use]
    pub fn prompt(&self) -> &str {
        self.messages.first().map_or("", |m| m.content.as_str())
    }

    /// Returns true if this request carries a corrective follow-up.
    #[must_use]
    pub fn is_follow_up(&self) -> bool {
        self.messages.len() > 1
    }
}

/// A successful response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Generated text.
    pub text: String,
    /// Model that produced it, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Input tokens, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u32>,
    /// Output tokens, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u32>,
}

impl GenerationResponse {
    /// Creates a response with just text.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// Failure reported by the generation capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// Worth retrying: throttling, timeouts, unavailable backends.
    #[error("transient generation failure: {0}")]
    Transient(String),
    /// Not worth retrying: invalid input, access denied.
    #[error("generation rejected: {0}")]
    Permanent(String),
}

impl GenerationError {
    /// Returns true if the failure may succeed on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Returns the detail message.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Transient(m) | Self::Permanent(m) => m,
        }
    }
}

/// The generation capability the stage executor calls.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Generates a response for one request.
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, GenerationError>;

    /// Releases anything held for a run session. Called once per run.
    async fn release_session(&self, _session_id: &str) {}
}
