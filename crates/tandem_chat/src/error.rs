//! Error types for the chat system.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::MessageStatus;

/// Chat system errors
#[derive(Error, Debug)]
pub enum ChatError {
    /// A message with this id is already in the conversation
    #[error("Duplicate message id: {0}")]
    DuplicateMessage(String),

    /// Message not found in the conversation
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// Another message is already generating
    #[error("Message {generating} is already generating; cannot start {requested}")]
    AlreadyGenerating { generating: String, requested: String },

    /// Status transition not allowed by the message lifecycle
    #[error("Invalid transition for message {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: MessageStatus,
        to: MessageStatus,
    },

    /// Saved chat not found in the archive
    #[error("Chat not found: {0}")]
    ChatNotFound(String),

    /// Configuration could not be loaded or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for chat operations
pub type ChatResult<T> = Result<T, ChatError>;

/// Category of a completion failure
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Missing or rejected credential
    Auth,
    /// Transport failure or timeout
    Network,
    /// Provider throttled the request
    RateLimit,
    /// Provider does not know the requested model
    InvalidModel,
    /// Any other error reported by the provider
    ProviderError,
    /// Failure that could not be categorized
    Unknown,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Network => "network",
            Self::RateLimit => "rate_limit",
            Self::InvalidModel => "invalid_model",
            Self::ProviderError => "provider_error",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure returned by a completion client.
///
/// This is an outcome of a stage, not an error of the pipeline: the
/// orchestrator converts it into a terminal message status.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct CompletionFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl CompletionFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Auth, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Network, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(FailureKind::RateLimit, message)
    }

    pub fn invalid_model(message: impl Into<String>) -> Self {
        Self::new(FailureKind::InvalidModel, message)
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(FailureKind::ProviderError, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Unknown, message)
    }
}
