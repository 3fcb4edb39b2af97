//! Core types for the two-stage chat.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a message
pub type MessageId = String;

/// Unique identifier for a conversation
pub type ConversationId = String;

/// Message role in a conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// Lifecycle status of a message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Waiting for a run to produce content
    Pending,
    /// A stage is currently producing content
    Generating,
    /// Content is final
    Complete,
    /// The turn failed; `error` carries the reason
    Error,
    /// Generation was stopped by the user
    Stopped,
}

impl MessageStatus {
    /// Whether this status ends the message lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error | Self::Stopped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Generating => "generating",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single chat message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Unique message ID (UUID)
    pub id: MessageId,
    /// Role of the message sender
    pub role: MessageRole,
    /// Message content
    pub content: String,
    /// Lifecycle status
    pub status: MessageStatus,
    /// Model that produced (or will produce) the content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// When the message was created
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    /// Failure reason, present iff status is `error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Message {
    /// Create a new user message. User turns are complete on creation.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: MessageRole::User,
            content: content.into(),
            status: MessageStatus::Complete,
            model: None,
            created_at: Utc::now(),
            error: None,
        }
    }

    /// Create an assistant placeholder that is generating with `model`
    pub fn generating(model: impl Into<String>, placeholder: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: MessageRole::Assistant,
            content: placeholder.into(),
            status: MessageStatus::Generating,
            model: Some(model.into()),
            created_at: Utc::now(),
            error: None,
        }
    }

    /// Create a complete assistant message
    pub fn assistant(model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            status: MessageStatus::Complete,
            ..Self::generating(model, content)
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == MessageRole::User
    }

    pub fn is_assistant(&self) -> bool {
        self.role == MessageRole::Assistant
    }
}

/// Serializable snapshot of a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: ConversationId,
    /// Messages in display order
    pub messages: Vec<Message>,
    /// When the conversation was started
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    /// When the conversation last changed
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    const TITLE_LIMIT: usize = 60;

    /// Title derived from the first user message
    pub fn title(&self) -> String {
        let first = self
            .messages
            .iter()
            .find(|m| m.is_user())
            .map(|m| m.content.trim())
            .unwrap_or("");

        if first.is_empty() {
            return "New chat".to_string();
        }

        let line = first.lines().next().unwrap_or(first);
        if line.chars().count() > Self::TITLE_LIMIT {
            let truncated: String = line.chars().take(Self::TITLE_LIMIT).collect();
            format!("{}...", truncated.trim_end())
        } else {
            line.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, MessageRole::User);
        assert_eq!(msg.status, MessageStatus::Complete);
        assert!(msg.model.is_none());

        let msg = Message::generating("m1", "Analyzing the request...");
        assert_eq!(msg.role, MessageRole::Assistant);
        assert_eq!(msg.status, MessageStatus::Generating);
        assert_eq!(msg.model.as_deref(), Some("m1"));

        let msg = Message::assistant("m2", "Done");
        assert_eq!(msg.status, MessageStatus::Complete);
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Message::user("same");
        let b = Message::user("same");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!MessageStatus::Pending.is_terminal());
        assert!(!MessageStatus::Generating.is_terminal());
        assert!(MessageStatus::Complete.is_terminal());
        assert!(MessageStatus::Error.is_terminal());
        assert!(MessageStatus::Stopped.is_terminal());
    }

    #[test]
    fn test_message_serialization() {
        let msg = Message::generating("m1", "...");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["status"], "generating");
        assert!(json.get("error").is_none());
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn test_conversation_title() {
        let now = Utc::now();
        let mut conversation = Conversation {
            id: "c1".to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        assert_eq!(conversation.title(), "New chat");

        conversation.messages.push(Message::user("Build a login form\nwith validation"));
        assert_eq!(conversation.title(), "Build a login form");

        conversation.messages[0].content = "x".repeat(80);
        let title = conversation.title();
        assert!(title.ends_with("..."));
        assert_eq!(title.chars().count(), 63);
    }
}
