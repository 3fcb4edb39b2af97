//! Conversation store.
//!
//! An ordered message list with named transitions. Insertion order is
//! display order. Every transition enforces the message lifecycle:
//!
//! ```text
//!   pending ──┐
//!             ├──▶ complete | error | stopped
//!   generating┘            │
//!        ▲                 │ restart (assistant only)
//!        └──── pending ◀───┘
//! ```
//!
//! At most one message is `generating` at any time. The store holds no
//! pipeline logic; the orchestrator decides which transition to apply.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{ChatError, ChatResult};
use crate::types::{Conversation, ConversationId, Message, MessageId, MessageStatus};

/// In-memory state of the active conversation
#[derive(Debug, Clone)]
pub struct ConversationStore {
    id: ConversationId,
    messages: Vec<Message>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    /// Create an empty conversation with a fresh id
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild a store from a saved conversation.
    ///
    /// Messages that were still in flight when the snapshot was taken can
    /// never resolve, so they come back as `stopped`.
    pub fn restore(conversation: Conversation) -> ChatResult<Self> {
        let mut store = Self {
            id: conversation.id,
            messages: Vec::with_capacity(conversation.messages.len()),
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
        };

        for mut message in conversation.messages {
            if store.position(&message.id).is_some() {
                return Err(ChatError::DuplicateMessage(message.id));
            }
            if !message.status.is_terminal() {
                message.status = MessageStatus::Stopped;
            }
            if message.status != MessageStatus::Error {
                message.error = None;
            }
            store.messages.push(message);
        }

        Ok(store)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Index of a message in display order
    pub fn position(&self, id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.id == id)
    }

    /// The message currently generating, if any
    pub fn generating(&self) -> Option<&Message> {
        self.messages
            .iter()
            .find(|m| m.status == MessageStatus::Generating)
    }

    /// Nearest user message strictly before `id`
    pub fn preceding_user(&self, id: &str) -> Option<&Message> {
        let index = self.position(id)?;
        self.messages[..index].iter().rev().find(|m| m.is_user())
    }

    /// Append a message at the end of the conversation
    pub fn append(&mut self, message: Message) -> ChatResult<MessageId> {
        if self.position(&message.id).is_some() {
            return Err(ChatError::DuplicateMessage(message.id));
        }
        if message.status == MessageStatus::Generating {
            if let Some(current) = self.generating() {
                return Err(ChatError::AlreadyGenerating {
                    generating: current.id.clone(),
                    requested: message.id,
                });
            }
        }

        debug!(id = %message.id, role = ?message.role, status = %message.status, "Appending message");
        let id = message.id.clone();
        self.messages.push(message);
        self.touch();
        Ok(id)
    }

    /// Replace the content of an in-flight message and mark it complete
    pub fn complete(&mut self, id: &str, content: impl Into<String>) -> ChatResult<()> {
        let message = self.in_flight_mut(id, MessageStatus::Complete)?;
        message.content = content.into();
        message.status = MessageStatus::Complete;
        message.error = None;
        debug!(id, "Message complete");
        self.touch();
        Ok(())
    }

    /// Mark a message as failed.
    ///
    /// Allowed on in-flight messages, and on user messages in any state:
    /// a user turn carries the error of the run it triggered.
    pub fn fail(&mut self, id: &str, reason: impl Into<String>) -> ChatResult<()> {
        let message = self.find_mut(id)?;
        if message.status.is_terminal() && !message.is_user() {
            return Err(ChatError::InvalidTransition {
                id: id.to_string(),
                from: message.status,
                to: MessageStatus::Error,
            });
        }
        message.status = MessageStatus::Error;
        message.error = Some(reason.into());
        debug!(id, "Message failed");
        self.touch();
        Ok(())
    }

    /// Stop an in-flight message. Stopping a stopped message is a no-op.
    pub fn stop(&mut self, id: &str, content: impl Into<String>) -> ChatResult<()> {
        if self.get(id).map(|m| m.status) == Some(MessageStatus::Stopped) {
            return Ok(());
        }
        let message = self.in_flight_mut(id, MessageStatus::Stopped)?;
        message.content = content.into();
        message.status = MessageStatus::Stopped;
        message.error = None;
        debug!(id, "Message stopped");
        self.touch();
        Ok(())
    }

    /// Reset a finished assistant message to a pending placeholder.
    ///
    /// Content and error are overwritten, never merged.
    pub fn restart(&mut self, id: &str, placeholder: impl Into<String>) -> ChatResult<()> {
        let message = self.find_mut(id)?;
        if !message.status.is_terminal() || !message.is_assistant() {
            return Err(ChatError::InvalidTransition {
                id: id.to_string(),
                from: message.status,
                to: MessageStatus::Pending,
            });
        }
        message.content = placeholder.into();
        message.status = MessageStatus::Pending;
        message.error = None;
        debug!(id, "Message restarted");
        self.touch();
        Ok(())
    }

    /// Remove a message from the conversation
    pub fn remove(&mut self, id: &str) -> ChatResult<Message> {
        let index = self
            .position(id)
            .ok_or_else(|| ChatError::MessageNotFound(id.to_string()))?;
        debug!(id, "Removing message");
        let message = self.messages.remove(index);
        self.touch();
        Ok(message)
    }

    /// Drop all messages and start a new conversation id
    pub fn reset(&mut self) {
        debug!(previous = %self.id, "Resetting conversation");
        *self = Self::new();
    }

    /// Serializable copy of the current conversation
    pub fn snapshot(&self) -> Conversation {
        Conversation {
            id: self.id.clone(),
            messages: self.messages.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn find_mut(&mut self, id: &str) -> ChatResult<&mut Message> {
        self.messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| ChatError::MessageNotFound(id.to_string()))
    }

    fn in_flight_mut(&mut self, id: &str, to: MessageStatus) -> ChatResult<&mut Message> {
        let message = self.find_mut(id)?;
        if message.status.is_terminal() {
            return Err(ChatError::InvalidTransition {
                id: id.to_string(),
                from: message.status,
                to,
            });
        }
        Ok(message)
    }
}
