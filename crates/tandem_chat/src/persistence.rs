//! Chat archive.
//!
//! Saved conversations live in the workspace under:
//! `.tandem/chats/<conversationId>.json`
//!
//! Each file holds one pretty-printed [`Conversation`] snapshot. Saving the
//! same conversation again overwrites its file.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ChatError, ChatResult};
use crate::types::{Conversation, ConversationId};

/// Listing entry for a saved chat
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedChatSummary {
    pub id: ConversationId,
    pub title: String,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Conversation> for ArchivedChatSummary {
    fn from(conversation: &Conversation) -> Self {
        Self {
            id: conversation.id.clone(),
            title: conversation.title(),
            message_count: conversation.messages.len(),
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
        }
    }
}

/// File-backed store of saved chats
#[derive(Debug, Clone)]
pub struct ChatArchive {
    /// Root path of the workspace
    workspace_root: PathBuf,
}

impl ChatArchive {
    pub fn new(workspace_root: impl AsRef<Path>) -> Self {
        Self {
            workspace_root: workspace_root.as_ref().to_path_buf(),
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Directory holding the saved chats
    pub fn chats_dir(&self) -> PathBuf {
        self.workspace_root.join(".tandem").join("chats")
    }

    fn chat_path(&self, id: &str) -> ChatResult<PathBuf> {
        // Ids become file names
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(ChatError::ChatNotFound(id.to_string()));
        }
        Ok(self.chats_dir().join(format!("{}.json", id)))
    }

    /// Save a conversation snapshot
    pub fn save(&self, conversation: &Conversation) -> ChatResult<PathBuf> {
        let path = self.chat_path(&conversation.id)?;
        fs::create_dir_all(self.chats_dir())?;

        let content = serde_json::to_string_pretty(conversation)?;
        fs::write(&path, content)?;

        debug!(conversation = %conversation.id, path = %path.display(), "Saved chat");
        Ok(path)
    }

    /// Load a saved conversation by id
    pub fn load(&self, id: &str) -> ChatResult<Conversation> {
        let path = self.chat_path(id)?;
        if !path.exists() {
            return Err(ChatError::ChatNotFound(id.to_string()));
        }

        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Saved chats, most recently updated first
    pub fn list(&self) -> ChatResult<Vec<ArchivedChatSummary>> {
        let dir = self.chats_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut summaries = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().map_or(true, |e| e != "json") {
                continue;
            }

            let content = fs::read_to_string(&path)?;
            match serde_json::from_str::<Conversation>(&content) {
                Ok(conversation) => summaries.push(ArchivedChatSummary::from(&conversation)),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable chat"),
            }
        }

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    /// Delete a saved chat
    pub fn delete(&self, id: &str) -> ChatResult<()> {
        let path = self.chat_path(id)?;
        if !path.exists() {
            return Err(ChatError::ChatNotFound(id.to_string()));
        }

        fs::remove_file(path)?;
        debug!(conversation = id, "Deleted chat");
        Ok(())
    }

    pub fn exists(&self, id: &str) -> bool {
        self.chat_path(id).map(|p| p.exists()).unwrap_or(false)
    }
}
