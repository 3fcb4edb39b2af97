//! Transcript export.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ChatError;
use crate::types::{Conversation, Message, MessageRole, MessageStatus};

/// Supported transcript formats
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Markdown,
    Text,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::Text => "txt",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "md" | "markdown" => Ok(Self::Markdown),
            "txt" | "text" => Ok(Self::Text),
            other => Err(ChatError::Config(format!(
                "Unsupported export format: {} (expected md or txt)",
                other
            ))),
        }
    }
}

/// Render a conversation in the given format
pub fn export_conversation(conversation: &Conversation, format: ExportFormat) -> String {
    match format {
        ExportFormat::Markdown => to_markdown(conversation),
        ExportFormat::Text => to_text(conversation),
    }
}

fn body(message: &Message) -> String {
    match (&message.status, &message.error) {
        (MessageStatus::Error, Some(error)) if message.content.trim().is_empty() => {
            format!("Error: {}", error)
        }
        (MessageStatus::Error, Some(error)) => format!("{}\n\nError: {}", message.content, error),
        _ => message.content.clone(),
    }
}

pub fn to_text(conversation: &Conversation) -> String {
    conversation
        .messages
        .iter()
        .map(|message| {
            let speaker = match message.role {
                MessageRole::User => "User",
                MessageRole::Assistant => "Assistant",
            };
            format!("{}:\n{}\n", speaker, body(message))
        })
        .collect::<Vec<_>>()
        .join("\n---\n\n")
}

pub fn to_markdown(conversation: &Conversation) -> String {
    let mut out = format!(
        "# {}\n\n_Exported {}_\n\n",
        conversation.title(),
        conversation.updated_at.format("%Y-%m-%d %H:%M UTC")
    );

    for message in &conversation.messages {
        let heading = match (message.role, &message.model) {
            (MessageRole::User, _) => "### User".to_string(),
            (MessageRole::Assistant, Some(model)) => format!("### Assistant ({})", model),
            (MessageRole::Assistant, None) => "### Assistant".to_string(),
        };
        out.push_str(&heading);
        out.push_str("\n\n");
        out.push_str(body(message).trim_end());
        out.push_str("\n\n");
    }

    out
}
