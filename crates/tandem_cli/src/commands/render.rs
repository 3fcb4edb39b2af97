//! Terminal rendering of a running conversation.

use std::collections::HashMap;
use std::future::Future;

use anyhow::Result;
use tokio::sync::watch;

use tandem_chat::{
    estimate_tokens, format_token_count, ChatResult, Message, MessageId, MessageRole,
    MessageStatus, Orchestrator, PipelineOutcome,
};

/// Prints each message once per status change
#[derive(Default)]
pub struct Renderer {
    shown: HashMap<MessageId, MessageStatus>,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip everything already in the conversation
    pub fn mark_seen(&mut self, messages: &[Message]) {
        for message in messages {
            self.shown.insert(message.id.clone(), message.status);
        }
    }

    pub fn reset(&mut self) {
        self.shown.clear();
    }

    pub fn render(&mut self, messages: &[Message]) {
        for line in self.pending_output(messages) {
            match line {
                Output::Progress(text) => eprintln!("{}", text),
                Output::Transcript(text) => println!("{}", text),
            }
        }
    }

    fn pending_output(&mut self, messages: &[Message]) -> Vec<Output> {
        let mut out = Vec::new();
        for message in messages {
            if self.shown.get(&message.id) == Some(&message.status) {
                continue;
            }
            self.shown.insert(message.id.clone(), message.status);

            match (message.role, message.status) {
                (MessageRole::User, MessageStatus::Error) => out.push(Output::Progress(format!(
                    "⚠️  {}",
                    message.error.as_deref().unwrap_or("Request failed")
                ))),
                (MessageRole::User, _) => {}
                (MessageRole::Assistant, MessageStatus::Pending | MessageStatus::Generating) => {
                    out.push(Output::Progress(format!("⏳ {}", message.content)))
                }
                (MessageRole::Assistant, MessageStatus::Complete) => {
                    out.push(Output::Transcript(format!(
                        "── {} · ~{} tokens ──\n{}\n",
                        message.model.as_deref().unwrap_or("assistant"),
                        format_token_count(estimate_tokens(&message.content)),
                        message.content.trim_end()
                    )))
                }
                (MessageRole::Assistant, _) => {
                    out.push(Output::Progress(format!("⏹  {}", message.content)))
                }
            }
        }
        out
    }
}

#[derive(Debug, PartialEq)]
enum Output {
    Progress(String),
    Transcript(String),
}

/// Await a run while rendering progress; Ctrl-C stops the generation.
pub async fn run_interruptible<F>(
    orchestrator: &Orchestrator,
    renderer: &mut Renderer,
    run: F,
) -> Result<PipelineOutcome>
where
    F: Future<Output = ChatResult<PipelineOutcome>>,
{
    let mut revisions: watch::Receiver<u64> = orchestrator.subscribe();
    tokio::pin!(run);

    let outcome = loop {
        tokio::select! {
            outcome = &mut run => break outcome?,
            changed = revisions.changed() => {
                if changed.is_ok() {
                    renderer.render(&orchestrator.messages());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                if orchestrator.stop_generation() {
                    eprintln!("⏹  Stopping...");
                }
            }
        }
    };

    renderer.render(&orchestrator.messages());
    Ok(outcome)
}
