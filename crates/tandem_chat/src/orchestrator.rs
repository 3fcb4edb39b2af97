//! Two-stage orchestrator.
//!
//! Drives one conversation through thinking → coding runs:
//!
//! ```text
//!  submit ──▶ user msg ──▶ thinking placeholder ──▶ complete(analysis)
//!                                 │                        │
//!                           stop / fail              bridging prompt
//!                                 ▼                        ▼
//!                              (end)            coding placeholder ──▶ complete(code)
//! ```
//!
//! Only one run is active per conversation. The state lock is never held
//! across an await: each stage appends its placeholder, releases the lock,
//! waits for the client (or the session's cancellation), then re-takes the
//! lock and checks the session again before touching the store. A run whose
//! session was stopped or superseded never applies its result.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::classify::describe_failure;
use crate::config::PipelineConfig;
use crate::error::{ChatResult, CompletionFailure};
use crate::llm::{CompletionClient, CompletionRequest};
use crate::prompts::{
    bridging_prompt, Stage, REGENERATING_PLACEHOLDER, STOPPED_CONTENT, SUPERSEDED_CONTENT,
};
use crate::session::GenerationSession;
use crate::store::ConversationStore;
use crate::types::{Conversation, ConversationId, Message, MessageId, MessageStatus};

/// Why a request was not acted on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// Prompt was empty or whitespace
    EmptyPrompt,
    /// A run is already active
    Busy,
    /// No message with the given id
    UnknownMessage,
    /// Regeneration targets assistant messages only
    NotAssistant,
    /// No user message precedes the target
    NoPrecedingUser,
}

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// Nothing was changed
    Ignored(IgnoreReason),
    /// Both stages completed
    Completed {
        user_id: MessageId,
        thinking_id: MessageId,
        coding_id: MessageId,
    },
    /// A stage failed; the error is on the user message
    Failed {
        user_id: MessageId,
        stage: Stage,
        failure: CompletionFailure,
    },
    /// The user stopped the run during `stage`
    Stopped { stage: Stage },
}

impl PipelineOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

enum StageOutcome {
    Completed { id: MessageId, content: String },
    Failed(CompletionFailure),
    Stopped,
}

enum Admission {
    Opened {
        session: GenerationSession,
        user_id: MessageId,
    },
    Ignored(IgnoreReason),
}

#[derive(Debug, Default)]
struct ChatState {
    store: ConversationStore,
    session: Option<GenerationSession>,
    input: String,
}

impl ChatState {
    // Precondition check and session opening, in one critical section
    fn admit(&mut self, prompt: &str) -> ChatResult<Admission> {
        if prompt.trim().is_empty() {
            debug!("Ignoring empty prompt");
            return Ok(Admission::Ignored(IgnoreReason::EmptyPrompt));
        }
        if self.session.is_some() {
            debug!("Ignoring prompt while a generation is active");
            return Ok(Admission::Ignored(IgnoreReason::Busy));
        }

        let user_id = self.store.append(Message::user(prompt))?;
        let session = GenerationSession::open();
        info!(session = session.number(), conversation = %self.store.id(), "Generation session opened");
        self.session = Some(session.clone());

        Ok(Admission::Opened { session, user_id })
    }

    fn owns(&self, session: &GenerationSession) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_same(session))
    }

    fn mark_stopped(&mut self, id: &str) -> ChatResult<()> {
        match self.store.get(id) {
            Some(message) if !message.status.is_terminal() => self.store.stop(id, STOPPED_CONTENT),
            _ => Ok(()),
        }
    }
}

/// Closes a generation session when its run ends, including when the
/// future driving the run is dropped before it finishes.
struct SessionGuard {
    state: Arc<Mutex<ChatState>>,
    revision: Arc<watch::Sender<u64>>,
    session: GenerationSession,
    /// Regeneration target to mark as superseded once the run settles
    superseded: Option<(ConversationId, MessageId)>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        // Ends an abandoned stage; harmless after a settled run
        self.session.cancel();
        {
            let mut state = self.state.lock();
            if state.owns(&self.session) {
                state.session = None;
                state.input.clear();
                if let Some(id) = state.store.generating().map(|m| m.id.clone()) {
                    if let Err(e) = state.store.stop(&id, STOPPED_CONTENT) {
                        warn!(error = %e, "Failed to mark abandoned message as stopped");
                    }
                }
                debug!(session = self.session.number(), "Generation session closed");
            } else if state.session.is_none() {
                state.input.clear();
            }

            if let Some((conversation_id, target)) = &self.superseded {
                let pending = state.store.id() == conversation_id.as_str()
                    && state.store.get(target).map(|m| m.status) == Some(MessageStatus::Pending);
                if pending {
                    if let Err(e) = state.store.stop(target, SUPERSEDED_CONTENT) {
                        warn!(error = %e, "Failed to mark regenerated message as superseded");
                    }
                }
            }
        }
        self.revision.send_modify(|revision| *revision += 1);
    }
}

/// Point-in-time view for a presentation layer
#[derive(Debug, Clone)]
pub struct ChatSnapshot {
    pub conversation: Conversation,
    pub is_generating: bool,
    pub input: String,
}

/// Orchestrates two-stage generations over a single conversation.
///
/// Clones share the same conversation, so one clone can stop a run that
/// another clone is awaiting.
#[derive(Clone)]
pub struct Orchestrator {
    client: Arc<dyn CompletionClient>,
    state: Arc<Mutex<ChatState>>,
    revision: Arc<watch::Sender<u64>>,
}

impl Orchestrator {
    pub fn new(client: impl CompletionClient + 'static) -> Self {
        Self::with_client(Arc::new(client))
    }

    pub fn with_client(client: Arc<dyn CompletionClient>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            client,
            state: Arc::new(Mutex::new(ChatState::default())),
            revision: Arc::new(revision),
        }
    }

    /// Receiver that changes whenever the conversation or generation flag changes
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state.lock().store.messages().to_vec()
    }

    pub fn message(&self, id: &str) -> Option<Message> {
        self.state.lock().store.get(id).cloned()
    }

    pub fn is_generating(&self) -> bool {
        self.state.lock().session.is_some()
    }

    pub fn conversation_id(&self) -> ConversationId {
        self.state.lock().store.id().to_string()
    }

    pub fn conversation(&self) -> Conversation {
        self.state.lock().store.snapshot()
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        let state = self.state.lock();
        ChatSnapshot {
            conversation: state.store.snapshot(),
            is_generating: state.session.is_some(),
            input: state.input.clone(),
        }
    }

    /// Pending input buffer
    pub fn input(&self) -> String {
        self.state.lock().input.clone()
    }

    pub fn set_input(&self, input: impl Into<String>) {
        self.state.lock().input = input.into();
        self.changed();
    }

    /// Run the two-stage pipeline for `prompt`.
    ///
    /// Empty prompts and prompts submitted while a run is active are
    /// ignored without touching the conversation. Stage failures and user
    /// stops are reported in the outcome; `Err` means a store invariant was
    /// violated.
    pub async fn submit(&self, prompt: &str, config: &PipelineConfig) -> ChatResult<PipelineOutcome> {
        let admission = self.state.lock().admit(prompt)?;
        match admission {
            Admission::Ignored(reason) => Ok(PipelineOutcome::Ignored(reason)),
            Admission::Opened { session, user_id } => {
                let guard = self.guard(session, None);
                self.changed();
                self.drive(guard, user_id, prompt, config).await
            }
        }
    }

    /// Stop the active run.
    ///
    /// Fires the session's cancellation signal and flips the generating
    /// message to `stopped` right away, without waiting for the in-flight
    /// call. Returns false when nothing was running.
    pub fn stop_generation(&self) -> bool {
        let stopped = {
            let mut state = self.state.lock();
            let Some(session) = state.session.take() else {
                return false;
            };
            session.cancel();

            if let Some(id) = state.store.generating().map(|m| m.id.clone()) {
                if let Err(e) = state.store.stop(&id, STOPPED_CONTENT) {
                    warn!(error = %e, "Failed to mark message as stopped");
                }
            }
            session.number()
        };

        info!(session = stopped, "Generation stopped by user");
        self.changed();
        true
    }

    /// Regenerate the response to the user turn preceding `message_id`.
    ///
    /// Starts a brand-new two-stage run from that user message's content.
    /// The target is overwritten with a pending placeholder while the run
    /// is active and marked as superseded once it settles.
    pub async fn regenerate_response(
        &self,
        message_id: &str,
        config: &PipelineConfig,
    ) -> ChatResult<PipelineOutcome> {
        let (admission, prompt, conversation_id) = {
            let mut state = self.state.lock();
            if state.session.is_some() {
                return Ok(PipelineOutcome::Ignored(IgnoreReason::Busy));
            }
            let Some(target) = state.store.get(message_id) else {
                return Ok(PipelineOutcome::Ignored(IgnoreReason::UnknownMessage));
            };
            if !target.is_assistant() {
                return Ok(PipelineOutcome::Ignored(IgnoreReason::NotAssistant));
            }
            let Some(prompt) = state.store.preceding_user(message_id).map(|m| m.content.clone()) else {
                return Ok(PipelineOutcome::Ignored(IgnoreReason::NoPrecedingUser));
            };
            // Checked before the target is touched so an ignored request changes nothing
            if prompt.trim().is_empty() {
                return Ok(PipelineOutcome::Ignored(IgnoreReason::EmptyPrompt));
            }

            state.store.restart(message_id, REGENERATING_PLACEHOLDER)?;
            let admission = state.admit(&prompt)?;
            (admission, prompt, state.store.id().to_string())
        };
        self.changed();

        info!(target = message_id, "Regenerating response");
        match admission {
            Admission::Ignored(reason) => Ok(PipelineOutcome::Ignored(reason)),
            Admission::Opened { session, user_id } => {
                let guard = self.guard(session, Some((conversation_id, message_id.to_string())));
                self.drive(guard, user_id, &prompt, config).await
            }
        }
    }

    /// Start a fresh conversation, cancelling any active run first
    pub fn start_new_chat(&self) -> ConversationId {
        let id = {
            let mut state = self.state.lock();
            if let Some(session) = state.session.take() {
                session.cancel();
                info!(session = session.number(), "Cancelled active generation for new chat");
            }
            state.store.reset();
            state.input.clear();
            state.store.id().to_string()
        };

        info!(conversation = %id, "Started new chat");
        self.changed();
        id
    }

    /// Replace the conversation with a saved one, cancelling any active run
    pub fn open_conversation(&self, conversation: Conversation) -> ChatResult<()> {
        let store = ConversationStore::restore(conversation)?;
        {
            let mut state = self.state.lock();
            if let Some(session) = state.session.take() {
                session.cancel();
            }
            info!(conversation = %store.id(), messages = store.len(), "Opened conversation");
            state.store = store;
            state.input.clear();
        }
        self.changed();
        Ok(())
    }

    fn guard(
        &self,
        session: GenerationSession,
        superseded: Option<(ConversationId, MessageId)>,
    ) -> SessionGuard {
        SessionGuard {
            state: Arc::clone(&self.state),
            revision: Arc::clone(&self.revision),
            session,
            superseded,
        }
    }

    // Run both stages; the guard closes the session whatever happened
    async fn drive(
        &self,
        guard: SessionGuard,
        user_id: MessageId,
        prompt: &str,
        config: &PipelineConfig,
    ) -> ChatResult<PipelineOutcome> {
        let number = guard.session.number();
        let outcome = self.run_pipeline(&guard.session, &user_id, prompt, config).await;
        drop(guard);

        match &outcome {
            Ok(PipelineOutcome::Completed { .. }) => info!(session = number, "Generation complete"),
            Ok(PipelineOutcome::Stopped { stage }) => {
                info!(session = number, ?stage, "Generation ended by stop")
            }
            Ok(PipelineOutcome::Failed { stage, failure, .. }) => {
                warn!(session = number, ?stage, kind = %failure.kind, "Generation failed")
            }
            Ok(PipelineOutcome::Ignored(_)) => {}
            Err(e) => warn!(session = number, error = %e, "Generation aborted"),
        }
        outcome
    }

    async fn run_pipeline(
        &self,
        session: &GenerationSession,
        user_id: &str,
        prompt: &str,
        config: &PipelineConfig,
    ) -> ChatResult<PipelineOutcome> {
        let (thinking_id, analysis) = match self
            .run_stage(session, user_id, Stage::Thinking, prompt.to_string(), config)
            .await?
        {
            StageOutcome::Completed { id, content } => (id, content),
            StageOutcome::Stopped => return Ok(PipelineOutcome::Stopped { stage: Stage::Thinking }),
            StageOutcome::Failed(failure) => {
                return Ok(PipelineOutcome::Failed {
                    user_id: user_id.to_string(),
                    stage: Stage::Thinking,
                    failure,
                })
            }
        };

        let coding_id = match self
            .run_stage(session, user_id, Stage::Coding, bridging_prompt(&analysis), config)
            .await?
        {
            StageOutcome::Completed { id, .. } => id,
            StageOutcome::Stopped => return Ok(PipelineOutcome::Stopped { stage: Stage::Coding }),
            StageOutcome::Failed(failure) => {
                return Ok(PipelineOutcome::Failed {
                    user_id: user_id.to_string(),
                    stage: Stage::Coding,
                    failure,
                })
            }
        };

        Ok(PipelineOutcome::Completed {
            user_id: user_id.to_string(),
            thinking_id,
            coding_id,
        })
    }

    async fn run_stage(
        &self,
        session: &GenerationSession,
        user_id: &str,
        stage: Stage,
        prompt: String,
        config: &PipelineConfig,
    ) -> ChatResult<StageOutcome> {
        let stage_config = config.stage(stage);

        let message_id = {
            let mut state = self.state.lock();
            if session.is_cancelled() {
                return Ok(StageOutcome::Stopped);
            }
            state
                .store
                .append(Message::generating(&stage_config.model, stage.placeholder()))?
        };
        self.changed();
        info!(
            session = session.number(),
            ?stage,
            provider = %stage_config.provider,
            model = %stage_config.model,
            "Stage started"
        );

        let request = CompletionRequest::for_stage(stage, prompt, stage_config);
        let result = tokio::select! {
            biased;
            _ = session.cancelled() => None,
            result = self.client.complete(&request) => Some(result),
        };

        let outcome = {
            let mut state = self.state.lock();
            match result {
                Some(result) if !session.is_cancelled() => match result {
                    Ok(content) => {
                        state.store.complete(&message_id, content.clone())?;
                        StageOutcome::Completed {
                            id: message_id,
                            content,
                        }
                    }
                    Err(failure) => {
                        // The placeholder never produced content; the error belongs to the user turn
                        state.store.remove(&message_id)?;
                        state.store.fail(user_id, describe_failure(stage, &failure))?;
                        StageOutcome::Failed(failure)
                    }
                },
                late => {
                    if late.is_some() {
                        debug!(session = session.number(), ?stage, "Discarding result of stopped stage");
                    }
                    state.mark_stopped(&message_id)?;
                    StageOutcome::Stopped
                }
            }
        };
        self.changed();

        Ok(outcome)
    }

    fn changed(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}
