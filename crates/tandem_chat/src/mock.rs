//! Scripted completion client for testing.
//!
//! Returns queued replies in order and records every request, so tests can
//! drive the orchestrator without a provider. A reply can be held until
//! [`ScriptedClient::release`] is called, which leaves a stage in flight
//! long enough to stop it or to start a new chat.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{Notify, Semaphore};

use crate::error::CompletionFailure;
use crate::llm::{CompletionClient, CompletionRequest};

/// Predefined reply for one completion call.
#[derive(Debug, Clone)]
pub struct ScriptedReply {
    pub outcome: Result<String, CompletionFailure>,
    pub held: bool,
}

impl ScriptedReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            outcome: Ok(content.into()),
            held: false,
        }
    }

    pub fn failure(failure: CompletionFailure) -> Self {
        Self {
            outcome: Err(failure),
            held: false,
        }
    }

    /// Do not resolve until the client is released
    pub fn held(mut self) -> Self {
        self.held = true;
        self
    }
}

/// Completion client that replays a script.
#[derive(Clone)]
pub struct ScriptedClient {
    /// Replies still to be returned.
    replies: Arc<Mutex<VecDeque<ScriptedReply>>>,
    /// Captured requests for verification.
    requests: Arc<RwLock<Vec<CompletionRequest>>>,
    /// Permits for held replies.
    gate: Arc<Semaphore>,
    /// Signalled after each recorded request.
    called: Arc<Notify>,
}

impl Default for ScriptedClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(RwLock::new(Vec::new())),
            gate: Arc::new(Semaphore::new(0)),
            called: Arc::new(Notify::new()),
        }
    }

    /// Queue a reply
    pub fn with_reply(self, reply: ScriptedReply) -> Self {
        self.push_reply(reply);
        self
    }

    pub fn push_reply(&self, reply: ScriptedReply) {
        self.replies.lock().push_back(reply);
    }

    /// Let one held reply resolve
    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    /// Requests received so far, in call order
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.read().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.read().len()
    }

    /// Wait until at least `count` calls have been received
    pub async fn wait_for_calls(&self, count: usize) {
        loop {
            // Registered before the check so a call in between is not missed
            let notified = self.called.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.call_count() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionFailure> {
        self.requests.write().push(request.clone());
        self.called.notify_waiters();
        let reply = self.replies.lock().pop_front();

        let Some(reply) = reply else {
            return Err(CompletionFailure::unknown("No scripted reply"));
        };

        if reply.held {
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
        }

        reply.outcome
    }
}
