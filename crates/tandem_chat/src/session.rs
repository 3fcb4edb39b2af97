//! Generation sessions.
//!
//! A session lives for one two-stage run. It owns the cancellation token
//! that every stage checks before applying its result, and a number that
//! lets a finishing run tell whether it still owns the conversation.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Handle to a running two-stage pipeline
#[derive(Debug, Clone)]
pub struct GenerationSession {
    number: u64,
    token: CancellationToken,
    started_at: DateTime<Utc>,
}

impl GenerationSession {
    /// Open a session with a fresh cancellation token
    pub fn open() -> Self {
        Self {
            number: NEXT_SESSION.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
            started_at: Utc::now(),
        }
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Fire the cancellation signal
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the session is cancelled
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Whether `other` is the same run as this one
    pub fn is_same(&self, other: &GenerationSession) -> bool {
        self.number == other.number
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sessions_are_numbered() {
        let a = GenerationSession::open();
        let b = GenerationSession::open();
        assert!(b.number() > a.number());
        assert!(a.is_same(&a.clone()));
        assert!(!a.is_same(&b));
    }

    #[tokio::test]
    async fn test_cancel_is_shared_by_clones() {
        let session = GenerationSession::open();
        let handle = session.clone();
        assert!(!handle.is_cancelled());

        session.cancel();
        assert!(handle.is_cancelled());
        // Resolves immediately once fired
        handle.cancelled().await;
    }
}
