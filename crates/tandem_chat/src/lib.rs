//! # tandem_chat - Two-stage chat orchestration
//!
//! Every prompt is answered by two models in sequence:
//! - a **thinking** model analyzes the request without writing code
//! - a **coding** model implements the solution from that analysis
//!
//! ## Key Features
//!
//! - **Conversation Store**: ordered messages with a strict per-message lifecycle
//! - **Cancellation**: one generation session at a time, stoppable mid-flight
//! - **Regeneration**: re-run both stages for an earlier user turn
//! - **Chat Archive**: saved conversations under `.tandem/chats/`
//! - **Export**: Markdown and plain-text transcripts
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │  Presentation   │────▶│  Orchestrator   │────▶│CompletionClient │
//! └─────────────────┘     └────────┬────────┘     └─────────────────┘
//!                                  │
//!                    ┌─────────────┴─────────────┐
//!                    ▼                           ▼
//!          ┌───────────────────┐       ┌───────────────────┐
//!          │ConversationStore  │       │GenerationSession  │
//!          └───────────────────┘       └───────────────────┘
//! ```

pub mod classify;
pub mod config;
pub mod error;
pub mod export;
pub mod llm;
pub mod mock;
pub mod orchestrator;
pub mod persistence;
pub mod prompts;
pub mod session;
pub mod store;
pub mod tokens;
pub mod types;

pub use classify::*;
pub use config::*;
pub use error::*;
pub use export::*;
pub use llm::*;
pub use mock::*;
pub use orchestrator::*;
pub use persistence::*;
pub use prompts::*;
pub use session::*;
pub use store::*;
pub use tokens::*;
pub use types::*;
