//! CLI command definitions.
//!
//! Each subcommand resolves the workspace settings, applies the stage
//! overrides given on the command line and then drives the chat library.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::debug;

use tandem_chat::{ChatArchive, HttpCompletionClient, PipelineConfig, Provider, Settings};

pub mod ask;
pub mod chat;
pub mod history;
pub mod models;
pub mod render;

/// Errors that map to dedicated exit codes
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// tandem - two-stage chat: a thinking model plans, a coding model implements
#[derive(Parser)]
#[command(name = "tandem")]
#[command(version, about = "Two-stage chat: a thinking model plans, a coding model implements")]
#[command(long_about = r#"
tandem sends every prompt through two models in sequence. The thinking
model analyzes the request without writing code; the coding model then
implements the solution from that analysis.

COMMANDS:
  ask      → Run one prompt through both stages
  chat     → Interactive session (/new, /regen, /export, /save, /quit)
  models   → List the models a provider offers for your key
  history  → List, show, delete or export saved chats

API KEYS:
  TANDEM_THINKING_API_KEY / TANDEM_CODING_API_KEY, falling back to the
  provider's own variable (OPENAI_API_KEY, ANTHROPIC_API_KEY, ...)

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Configuration error
  4 - Generation failed
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Workspace holding `.tandem/` (defaults to current directory)
    #[arg(short, long, global = true, env = "TANDEM_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Provider for the thinking stage
    #[arg(long, global = true, env = "TANDEM_THINKING_PROVIDER")]
    pub thinking_provider: Option<Provider>,

    /// Model for the thinking stage
    #[arg(long, global = true, env = "TANDEM_THINKING_MODEL")]
    pub thinking_model: Option<String>,

    /// Provider for the coding stage
    #[arg(long, global = true, env = "TANDEM_CODING_PROVIDER")]
    pub coding_provider: Option<Provider>,

    /// Model for the coding stage
    #[arg(long, global = true, env = "TANDEM_CODING_MODEL")]
    pub coding_model: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one prompt through both stages
    Ask(ask::AskArgs),

    /// Start an interactive chat
    Chat(chat::ChatArgs),

    /// List models available from a provider
    Models(models::ModelsArgs),

    /// Manage saved chats
    History(history::HistoryArgs),
}

impl GlobalArgs {
    pub fn workspace_root(&self) -> Result<PathBuf> {
        match &self.workspace {
            Some(path) => Ok(path.clone()),
            None => std::env::current_dir().context("Failed to determine current directory"),
        }
    }

    /// Workspace settings with command-line overrides applied
    pub fn settings(&self) -> Result<Settings> {
        let root = self.workspace_root()?;
        let mut settings = Settings::load(&root)?;
        self.apply(&mut settings);
        debug!(?settings, "Resolved settings");
        Ok(settings)
    }

    pub fn archive(&self) -> Result<ChatArchive> {
        Ok(ChatArchive::new(self.workspace_root()?))
    }

    fn apply(&self, settings: &mut Settings) {
        // A new provider without a model falls back to that provider's default
        if let Some(provider) = self.thinking_provider {
            if provider != settings.thinking_provider {
                settings.thinking_model = None;
            }
            settings.thinking_provider = provider;
        }
        if let Some(model) = &self.thinking_model {
            settings.thinking_model = Some(model.clone());
        }
        if let Some(provider) = self.coding_provider {
            if provider != settings.coding_provider {
                settings.coding_model = None;
            }
            settings.coding_provider = provider;
        }
        if let Some(model) = &self.coding_model {
            settings.coding_model = Some(model.clone());
        }
    }
}

/// Everything a generating command needs
pub struct Runtime {
    pub pipeline: PipelineConfig,
    pub client: HttpCompletionClient,
}

impl Runtime {
    pub fn resolve(global: &GlobalArgs) -> Result<Self> {
        let settings = global.settings()?;
        let pipeline = settings.pipeline();
        let client = HttpCompletionClient::from_settings(&settings)?;

        Ok(Self { pipeline, client })
    }
}
