//! tandem CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments
//! - 3: Configuration error
//! - 4: Generation failed

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::{Cli, CliError, Commands};
use tandem_chat::ChatError;

/// Script-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const CONFIG_ERROR: u8 = 3;
    pub const GENERATION_FAILED: u8 = 4;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.global.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("tandem_chat={level},tandem_cli={level},warn"))
    });

    // Logs go to stderr so transcripts on stdout stay clean
    let registry = tracing_subscriber::registry().with(filter);
    let log_result = if cli.global.json_logs {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };

    if log_result.is_err() {
        // Logging already initialized, continue
    }

    let result = match cli.command {
        Commands::Ask(args) => commands::ask::execute(args, &cli.global).await,
        Commands::Chat(args) => commands::chat::execute(args, &cli.global).await,
        Commands::Models(args) => commands::models::execute(args, &cli.global).await,
        Commands::History(args) => commands::history::execute(args, &cli.global).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    if let Some(cli_error) = e.downcast_ref::<CliError>() {
        return match cli_error {
            CliError::GenerationFailed(_) => ExitCodes::GENERATION_FAILED,
            CliError::InvalidArgument(_) => ExitCodes::INVALID_ARGS,
        };
    }

    match e.downcast_ref::<ChatError>() {
        Some(ChatError::Config(_)) => ExitCodes::CONFIG_ERROR,
        Some(ChatError::ChatNotFound(_)) => ExitCodes::INVALID_ARGS,
        _ => ExitCodes::GENERAL_ERROR,
    }
}
