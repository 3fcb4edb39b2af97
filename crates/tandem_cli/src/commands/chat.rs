//! Chat command - interactive session.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use tandem_chat::{
    export_conversation, ChatArchive, ExportFormat, MessageStatus, Orchestrator, PipelineConfig,
    PipelineOutcome,
};

use super::render::{run_interruptible, Renderer};
use super::{GlobalArgs, Runtime};

#[derive(Args)]
pub struct ChatArgs {
    /// Continue a saved chat
    #[arg(short, long)]
    resume: Option<String>,

    /// Save the chat to the workspace history on exit
    #[arg(short, long)]
    save: bool,
}

/// One line of REPL input
#[derive(Debug, PartialEq)]
enum Input {
    Prompt(String),
    New,
    Regenerate,
    Export { format: ExportFormat, path: PathBuf },
    Save,
    Quit,
    Help,
    Invalid(String),
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if !line.starts_with('/') {
        return Input::Prompt(line.to_string());
    }

    let mut parts = line.split_whitespace();
    match parts.next().unwrap_or_default() {
        "/new" => Input::New,
        "/regen" => Input::Regenerate,
        "/save" => Input::Save,
        "/quit" | "/exit" => Input::Quit,
        "/help" => Input::Help,
        "/export" => {
            let (Some(format), Some(path)) = (parts.next(), parts.next()) else {
                return Input::Invalid("usage: /export <md|txt> <path>".to_string());
            };
            match format.parse::<ExportFormat>() {
                Ok(format) => Input::Export {
                    format,
                    path: PathBuf::from(path),
                },
                Err(e) => Input::Invalid(e.to_string()),
            }
        }
        other => Input::Invalid(format!("unknown command {} (try /help)", other)),
    }
}

const HELP: &str = "Commands:
  /new                      start a new chat
  /regen                    regenerate the last response
  /export <md|txt> <path>   write the transcript to a file
  /save                     save the chat to history
  /quit                     leave (Ctrl-C stops a running generation)";

pub async fn execute(args: ChatArgs, global: &GlobalArgs) -> Result<()> {
    let runtime = Runtime::resolve(global)?;
    let archive = global.archive()?;
    let orchestrator = Orchestrator::new(runtime.client);
    let mut renderer = Renderer::new();

    if let Some(id) = &args.resume {
        let conversation = archive.load(id)?;
        println!("📂 Resumed \"{}\" ({} messages)", conversation.title(), conversation.messages.len());
        renderer.mark_seen(&conversation.messages);
        orchestrator.open_conversation(conversation)?;
    }

    println!(
        "💬 thinking: {} ({}) · coding: {} ({})  ·  /help for commands",
        runtime.pipeline.thinking.model,
        runtime.pipeline.thinking.provider,
        runtime.pipeline.coding.model,
        runtime.pipeline.coding.provider
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read input")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };

        match parse_input(&line) {
            Input::Prompt(prompt) if prompt.is_empty() => {}
            Input::Prompt(prompt) => {
                orchestrator.set_input(prompt.clone());
                let run = orchestrator.submit(&prompt, &runtime.pipeline);
                report(run_interruptible(&orchestrator, &mut renderer, run).await?);
            }
            Input::Regenerate => regenerate(&orchestrator, &mut renderer, &runtime.pipeline).await?,
            Input::New => {
                let id = orchestrator.start_new_chat();
                renderer.reset();
                println!("🆕 New chat {}", id);
            }
            Input::Export { format, path } => {
                let transcript = export_conversation(&orchestrator.conversation(), format);
                std::fs::write(&path, transcript)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("📄 Exported to {}", path.display());
            }
            Input::Save => save(&archive, &orchestrator)?,
            Input::Help => println!("{}", HELP),
            Input::Invalid(reason) => eprintln!("⚠️  {}", reason),
            Input::Quit => break,
        }
    }

    if args.save {
        save(&archive, &orchestrator)?;
    }
    info!(conversation = %orchestrator.conversation_id(), "Chat ended");
    Ok(())
}

async fn regenerate(
    orchestrator: &Orchestrator,
    renderer: &mut Renderer,
    pipeline: &PipelineConfig,
) -> Result<()> {
    // Superseded responses are not offered again
    let target = orchestrator
        .messages()
        .into_iter()
        .rev()
        .find(|m| m.is_assistant() && m.status == MessageStatus::Complete);

    let Some(target) = target else {
        eprintln!("⚠️  Nothing to regenerate");
        return Ok(());
    };

    let run = orchestrator.regenerate_response(&target.id, pipeline);
    report(run_interruptible(orchestrator, renderer, run).await?);
    Ok(())
}

fn save(archive: &ChatArchive, orchestrator: &Orchestrator) -> Result<()> {
    let conversation = orchestrator.conversation();
    if conversation.messages.is_empty() {
        warn!("Nothing to save");
        return Ok(());
    }
    let path = archive.save(&conversation)?;
    println!("💾 Saved to {}", path.display());
    Ok(())
}

fn report(outcome: PipelineOutcome) {
    match outcome {
        PipelineOutcome::Stopped { stage } => {
            println!("⏹  Stopped during the {} stage", stage.display_name().to_lowercase())
        }
        PipelineOutcome::Ignored(reason) => eprintln!("⚠️  Ignored ({:?})", reason),
        PipelineOutcome::Completed { .. } | PipelineOutcome::Failed { .. } => {}
    }
}
