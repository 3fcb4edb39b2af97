//! History command - manage saved chats.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use tandem_chat::{export_conversation, ChatArchive, ExportFormat};

use super::GlobalArgs;

#[derive(Args)]
pub struct HistoryArgs {
    #[command(subcommand)]
    command: HistoryCommand,
}

#[derive(Subcommand)]
enum HistoryCommand {
    /// List saved chats, most recent first
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a saved chat
    Show {
        /// Chat id
        id: String,
    },

    /// Delete a saved chat
    Delete {
        /// Chat id
        id: String,
    },

    /// Export a saved chat as Markdown or plain text
    Export {
        /// Chat id
        id: String,

        /// Output format (md or txt)
        #[arg(short, long, default_value = "md")]
        format: ExportFormat,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

pub async fn execute(args: HistoryArgs, global: &GlobalArgs) -> Result<()> {
    let archive = global.archive()?;

    match args.command {
        HistoryCommand::List { json } => list(&archive, json),
        HistoryCommand::Show { id } => {
            let conversation = archive.load(&id)?;
            print!("{}", export_conversation(&conversation, ExportFormat::Markdown));
            Ok(())
        }
        HistoryCommand::Delete { id } => {
            archive.delete(&id)?;
            println!("🗑️  Deleted chat {}", id);
            Ok(())
        }
        HistoryCommand::Export { id, format, output } => {
            let conversation = archive.load(&id)?;
            let transcript = export_conversation(&conversation, format);
            match output {
                Some(path) => {
                    std::fs::write(&path, transcript)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("📄 Exported {} to {}", id, path.display());
                }
                None => print!("{}", transcript),
            }
            Ok(())
        }
    }
}

fn list(archive: &ChatArchive, json: bool) -> Result<()> {
    let chats = archive.list()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&chats)?);
        return Ok(());
    }

    if chats.is_empty() {
        println!("No saved chats in {}", archive.chats_dir().display());
        return Ok(());
    }

    for chat in &chats {
        println!(
            "{}  {}  {:>3} msgs  {}",
            chat.id,
            chat.updated_at.format("%Y-%m-%d %H:%M"),
            chat.message_count,
            chat.title
        );
    }

    Ok(())
}
