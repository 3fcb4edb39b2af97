//! Ask command - run one prompt through both stages.

use anyhow::Result;
use clap::Args;
use tracing::info;

use tandem_chat::{Orchestrator, PipelineOutcome};

use super::render::{run_interruptible, Renderer};
use super::{CliError, GlobalArgs, Runtime};

#[derive(Args)]
pub struct AskArgs {
    /// The request to send
    #[arg(required = true)]
    prompt: Vec<String>,

    /// Save the chat to the workspace history
    #[arg(short, long)]
    save: bool,
}

pub async fn execute(args: AskArgs, global: &GlobalArgs) -> Result<()> {
    let prompt = args.prompt.join(" ");
    if prompt.trim().is_empty() {
        return Err(CliError::InvalidArgument("prompt must not be empty".to_string()).into());
    }

    let runtime = Runtime::resolve(global)?;
    info!(
        thinking = %runtime.pipeline.thinking.model,
        coding = %runtime.pipeline.coding.model,
        "Running pipeline"
    );

    let orchestrator = Orchestrator::new(runtime.client);
    let mut renderer = Renderer::new();
    let outcome = run_interruptible(
        &orchestrator,
        &mut renderer,
        orchestrator.submit(&prompt, &runtime.pipeline),
    )
    .await?;

    if args.save {
        let path = global.archive()?.save(&orchestrator.conversation())?;
        println!("💾 Saved chat {} to {}", orchestrator.conversation_id(), path.display());
    }

    match outcome {
        PipelineOutcome::Completed { .. } => Ok(()),
        PipelineOutcome::Stopped { stage } => {
            println!("⏹  Stopped during the {} stage", stage.display_name().to_lowercase());
            Ok(())
        }
        PipelineOutcome::Failed { user_id, .. } => {
            let reason = orchestrator
                .message(&user_id)
                .and_then(|m| m.error)
                .unwrap_or_else(|| "unknown error".to_string());
            Err(CliError::GenerationFailed(reason).into())
        }
        PipelineOutcome::Ignored(reason) => {
            Err(CliError::InvalidArgument(format!("prompt was not accepted ({:?})", reason)).into())
        }
    }
}
