//! Models command - list a provider's models.

use anyhow::Result;
use clap::Args;

use tandem_chat::{resolve_api_key, HttpCompletionClient, Provider, Stage};

use super::{CliError, GlobalArgs};

#[derive(Args)]
pub struct ModelsArgs {
    /// Provider to query (defaults to the thinking provider)
    #[arg(short, long)]
    provider: Option<Provider>,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

pub async fn execute(args: ModelsArgs, global: &GlobalArgs) -> Result<()> {
    let settings = global.settings()?;
    let provider = args.provider.unwrap_or(settings.thinking_provider);

    // Stage keys only apply to the provider that stage is configured for
    let lookup = |name: &str| std::env::var(name).ok();
    let api_key = if provider == settings.thinking_provider {
        resolve_api_key(Stage::Thinking, provider, lookup)
    } else if provider == settings.coding_provider {
        resolve_api_key(Stage::Coding, provider, lookup)
    } else {
        lookup(provider.key_env()).unwrap_or_default()
    };

    let client = HttpCompletionClient::from_settings(&settings)?;
    let mut models = client
        .list_models(provider, &api_key)
        .await
        .map_err(|failure| CliError::GenerationFailed(failure.to_string()))?;
    models.sort_by(|a, b| a.id.cmp(&b.id));

    if args.json {
        println!("{}", serde_json::to_string_pretty(&models)?);
        return Ok(());
    }

    println!("📋 {} models from {}", models.len(), provider);
    for model in &models {
        match model.context_length {
            Some(length) => println!("  {:<48} {:>9} ctx  {}", model.id, length, model.name),
            None => println!("  {:<48} {:>13}  {}", model.id, "", model.name),
        }
    }

    Ok(())
}
