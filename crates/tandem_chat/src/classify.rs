//! Maps completion failures to the text shown on the failed user turn.

use crate::error::{CompletionFailure, FailureKind};
use crate::prompts::Stage;

/// User-facing description of a stage failure
pub fn describe_failure(stage: Stage, failure: &CompletionFailure) -> String {
    let stage_name = stage.display_name();
    let detail = failure.message.trim();

    let summary = match failure.kind {
        FailureKind::Auth => format!(
            "{} model rejected the credentials. Check that the API key is set and valid",
            stage_name
        ),
        FailureKind::Network => format!(
            "Could not reach the {} provider. Check your connection and try again",
            stage_name.to_lowercase()
        ),
        FailureKind::RateLimit => format!(
            "{} provider is rate limiting requests. Wait a moment, then regenerate",
            stage_name
        ),
        FailureKind::InvalidModel => format!(
            "{} model is not available from the selected provider",
            stage_name
        ),
        FailureKind::ProviderError => format!("{} provider returned an error", stage_name),
        FailureKind::Unknown => {
            "An error occurred while processing your request".to_string()
        }
    };

    if detail.is_empty() {
        format!("{}.", summary)
    } else {
        format!("{}: {}", summary, detail)
    }
}
