//! Fixed prompts and placeholder texts of the two-stage pipeline.

use serde::{Deserialize, Serialize};

/// System prompt for the thinking stage: analysis only, no code.
pub const THINKING_PROMPT: &str = "You are an expert software architect. \
Analyze the user's request and produce a clear plan: restate the problem, \
list requirements and constraints, identify edge cases, and outline the \
components and steps needed to solve it. \
Do NOT write any code. Your analysis will be handed to an implementation engineer.";

/// System prompt for the coding stage: implement the prior analysis.
pub const CODING_PROMPT: &str = "You are an expert software engineer. \
You receive an analysis and plan produced by an architect. \
Implement the solution it describes with complete, production-ready code. \
Follow the plan, handle the edge cases it identifies, and include brief \
explanations where they help the reader.";

pub const THINKING_PLACEHOLDER: &str = "Analyzing the request...";
pub const CODING_PLACEHOLDER: &str = "Implementing the solution...";
pub const REGENERATING_PLACEHOLDER: &str = "Regenerating response...";
pub const STOPPED_CONTENT: &str = "Generation stopped.";
pub const SUPERSEDED_CONTENT: &str = "Superseded by a regenerated response.";

/// One of the two pipeline stages
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Thinking,
    Coding,
}

impl Stage {
    pub fn system_prompt(&self) -> &'static str {
        match self {
            Self::Thinking => THINKING_PROMPT,
            Self::Coding => CODING_PROMPT,
        }
    }

    pub fn placeholder(&self) -> &'static str {
        match self {
            Self::Thinking => THINKING_PLACEHOLDER,
            Self::Coding => CODING_PLACEHOLDER,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Thinking => "Thinking",
            Self::Coding => "Coding",
        }
    }
}

/// Build the coding-stage prompt from the thinking output
pub fn bridging_prompt(analysis: &str) -> String {
    format!(
        "Based on this analysis:\n\n{}\n\nImplement the solution with production-ready code.",
        analysis
    )
}
