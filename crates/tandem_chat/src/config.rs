//! Provider and pipeline configuration.
//!
//! Settings live in the workspace under `.tandem/settings.json`. API keys
//! are never stored there; they are resolved from the environment, first
//! from a stage-specific variable and then from the provider's own.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ChatError, ChatResult};
use crate::prompts::Stage;

/// LLM provider
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    OpenAI,
    OpenRouter,
    Anthropic,
    DeepSeek,
    Mistral,
    Gemini,
    Qwen,
}

impl Provider {
    pub const ALL: [Provider; 7] = [
        Provider::OpenAI,
        Provider::OpenRouter,
        Provider::Anthropic,
        Provider::DeepSeek,
        Provider::Mistral,
        Provider::Gemini,
        Provider::Qwen,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::OpenRouter => "openrouter",
            Self::Anthropic => "anthropic",
            Self::DeepSeek => "deepseek",
            Self::Mistral => "mistral",
            Self::Gemini => "gemini",
            Self::Qwen => "qwen",
        }
    }

    /// API base URL, without trailing slash
    pub fn base_url(&self) -> &'static str {
        match self {
            Self::OpenAI => "https://api.openai.com/v1",
            Self::OpenRouter => "https://openrouter.ai/api/v1",
            Self::Anthropic => "https://api.anthropic.com/v1",
            Self::DeepSeek => "https://api.deepseek.com/v1",
            Self::Mistral => "https://api.mistral.ai/v1",
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
            Self::Qwen => "https://dashscope-intl.aliyuncs.com/compatible-mode/v1",
        }
    }

    /// Conventional environment variable holding this provider's key
    pub fn key_env(&self) -> &'static str {
        match self {
            Self::OpenAI => "OPENAI_API_KEY",
            Self::OpenRouter => "OPENROUTER_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::DeepSeek => "DEEPSEEK_API_KEY",
            Self::Mistral => "MISTRAL_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
            Self::Qwen => "QWEN_API_KEY",
        }
    }

    /// Model used when none is configured
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAI => "gpt-5-mini",
            Self::OpenRouter => "openai/gpt-5-mini",
            Self::Anthropic => "claude-sonnet-4-5",
            Self::DeepSeek => "deepseek-chat",
            Self::Mistral => "mistral-large-latest",
            Self::Gemini => "gemini-2.5-flash",
            Self::Qwen => "qwen-plus",
        }
    }

    /// Whether the provider speaks the OpenAI chat completions protocol
    pub fn is_openai_compatible(&self) -> bool {
        !matches!(self, Self::Anthropic)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Provider {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.id() == wanted)
            .ok_or_else(|| {
                ChatError::Config(format!(
                    "Unsupported provider: {} (expected one of: {})",
                    s,
                    Self::ALL.map(|p| p.id()).join(", ")
                ))
            })
    }
}

/// Provider, model and credential for one stage
#[derive(Clone, PartialEq, Eq)]
pub struct StageConfig {
    pub provider: Provider,
    pub model: String,
    pub api_key: String,
}

impl StageConfig {
    pub fn new(provider: Provider, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            api_key: api_key.into(),
        }
    }
}

impl fmt::Debug for StageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .finish()
    }
}

/// Configuration for both stages, passed into each run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub thinking: StageConfig,
    pub coding: StageConfig,
}

impl PipelineConfig {
    pub fn new(thinking: StageConfig, coding: StageConfig) -> Self {
        Self { thinking, coding }
    }

    pub fn stage(&self, stage: Stage) -> &StageConfig {
        match stage {
            Stage::Thinking => &self.thinking,
            Stage::Coding => &self.coding,
        }
    }
}

/// Persisted workspace settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub thinking_provider: Provider,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_model: Option<String>,
    pub coding_provider: Provider,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coding_model: Option<String>,
    /// Per-request timeout applied by the HTTP client
    pub request_timeout_secs: u64,
    /// Referer sent to OpenRouter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            thinking_provider: Provider::default(),
            thinking_model: None,
            coding_provider: Provider::default(),
            coding_model: None,
            request_timeout_secs: 120,
            app_url: None,
        }
    }
}

impl Settings {
    /// Path of the settings file inside a workspace
    pub fn path(workspace_root: &Path) -> PathBuf {
        workspace_root.join(".tandem").join("settings.json")
    }

    /// Load settings; a missing file yields the defaults
    pub fn load(workspace_root: &Path) -> ChatResult<Self> {
        let path = Self::path(workspace_root);
        if !path.exists() {
            debug!(path = %path.display(), "No settings file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content)
            .map_err(|e| ChatError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Write settings to the workspace
    pub fn save(&self, workspace_root: &Path) -> ChatResult<()> {
        let path = Self::path(workspace_root);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Build a pipeline config with keys taken from the process environment
    pub fn pipeline(&self) -> PipelineConfig {
        self.pipeline_with(|name| std::env::var(name).ok())
    }

    /// Build a pipeline config resolving keys through `lookup`
    pub fn pipeline_with(&self, lookup: impl Fn(&str) -> Option<String>) -> PipelineConfig {
        let build = |stage: Stage, provider: Provider, model: &Option<String>| {
            let model = model
                .as_deref()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or(provider.default_model());
            StageConfig::new(provider, model, resolve_api_key(stage, provider, &lookup))
        };

        PipelineConfig::new(
            build(Stage::Thinking, self.thinking_provider, &self.thinking_model),
            build(Stage::Coding, self.coding_provider, &self.coding_model),
        )
    }
}

/// Stage-specific environment variable for the API key
pub fn stage_key_env(stage: Stage) -> &'static str {
    match stage {
        Stage::Thinking => "TANDEM_THINKING_API_KEY",
        Stage::Coding => "TANDEM_CODING_API_KEY",
    }
}

/// Resolve the key for a stage. An empty result means no key is configured.
pub fn resolve_api_key(
    stage: Stage,
    provider: Provider,
    lookup: impl Fn(&str) -> Option<String>,
) -> String {
    [stage_key_env(stage), provider.key_env()]
        .into_iter()
        .filter_map(|name| lookup(name))
        .map(|key| key.trim().to_string())
        .find(|key| !key.is_empty())
        .unwrap_or_default()
}

/// Mask a secret for logs and debug output
pub fn redact(secret: &str) -> String {
    if secret.is_empty() {
        "<unset>".to_string()
    } else {
        "[REDACTED]".to_string()
    }
}
