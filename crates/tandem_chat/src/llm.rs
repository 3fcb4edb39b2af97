//! Completion clients.
//!
//! The orchestrator only needs one capability: send a prompt with a system
//! prompt to a named model and get text back, or a classified failure.
//! [`HttpCompletionClient`] implements it over the providers' REST APIs.
//! OpenAI-compatible providers share one code path; Anthropic has its own.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{redact, Provider, Settings, StageConfig};
use crate::error::{ChatError, ChatResult, CompletionFailure};
use crate::prompts::Stage;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

/// One completion call
#[derive(Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub model: String,
    pub provider: Provider,
    pub system_prompt: String,
    pub credential: String,
}

impl CompletionRequest {
    /// Request for `stage` using that stage's system prompt and config
    pub fn for_stage(stage: Stage, prompt: impl Into<String>, config: &StageConfig) -> Self {
        Self {
            prompt: prompt.into(),
            model: config.model.clone(),
            provider: config.provider,
            system_prompt: stage.system_prompt().to_string(),
            credential: config.api_key.clone(),
        }
    }
}

impl fmt::Debug for CompletionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionRequest")
            .field("prompt", &self.prompt)
            .field("model", &self.model)
            .field("provider", &self.provider)
            .field("system_prompt", &self.system_prompt)
            .field("credential", &redact(&self.credential))
            .finish()
    }
}

/// Sends prompts to a model
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Complete `request`, returning the model's text
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionFailure>;
}

/// A model offered by a provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    #[serde(rename = "contextLength", skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u64>,
}

/// Completion client backed by the providers' HTTP APIs
pub struct HttpCompletionClient {
    client: reqwest::Client,
    app_url: Option<String>,
}

impl HttpCompletionClient {
    /// Create a client whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> ChatResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChatError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            app_url: None,
        })
    }

    /// Create a client from workspace settings
    pub fn from_settings(settings: &Settings) -> ChatResult<Self> {
        let mut client = Self::new(Duration::from_secs(settings.request_timeout_secs.max(1)))?;
        client.app_url = settings.app_url.clone();
        Ok(client)
    }

    /// Set the referer sent to OpenRouter
    pub fn with_app_url(mut self, app_url: impl Into<String>) -> Self {
        self.app_url = Some(app_url.into());
        self
    }

    /// Authentication and protocol headers for a provider
    pub fn headers(&self, provider: Provider, api_key: &str) -> Vec<(&'static str, String)> {
        match provider {
            Provider::Anthropic => vec![
                ("x-api-key", api_key.to_string()),
                ("anthropic-version", ANTHROPIC_VERSION.to_string()),
            ],
            Provider::OpenRouter => vec![
                ("Authorization", format!("Bearer {}", api_key)),
                (
                    "HTTP-Referer",
                    self.app_url
                        .clone()
                        .unwrap_or_else(|| "http://localhost:3000".to_string()),
                ),
            ],
            _ => vec![("Authorization", format!("Bearer {}", api_key))],
        }
    }

    /// List the models available to `api_key`. Also serves as key validation.
    pub async fn list_models(
        &self,
        provider: Provider,
        api_key: &str,
    ) -> Result<Vec<ModelInfo>, CompletionFailure> {
        if api_key.trim().is_empty() {
            return Err(CompletionFailure::auth(format!(
                "No API key configured for {}",
                provider
            )));
        }

        let url = format!("{}/models", provider.base_url());
        debug!(%provider, %url, "Fetching models");

        let mut builder = self.client.get(&url);
        for (name, value) in self.headers(provider, api_key) {
            builder = builder.header(name, value);
        }

        let response = builder.send().await.map_err(|e| classify_transport(&e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| classify_transport(&e))?;
        if !status.is_success() {
            return Err(classify_status(status.as_u16(), &body));
        }

        parse_models(&body)
    }

    // OpenAI-compatible chat completion
    async fn complete_openai(&self, request: &CompletionRequest) -> Result<String, CompletionFailure> {
        let url = format!("{}/chat/completions", request.provider.base_url());

        let body = OpenAIRequest {
            model: request.model.clone(),
            messages: vec![
                OpenAIMessage {
                    role: "system".to_string(),
                    content: request.system_prompt.clone(),
                },
                OpenAIMessage {
                    role: "user".to_string(),
                    content: request.prompt.clone(),
                },
            ],
        };

        let text = self.post(&url, request, &body).await?;
        let result: OpenAIResponse = serde_json::from_str(&text)
            .map_err(|e| CompletionFailure::unknown(format!("Failed to parse response: {}", e)))?;

        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                CompletionFailure::unknown(format!("No response from {}", request.provider))
            })
    }

    // Anthropic messages API
    async fn complete_anthropic(&self, request: &CompletionRequest) -> Result<String, CompletionFailure> {
        let url = format!("{}/messages", request.provider.base_url());

        let body = AnthropicRequest {
            model: request.model.clone(),
            max_tokens: MAX_TOKENS,
            system: Some(request.system_prompt.clone()).filter(|s| !s.is_empty()),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: request.prompt.clone(),
            }],
        };

        let text = self.post(&url, request, &body).await?;
        let result: AnthropicResponse = serde_json::from_str(&text)
            .map_err(|e| CompletionFailure::unknown(format!("Failed to parse response: {}", e)))?;

        let content: String = result
            .content
            .into_iter()
            .filter_map(|c| c.text)
            .collect::<Vec<_>>()
            .join("");

        if content.trim().is_empty() {
            return Err(CompletionFailure::unknown("No response from anthropic"));
        }
        Ok(content)
    }

    async fn post<B: Serialize>(
        &self,
        url: &str,
        request: &CompletionRequest,
        body: &B,
    ) -> Result<String, CompletionFailure> {
        debug!(provider = %request.provider, model = %request.model, %url, "Sending completion request");

        let mut builder = self.client.post(url).json(body);
        for (name, value) in self.headers(request.provider, &request.credential) {
            builder = builder.header(name, value);
        }

        let response = builder.send().await.map_err(|e| classify_transport(&e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| classify_transport(&e))?;

        if !status.is_success() {
            let failure = classify_status(status.as_u16(), &text);
            warn!(provider = %request.provider, status = status.as_u16(), kind = %failure.kind, "Completion request failed");
            return Err(failure);
        }

        Ok(text)
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionFailure> {
        if request.credential.trim().is_empty() {
            return Err(CompletionFailure::auth(format!(
                "No API key configured for {}",
                request.provider
            )));
        }

        if request.provider.is_openai_compatible() {
            self.complete_openai(request).await
        } else {
            self.complete_anthropic(request).await
        }
    }
}

/// Classify a non-success HTTP response
pub fn classify_status(status: u16, body: &str) -> CompletionFailure {
    let detail = provider_message(body).unwrap_or_else(|| {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            format!("HTTP {}", status)
        } else {
            format!("HTTP {}: {}", status, trimmed)
        }
    });

    match status {
        401 | 403 => CompletionFailure::auth(detail),
        429 => CompletionFailure::rate_limit(detail),
        404 => CompletionFailure::invalid_model(detail),
        400 if mentions_model(&detail) => CompletionFailure::invalid_model(detail),
        _ => CompletionFailure::provider(detail),
    }
}

fn classify_transport(err: &reqwest::Error) -> CompletionFailure {
    if err.is_timeout() {
        CompletionFailure::network(format!("Request timed out: {}", err))
    } else if err.is_connect() || err.is_request() {
        CompletionFailure::network(format!("Network error: {}", err))
    } else if err.is_decode() || err.is_body() {
        CompletionFailure::unknown(format!("Failed to read response: {}", err))
    } else {
        CompletionFailure::network(err.to_string())
    }
}

fn mentions_model(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("model") && (lower.contains("not found") || lower.contains("does not exist") || lower.contains("invalid"))
}

/// `error.message` from a provider error body, when present
fn provider_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    error
        .get("message")
        .and_then(|m| m.as_str())
        .or_else(|| error.as_str())
        .map(|m| m.to_string())
}

fn parse_models(body: &str) -> Result<Vec<ModelInfo>, CompletionFailure> {
    let response: ModelsResponse = serde_json::from_str(body)
        .map_err(|e| CompletionFailure::unknown(format!("Failed to parse model list: {}", e)))?;

    Ok(response
        .data
        .into_iter()
        .chain(response.models)
        .map(|m| {
            let id = m.id.trim_start_matches("models/").to_string();
            ModelInfo {
                name: m.display_name.or(m.name).unwrap_or_else(|| id.clone()),
                id,
                context_length: m.context_length,
            }
        })
        .collect())
}

// OpenAI API types
#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

// Anthropic API types
#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    text: Option<String>,
}

// Model listing, shared by every provider
#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<RawModel>,
    #[serde(default)]
    models: Vec<RawModel>,
}

#[derive(Debug, Deserialize)]
struct RawModel {
    id: String,
    name: Option<String>,
    display_name: Option<String>,
    context_length: Option<u64>,
}
