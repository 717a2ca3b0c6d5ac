//! AI code suggestions (OpenRouter-compatible chat completions).
//!
//! The suggestion service is strictly advisory: it proposes codes for a
//! pending selection and never touches the span index. Every failure mode
//! (missing key, network error, bad status, malformed JSON) surfaces as a
//! [`SuggestError`] that callers report as advisory text and treat as
//! "zero suggestions" - it must never block manual coding.

use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codebook::Codebook;

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";

/// Default suggestion model.
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

const SUGGESTION_TEMPERATURE: f32 = 0.5;
const SUGGESTION_MAX_TOKENS: u32 = 800;

/// One candidate code returned by the service, not yet matched against the
/// codebook.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CodeSuggestion {
    #[serde(rename = "codeName")]
    pub code_name: String,
    #[serde(default)]
    pub explanation: String,
    /// Confidence on a 1-10 scale; clamped on parse.
    #[serde(default)]
    pub confidence: u8,
}

#[derive(Debug, Error)]
pub enum SuggestError {
    #[error("OPENROUTER_API_KEY is not set")]
    MissingApiKey,
    #[error("invalid suggestion service base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("suggestion request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("suggestion service returned status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("suggestion response had no content")]
    EmptyResponse,
    #[error("could not parse suggestion response: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Suggestion service configuration.
#[derive(Debug, Clone)]
pub struct SuggestConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl SuggestConfig {
    /// Build a config from the environment.
    ///
    /// Environment variables:
    /// - `OPENROUTER_API_KEY` (required)
    /// - `OPENROUTER_BASE_URL` (optional)
    /// - `OPENROUTER_SITE_URL` (optional, sent as `HTTP-Referer`)
    /// - `OPENROUTER_APP_NAME` (optional, sent as `X-Title`)
    pub fn from_env(model: Option<String>) -> Result<Self, SuggestError> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or(SuggestError::MissingApiKey)?;
        Ok(Self {
            api_key,
            base_url: resolve_base_url()?,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }
}

fn resolve_base_url() -> Result<String, SuggestError> {
    if let Ok(env_url) = std::env::var("OPENROUTER_BASE_URL") {
        let trimmed = env_url.trim();
        if !trimmed.is_empty() {
            url::Url::parse(trimmed)
                .map_err(|_| SuggestError::InvalidBaseUrl(trimmed.to_string()))?;
            return Ok(trimmed.trim_end_matches('/').to_string());
        }
    }
    Ok(DEFAULT_BASE_URL.to_string())
}

/// Client for the suggestion endpoint.
pub struct SuggestionClient {
    config: SuggestConfig,
    http: reqwest::Client,
}

impl SuggestionClient {
    pub fn new(config: SuggestConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Ask the service for code suggestions for a selection.
    ///
    /// An empty selection or empty codebook short-circuits to zero
    /// suggestions without a request.
    pub async fn suggest(
        &self,
        codebook: &Codebook,
        selected_text: &str,
        context: &str,
    ) -> Result<Vec<CodeSuggestion>, SuggestError> {
        if selected_text.trim().is_empty() || codebook.is_empty() {
            return Ok(Vec::new());
        }

        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![ChatCompletionMessage {
                role: "user",
                content: build_prompt(codebook, selected_text, context),
            }],
            temperature: SUGGESTION_TEMPERATURE,
            max_tokens: SUGGESTION_MAX_TOKENS,
        };

        let url = format!("{}{}", self.config.base_url, CHAT_COMPLETIONS_PATH);
        tracing::debug!(model = %self.config.model, "requesting code suggestions");

        let response = self
            .http
            .post(&url)
            .headers(build_headers(&self.config.api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SuggestError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let value: serde_json::Value = response.json().await?;
        let content = value
            .pointer("/choices/0/message/content")
            .and_then(serde_json::Value::as_str)
            .ok_or(SuggestError::EmptyResponse)?;

        parse_suggestions(content)
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatCompletionMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatCompletionMessage {
    role: &'static str,
    content: String,
}

fn build_headers(api_key: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "Authorization",
        HeaderValue::from_str(&format!("Bearer {}", api_key))
            .unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    headers.insert("content-type", HeaderValue::from_static("application/json"));

    if let Ok(site_url) = std::env::var("OPENROUTER_SITE_URL")
        && !site_url.trim().is_empty()
    {
        let _ = headers.insert(
            "HTTP-Referer",
            HeaderValue::from_str(site_url.trim()).unwrap_or_else(|_| HeaderValue::from_static("")),
        );
    }
    if let Ok(app_name) = std::env::var("OPENROUTER_APP_NAME")
        && !app_name.trim().is_empty()
    {
        let _ = headers.insert(
            "X-Title",
            HeaderValue::from_str(app_name.trim()).unwrap_or_else(|_| HeaderValue::from_static("")),
        );
    }

    headers
}

/// Build the coding-assistant prompt for a selection.
pub fn build_prompt(codebook: &Codebook, selected_text: &str, context: &str) -> String {
    let context = if context.trim().is_empty() {
        "No additional context provided"
    } else {
        context
    };
    format!(
        "You are a qualitative research coding assistant. Analyze the selected text and suggest relevant codes from the codebook.\n\
        \n\
        CODEBOOK:\n\
        {codebook}\n\
        \n\
        SELECTED TEXT: \"{selected_text}\"\n\
        \n\
        CONTEXT: {context}\n\
        \n\
        TASK: Find the most relevant codes from the codebook that apply to the selected text. Even if the text is short or unclear, try to identify potential connections.\n\
        \n\
        IMPORTANT INSTRUCTIONS:\n\
        1. Be generous in your suggestions - if there's any possible connection, suggest it\n\
        2. For short or unclear text, consider what the text might be referring to\n\
        3. Provide 1-3 suggestions maximum\n\
        4. Always include confidence scores (1-10)\n\
        5. If no clear connection exists, suggest the most general applicable code\n\
        \n\
        RESPONSE FORMAT (JSON only):\n\
        {{\n\
          \"suggestions\": [\n\
            {{\n\
              \"codeName\": \"exact code name from codebook\",\n\
              \"explanation\": \"why this code applies\",\n\
              \"confidence\": 8\n\
            }}\n\
          ]\n\
        }}\n\
        \n\
        Always respond with valid JSON. Include at least one suggestion unless absolutely no connection exists.",
        codebook = codebook.description(),
    )
}

/// Parse the model's reply into suggestions.
///
/// Models often wrap the JSON body in markdown code fences; those are
/// stripped before parsing. Confidence values are clamped to the 1-10
/// scale the prompt asks for.
pub fn parse_suggestions(content: &str) -> Result<Vec<CodeSuggestion>, SuggestError> {
    #[derive(Deserialize)]
    struct SuggestionPayload {
        #[serde(default)]
        suggestions: Vec<CodeSuggestion>,
    }

    let body = strip_code_fences(content.trim());
    let payload: SuggestionPayload = serde_json::from_str(body)?;
    Ok(payload
        .suggestions
        .into_iter()
        .map(|mut suggestion| {
            suggestion.confidence = suggestion.confidence.clamp(1, 10);
            suggestion
        })
        .collect())
}

fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .trim_start()
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}
