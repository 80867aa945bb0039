//! HTTP client for the Anthropic Messages API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::CompletionSettings;
use crate::error::{CompletionError, ServiceErrorKind};
use crate::llm::extract::{excerpt, extract_text};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// A text-completion backend.
///
/// One attempt per call. Callers decide whether to fall back; nothing here retries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Send `prompt` with `system` instructions and return the extracted text.
    async fn complete(&self, prompt: &str, system: &str) -> Result<String, CompletionError>;
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(rename = "type")]
    kind: Option<String>,
    message: Option<String>,
}

/// Client for the Messages endpoint configured by [`CompletionSettings`].
pub struct AnthropicClient {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    /// Build a client; fails with `MissingApiKey` when no key is configured.
    pub fn new(settings: &CompletionSettings) -> Result<Self, CompletionError> {
        let api_key = settings
            .api_key
            .clone()
            .ok_or(CompletionError::MissingApiKey)?;

        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| CompletionError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url: settings.api_url.clone(),
            api_key,
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl CompletionService for AnthropicClient {
    async fn complete(&self, prompt: &str, system: &str) -> Result<String, CompletionError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        info!(
            url = %self.api_url,
            model = %self.model,
            max_tokens = self.max_tokens,
            prompt_len = prompt.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| CompletionError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CompletionError::Transport(format!("failed to read response body: {e}")))?;

        debug!(%status, body_len = body.len(), "Received completion response");

        if let Some(err) = service_error(&body) {
            return Err(err);
        }

        if !status.is_success() {
            return Err(CompletionError::Transport(format!(
                "HTTP {status}: {}",
                excerpt(&body, 200)
            )));
        }

        if serde_json::from_str::<Value>(&body).is_err() && !body.contains("\"text\"") {
            return Err(CompletionError::Transport(format!(
                "malformed response body: {}",
                excerpt(&body, 200)
            )));
        }

        let text = extract_text(&body)?;
        debug!(response_len = text.len(), "Extracted completion text");
        Ok(text)
    }
}

/// Classify an error envelope, either `{"type":"error","error":{...}}` or a flat `{type, message}`.
fn service_error(body: &str) -> Option<CompletionError> {
    let value: Value = serde_json::from_str(body).ok()?;

    let is_flat_error = value
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|t| t.ends_with("_error"));

    let envelope = if let Some(inner) = value.get("error").filter(|e| e.is_object()) {
        inner.clone()
    } else if is_flat_error {
        value
    } else {
        return None;
    };

    let parsed: ErrorBody = serde_json::from_value(envelope).ok()?;
    let kind = ServiceErrorKind::from_type(parsed.kind.as_deref().unwrap_or("unknown_error"));
    let message = parsed.message.unwrap_or_else(|| "no message".to_string());
    Some(CompletionError::Service { kind, message })
}
