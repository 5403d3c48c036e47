//! Chat completion client for OpenAI-compatible endpoints
//!
//! Every agent talks to the model through [`ChatModel`], so agents can be
//! exercised against scripted replies. [`OpenAiChat`] is the HTTP
//! implementation; [`extract_json`] pulls the JSON payload out of a reply
//! that may be fenced or wrapped in prose.

use std::sync::LazyLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use refinement::GenerationError;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::config::LlmEndpoint;

/// Errors from chat completion calls
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API request failed: {0}")]
    RequestFailed(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Response parse error: {0}")]
    ParseError(String),

    #[error("Model returned an empty reply")]
    EmptyReply,
}

impl From<LlmError> for GenerationError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Timeout(d) => GenerationError::Timeout(d.as_secs()),
            // 5xx and rate limits are worth another attempt
            LlmError::Status { status, .. } if status >= 500 || status == 429 => {
                GenerationError::RequestFailed(err.to_string())
            }
            LlmError::Status { .. } => GenerationError::Unavailable(err.to_string()),
            LlmError::RequestFailed(msg) => GenerationError::RequestFailed(msg),
            LlmError::ParseError(_) | LlmError::EmptyReply => {
                GenerationError::ParseFailure(err.to_string())
            }
        }
    }
}

/// A system + user prompt pair
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
}

impl ChatRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Something that answers a chat request with text.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError>;

    /// Model name, for logs.
    fn model(&self) -> &str;
}

/// Complete a request and decode the JSON payload of the reply.
pub async fn complete_json(
    model: &dyn ChatModel,
    request: &ChatRequest,
) -> Result<Value, GenerationError> {
    let reply = model.complete(request).await?;
    extract_json(&reply).ok_or_else(|| {
        let preview: String = reply.chars().take(120).collect();
        GenerationError::ParseFailure(format!("no JSON in reply: {preview}"))
    })
}

/// `/chat/completions` over reqwest.
pub struct OpenAiChat {
    endpoint: LlmEndpoint,
    client: reqwest::Client,
}

impl OpenAiChat {
    pub fn new(endpoint: LlmEndpoint) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(endpoint.timeout)
            .build()
            .map_err(|e| LlmError::RequestFailed(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { endpoint, client })
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let start = Instant::now();
        let url = format!(
            "{}/chat/completions",
            self.endpoint.url.trim_end_matches('/')
        );

        let request_body = serde_json::json!({
            "model": self.endpoint.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user}
            ],
            "temperature": self.endpoint.temperature,
        });

        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&request_body);
        if let Some(key) = &self.endpoint.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout(self.endpoint.timeout)
            } else {
                LlmError::RequestFailed(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status, body });
        }

        let resp_json: Value = response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;

        let content = resp_json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .trim()
            .to_string();

        debug!(
            model = %self.endpoint.model,
            elapsed_ms = start.elapsed().as_millis() as u64,
            chars = content.len(),
            "Chat completion"
        );

        if content.is_empty() {
            return Err(LlmError::EmptyReply);
        }
        Ok(content)
    }

    fn model(&self) -> &str {
        &self.endpoint.model
    }
}

static FENCED_JSON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*\n?(.*?)```").expect("fenced JSON regex should compile")
});

/// Decode the JSON value in a model reply.
///
/// Tries, in order: the whole reply, each fenced code block, then the span
/// from the first `{`/`[` to the matching last `}`/`]`.
pub fn extract_json(reply: &str) -> Option<Value> {
    let trimmed = reply.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    for caps in FENCED_JSON_RE.captures_iter(trimmed) {
        if let Ok(value) = serde_json::from_str(caps[1].trim()) {
            return Some(value);
        }
    }

    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (trimmed.find(open), trimmed.rfind(close)) {
            if end > start {
                if let Ok(value) = serde_json::from_str(&trimmed[start..=end]) {
                    return Some(value);
                }
            }
        }
    }
    None
}
