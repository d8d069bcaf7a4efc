//! Language-model boundary.
//!
//! [`LanguageModel`] is the seam every pipeline stage talks to. [`HttpModel`]
//! implements it for Ollama, OpenAI-compatible chat APIs, and Anthropic.
//! [`ModelCaller`] wraps any model with retries, a per-call timeout, and JSON
//! extraction.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::ModelConfig;
use crate::error::{ConfigError, LlmError};

/// One completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub prompt: String,
    /// Ask the provider for a JSON-only response where it supports that.
    pub json: bool,
}

impl CompletionRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            json: false,
        }
    }

    pub fn json(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            json: true,
        }
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier, for logs.
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

// ── Providers ──

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Ollama,
    #[serde(rename = "openai")]
    OpenAi,
    DeepSeek,
    Groq,
    Anthropic,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
            Self::DeepSeek => "deepseek",
            Self::Groq => "groq",
            Self::Anthropic => "anthropic",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Ollama => "http://localhost:11434",
            Self::OpenAi => "https://api.openai.com/v1",
            Self::DeepSeek => "https://api.deepseek.com",
            Self::Groq => "https://api.groq.com/openai/v1",
            Self::Anthropic => "https://api.anthropic.com",
        }
    }

    /// Environment variable consulted when no API key is configured.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Self::Ollama => None,
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::DeepSeek => Some("DEEPSEEK_API_KEY"),
            Self::Groq => Some("GROQ_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
        }
    }

    fn wire(&self) -> Wire {
        match self {
            Self::Ollama => Wire::Ollama,
            Self::OpenAi | Self::DeepSeek | Self::Groq => Wire::OpenAiChat,
            Self::Anthropic => Wire::Anthropic,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            "deepseek" => Ok(Self::DeepSeek),
            "groq" => Ok(Self::Groq),
            "anthropic" => Ok(Self::Anthropic),
            other => Err(format!("unknown model provider: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wire {
    Ollama,
    OpenAiChat,
    Anthropic,
}

const ANTHROPIC_VERSION: &str = "2023-06-01";

// ── HTTP model ──

/// A model served over HTTP.
pub struct HttpModel {
    client: reqwest::Client,
    provider: Provider,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: u32,
}

impl HttpModel {
    pub fn new(provider: Provider, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            provider,
            base_url: provider.default_base_url().to_string(),
            model: model.into(),
            api_key: None,
            temperature: 0.0,
            max_tokens: 4096,
        }
    }

    pub fn from_config(config: &ModelConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder().build()?;
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| config.provider.default_base_url().to_string());
        Ok(Self {
            client,
            provider: config.provider,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: config.name.clone(),
            api_key: config.resolved_api_key(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    /// Same endpoint and credentials, different model name.
    pub fn with_model(&self, model: impl Into<String>) -> Self {
        Self {
            client: self.client.clone(),
            provider: self.provider,
            base_url: self.base_url.clone(),
            model: model.into(),
            api_key: self.api_key.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn endpoint(&self) -> String {
        match self.provider.wire() {
            Wire::Ollama => format!("{}/api/generate", self.base_url),
            Wire::OpenAiChat => format!("{}/chat/completions", self.base_url),
            Wire::Anthropic => format!("{}/v1/messages", self.base_url),
        }
    }

    fn body(&self, request: &CompletionRequest) -> Value {
        match self.provider.wire() {
            Wire::Ollama => {
                let mut body = json!({
                    "model": self.model,
                    "prompt": request.prompt,
                    "stream": false,
                    "options": {
                        "temperature": self.temperature,
                        "num_predict": self.max_tokens,
                    },
                });
                if request.json {
                    body["format"] = json!("json");
                }
                body
            }
            Wire::OpenAiChat => {
                let mut body = json!({
                    "model": self.model,
                    "messages": [{"role": "user", "content": request.prompt}],
                    "temperature": self.temperature,
                    "max_tokens": self.max_tokens,
                });
                if request.json {
                    body["response_format"] = json!({"type": "json_object"});
                }
                body
            }
            Wire::Anthropic => json!({
                "model": self.model,
                "max_tokens": self.max_tokens,
                "temperature": self.temperature,
                "messages": [{"role": "user", "content": request.prompt}],
            }),
        }
    }
}

#[async_trait]
impl LanguageModel for HttpModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let url = self.endpoint();
        debug!(url = %url, model = %self.model, json = request.json, "model request");

        let mut builder = self.client.post(&url).json(&self.body(request));
        if let Some(key) = &self.api_key {
            builder = match self.provider.wire() {
                Wire::Anthropic => builder
                    .header("x-api-key", key)
                    .header("anthropic-version", ANTHROPIC_VERSION),
                Wire::OpenAiChat | Wire::Ollama => builder.bearer_auth(key),
            };
        }

        let resp = check_response(builder.send().await?).await?;
        let payload: Value = resp.json().await?;
        response_text(self.provider.wire(), &payload)
    }
}

/// Map rate limiting and non-success statuses to errors.
async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = resp.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(LlmError::RateLimited {
            retry_after_secs: retry_after_secs(resp.headers()),
        });
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(LlmError::Server {
            status: status.as_u16(),
            body,
        });
    }
    Ok(resp)
}

/// Parse `Retry-After` as seconds, falling back to 60.
fn retry_after_secs(headers: &reqwest::header::HeaderMap) -> u64 {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(60)
}

fn response_text(wire: Wire, payload: &Value) -> Result<String, LlmError> {
    let text = match wire {
        Wire::Ollama => payload.get("response").and_then(Value::as_str),
        Wire::OpenAiChat => payload.pointer("/choices/0/message/content").and_then(Value::as_str),
        Wire::Anthropic => payload
            .get("content")
            .and_then(Value::as_array)
            .and_then(|blocks| {
                blocks
                    .iter()
                    .find(|b| b.get("type").and_then(Value::as_str) == Some("text"))
            })
            .and_then(|b| b.get("text"))
            .and_then(Value::as_str),
    };
    text.map(str::to_string)
        .ok_or_else(|| LlmError::Shape(payload.to_string().chars().take(200).collect()))
}

// ── JSON extraction ──

static FENCED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("fence pattern is valid")
});

/// Pull a JSON value out of a model response.
///
/// Tries, in order: the whole response, each fenced code block, and the first
/// balanced `{...}` span.
pub fn extract_json(raw: &str) -> Result<Value, LlmError> {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed)
        && value.is_object()
    {
        return Ok(value);
    }

    for caps in FENCED.captures_iter(trimmed) {
        if let Some(body) = caps.get(1)
            && let Ok(value) = serde_json::from_str::<Value>(body.as_str().trim())
        {
            return Ok(value);
        }
    }

    let span = balanced_object(trimmed).ok_or(LlmError::NoJson)?;
    Ok(serde_json::from_str(span)?)
}

/// First `{...}` span with balanced braces, ignoring braces inside strings.
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

// ── Caller ──

/// Retrying, timed access to a [`LanguageModel`].
#[derive(Clone)]
pub struct ModelCaller {
    model: Arc<dyn LanguageModel>,
    max_attempts: u32,
    timeout: Duration,
    backoff: Duration,
}

impl ModelCaller {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            max_attempts: 3,
            timeout: Duration::from_secs(120),
            backoff: Duration::from_secs(1),
        }
    }

    pub fn from_config(model: Arc<dyn LanguageModel>, config: &ModelConfig) -> Self {
        Self::new(model)
            .with_max_attempts(config.max_retries)
            .with_timeout(Duration::from_secs(config.timeout_secs))
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Base delay between attempts; attempt `n` waits `n * backoff`.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Free-text completion, trimmed.
    pub async fn text(&self, prompt: &str) -> Result<String, LlmError> {
        let request = CompletionRequest::text(prompt);
        self.with_retries(&request, |raw| Ok(raw.trim().to_string()))
            .await
    }

    /// JSON completion deserialized into `T`. A response that cannot be parsed
    /// counts as a failed attempt.
    pub async fn structured<T: DeserializeOwned>(&self, prompt: &str) -> Result<T, LlmError> {
        let request = CompletionRequest::json(prompt);
        self.with_retries(&request, |raw| {
            let value = extract_json(&raw)?;
            Ok(serde_json::from_value(value)?)
        })
        .await
    }

    async fn with_retries<T>(
        &self,
        request: &CompletionRequest,
        parse: impl Fn(String) -> Result<T, LlmError>,
    ) -> Result<T, LlmError> {
        let mut last = LlmError::Other("no attempt made".to_string());
        for attempt in 1..=self.max_attempts {
            let call = tokio::time::timeout(self.timeout, self.model.complete(request));
            let outcome = match call.await {
                Ok(Ok(raw)) => parse(raw),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(LlmError::Timeout(self.timeout.as_secs())),
            };

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            warn!(
                model = %self.model.name(),
                attempt,
                max_attempts = self.max_attempts,
                error = %err,
                "model call failed"
            );

            if attempt < self.max_attempts {
                // Retry-After waits no longer than one call may take.
                let delay = match &err {
                    LlmError::RateLimited { retry_after_secs } => {
                        Duration::from_secs(*retry_after_secs).min(self.timeout)
                    }
                    _ => self.backoff * attempt,
                };
                tokio::time::sleep(delay).await;
            }
            last = err;
        }

        Err(LlmError::Exhausted {
            attempts: self.max_attempts,
            last: Box::new(last),
        })
    }
}
