//! Completion service clients.
//!
//! One trait seam, two providers:
//!   - Anthropic messages API (default provider)
//!   - OpenAI chat.completions
//!
//! Calls are instrumented and log model names, latencies and token usage,
//! never the API key or the completion text.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::config::{CompletionSettings, Provider};
use crate::error::CompletionError;

const CLIENT_UA: &str = concat!("qbank-generator/", env!("CARGO_PKG_VERSION"));
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anything that can turn a prompt into text. The batch driver only sees this.
#[async_trait]
pub trait CompletionService: Send + Sync {
  async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, CompletionError>;

  /// Short label for logs.
  fn describe(&self) -> String;
}

/// Build the configured provider client. API keys come from the environment only.
pub fn from_settings(settings: &CompletionSettings, system: &str) -> Result<Box<dyn CompletionService>, CompletionError> {
  match settings.provider {
    Provider::Anthropic => Ok(Box::new(Anthropic::from_env(settings, system)?)),
    Provider::OpenAi => Ok(Box::new(OpenAI::from_env(settings, system)?)),
  }
}

fn http_client(settings: &CompletionSettings) -> Result<reqwest::Client, CompletionError> {
  reqwest::Client::builder()
    .timeout(settings.timeout())
    .build()
    .map_err(CompletionError::from)
}

fn non_empty_or(value: &str, fallback: &str) -> String {
  if value.trim().is_empty() { fallback.to_string() } else { value.trim_end_matches('/').to_string() }
}

async fn error_status(res: reqwest::Response) -> CompletionError {
  let status = res.status().as_u16();
  let body = res.text().await.unwrap_or_default();
  let message = extract_provider_error(&body).unwrap_or(body);
  CompletionError::Status { status, message }
}

/// Both providers wrap errors as `{"error": {"message": ...}}`.
fn extract_provider_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}

// --- Anthropic ---

#[derive(Clone)]
pub struct Anthropic {
  client: reqwest::Client,
  api_key: String,
  pub base_url: String,
  pub model: String,
  system: String,
  temperature: f32,
}

impl Anthropic {
  pub fn from_env(settings: &CompletionSettings, system: &str) -> Result<Self, CompletionError> {
    let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| CompletionError::MissingApiKey("ANTHROPIC_API_KEY"))?;
    Ok(Self {
      client: http_client(settings)?,
      api_key,
      base_url: non_empty_or(&settings.base_url, "https://api.anthropic.com/v1"),
      model: non_empty_or(&settings.model, "claude-3-5-sonnet-20241022"),
      system: system.to_string(),
      temperature: settings.temperature,
    })
  }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
  model: &'a str,
  max_tokens: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  system: Option<&'a str>,
  temperature: f32,
  messages: Vec<ChatMessageReq<'a>>,
}

#[derive(Deserialize)]
struct MessagesResponse {
  #[serde(default)]
  content: Vec<ContentBlock>,
  #[serde(default)]
  stop_reason: Option<String>,
  #[serde(default)]
  usage: Option<AnthropicUsage>,
}
#[derive(Deserialize)]
struct ContentBlock {
  #[serde(rename = "type")]
  kind: String,
  #[serde(default)]
  text: Option<String>,
}
#[derive(Deserialize)]
struct AnthropicUsage {
  #[serde(default)] input_tokens: Option<u32>,
  #[serde(default)] output_tokens: Option<u32>,
}

#[async_trait]
impl CompletionService for Anthropic {
  #[instrument(level = "info", skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
  async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, CompletionError> {
    let url = format!("{}/messages", self.base_url);
    let req = MessagesRequest {
      model: &self.model,
      max_tokens,
      system: (!self.system.is_empty()).then_some(self.system.as_str()),
      temperature: self.temperature,
      messages: vec![ChatMessageReq { role: "user", content: prompt }],
    };

    let start = Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, CLIENT_UA)
      .header(CONTENT_TYPE, "application/json")
      .header("x-api-key", &self.api_key)
      .header("anthropic-version", ANTHROPIC_VERSION)
      .json(&req).send().await?;

    if !res.status().is_success() {
      return Err(error_status(res).await);
    }

    let body: MessagesResponse = res.json().await?;
    if let Some(usage) = &body.usage {
      info!(elapsed = ?start.elapsed(), input_tokens = ?usage.input_tokens, output_tokens = ?usage.output_tokens, "Anthropic usage");
    }
    if body.stop_reason.as_deref() == Some("max_tokens") {
      warn!(max_tokens, "Completion stopped at the token limit; output is likely truncated");
    }

    let text: String = body.content.iter()
      .filter(|b| b.kind == "text")
      .filter_map(|b| b.text.as_deref())
      .collect();
    if text.trim().is_empty() {
      return Err(CompletionError::Empty);
    }
    Ok(text)
  }

  fn describe(&self) -> String {
    format!("anthropic:{} @ {}", self.model, self.base_url)
  }
}

// --- OpenAI ---

#[derive(Clone)]
pub struct OpenAI {
  client: reqwest::Client,
  api_key: String,
  pub base_url: String,
  pub model: String,
  system: String,
  temperature: f32,
}

impl OpenAI {
  pub fn from_env(settings: &CompletionSettings, system: &str) -> Result<Self, CompletionError> {
    let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| CompletionError::MissingApiKey("OPENAI_API_KEY"))?;
    let base_url = std::env::var("OPENAI_BASE_URL")
      .ok()
      .filter(|_| settings.base_url.trim().is_empty())
      .unwrap_or_else(|| non_empty_or(&settings.base_url, "https://api.openai.com/v1"));
    Ok(Self {
      client: http_client(settings)?,
      api_key,
      base_url,
      model: non_empty_or(&settings.model, "gpt-4o"),
      system: system.to_string(),
      temperature: settings.temperature,
    })
  }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
  model: &'a str,
  messages: Vec<ChatMessageReq<'a>>,
  temperature: f32,
  max_tokens: u32,
}
#[derive(Serialize)]
struct ChatMessageReq<'a> { role: &'a str, content: &'a str }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice {
  message: ChatMessageResp,
  #[serde(default)] finish_reason: Option<String>,
}
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

#[async_trait]
impl CompletionService for OpenAI {
  #[instrument(level = "info", skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
  async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, CompletionError> {
    let url = format!("{}/chat/completions", self.base_url);
    let mut messages = Vec::with_capacity(2);
    if !self.system.is_empty() {
      messages.push(ChatMessageReq { role: "system", content: &self.system });
    }
    messages.push(ChatMessageReq { role: "user", content: prompt });
    let req = ChatCompletionRequest { model: &self.model, messages, temperature: self.temperature, max_tokens };

    let start = Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, CLIENT_UA)
      .header(CONTENT_TYPE, "application/json")
      .bearer_auth(&self.api_key)
      .json(&req).send().await?;

    if !res.status().is_success() {
      return Err(error_status(res).await);
    }

    let body: ChatCompletionResponse = res.json().await?;
    if let Some(usage) = &body.usage {
      info!(elapsed = ?start.elapsed(), prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let choice = body.choices.into_iter().next().ok_or(CompletionError::Empty)?;
    if choice.finish_reason.as_deref() == Some("length") {
      warn!(max_tokens, "Completion stopped at the token limit; output is likely truncated");
    }
    let text = choice.message.content.unwrap_or_default();
    if text.trim().is_empty() {
      return Err(CompletionError::Empty);
    }
    Ok(text)
  }

  fn describe(&self) -> String {
    format!("openai:{} @ {}", self.model, self.base_url)
  }
}
