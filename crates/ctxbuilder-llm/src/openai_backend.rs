//! OpenAI Chat Completions backend.

use crate::http_client::HttpClient;
use crate::types::{LlmBackend, LlmConfig, LlmError, LlmInvocation, LlmResult, Role, TokenUsage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/chat/completions";

pub struct OpenAiBackend {
    client: HttpClient,
    base_url: String,
    api_key: String,
    default_model: String,
}

impl OpenAiBackend {
    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if the HTTP client cannot be
    /// constructed.
    pub fn new(api_key: String, default_model: String) -> Result<Self, LlmError> {
        Ok(Self {
            client: HttpClient::new()?,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            default_model,
        })
    }

    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if `OPENAI_API_KEY` is absent.
    pub fn new_from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config.openai_api_key.clone().ok_or_else(|| {
            LlmError::Misconfiguration(
                "OpenAI API key not found. Set OPENAI_API_KEY or configure Azure OpenAI."
                    .to_string(),
            )
        })?;
        let default_model = config
            .default_model
            .clone()
            .unwrap_or_else(|| "gpt-4o-mini".to_string());
        Self::new(api_key, default_model)
    }
}

#[derive(Serialize)]
pub(crate) struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Serialize)]
pub(crate) struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Deserialize)]
pub(crate) struct ChatResponse {
    pub choices: Vec<ChatChoice>,
    pub model: Option<String>,
    pub usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
pub(crate) struct ChatChoice {
    pub message: ChatResponseMessage,
}

#[derive(Deserialize)]
pub(crate) struct ChatResponseMessage {
    pub content: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct ChatUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

pub(crate) fn to_wire_messages(inv: &LlmInvocation) -> Vec<ChatMessage> {
    inv.messages
        .iter()
        .map(|m| ChatMessage {
            role: match m.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: m.content.clone(),
        })
        .collect()
}

pub(crate) fn parse_chat_response(
    body: ChatResponse,
    provider: &str,
    requested_model: &str,
    latency_ms: u64,
) -> Result<LlmResult, LlmError> {
    let content = body
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| {
            LlmError::InvalidResponse(format!("{provider} response contained no choices"))
        })?;

    Ok(LlmResult {
        raw_response: content,
        provider: provider.to_string(),
        model_used: body.model.unwrap_or_else(|| requested_model.to_string()),
        token_usage: body.usage.map(|u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        }),
        latency_ms,
    })
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    fn provider(&self) -> &str {
        "openai"
    }

    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        let model = if inv.model.is_empty() {
            self.default_model.clone()
        } else {
            inv.model.clone()
        };

        debug!(
            provider = "openai",
            model = %model,
            purpose = %inv.purpose,
            "invoking OpenAI backend"
        );

        let request_body = ChatRequest {
            model: model.clone(),
            messages: to_wire_messages(&inv),
            max_tokens: inv.max_tokens,
            temperature: inv.temperature,
        };

        let request = reqwest::Client::new()
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&request_body);

        let started = Instant::now();
        let response = self.client.execute_once(request, inv.timeout, "openai").await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse OpenAI response: {e}")))?;

        parse_chat_response(body, "openai", &model, latency_ms)
    }
}
