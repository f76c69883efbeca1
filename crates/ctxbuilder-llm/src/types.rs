//! Core types for the LLM backend abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// Token accounting returned by providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Input to a backend invocation.
///
/// `purpose`, `doc_id`, and `claim_id` ride along so the audit sink can
/// record the decision context of every call.
#[derive(Debug, Clone)]
pub struct LlmInvocation {
    /// What the call is for ("classification", "extraction", ...).
    pub purpose: String,
    pub doc_id: Option<String>,
    pub claim_id: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub messages: Vec<Message>,
}

impl LlmInvocation {
    #[must_use]
    pub fn new(purpose: impl Into<String>, model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            purpose: purpose.into(),
            doc_id: None,
            claim_id: None,
            model: model.into(),
            temperature: 0.0,
            max_tokens: 2048,
            timeout: Duration::from_secs(60),
            messages,
        }
    }

    #[must_use]
    pub fn with_context(mut self, doc_id: Option<String>, claim_id: Option<String>) -> Self {
        self.doc_id = doc_id;
        self.claim_id = claim_id;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Result of a backend invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResult {
    pub raw_response: String,
    pub provider: String,
    pub model_used: String,
    pub token_usage: Option<TokenUsage>,
    pub latency_ms: u64,
}

/// Errors raised by backends.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM misconfiguration: {0}")]
    Misconfiguration(String),

    #[error("LLM transport failure: {0}")]
    Transport(String),

    #[error("LLM authentication failed: {0}")]
    ProviderAuth(String),

    #[error("LLM rate limit exceeded: {0}")]
    ProviderQuota(String),

    #[error("LLM provider outage: {0}")]
    ProviderOutage(String),

    #[error("LLM call timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("LLM response unusable: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// Whether the retry policy should try again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProviderQuota(_) | Self::ProviderOutage(_) | Self::Timeout { .. } | Self::Transport(_)
        )
    }
}

/// Provider configuration, resolved from workspace config plus environment.
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    /// OpenAI API key (`OPENAI_API_KEY`).
    pub openai_api_key: Option<String>,
    /// Azure OpenAI endpoint; presence selects the Azure backend.
    pub azure_endpoint: Option<String>,
    /// Azure OpenAI deployment name.
    pub azure_deployment: Option<String>,
    /// Azure OpenAI API version.
    pub azure_api_version: Option<String>,
    /// Azure OpenAI API key.
    pub azure_api_key: Option<String>,
    /// Default model when the invocation does not name one.
    pub default_model: Option<String>,
}

impl LlmConfig {
    /// Resolve provider secrets from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            azure_endpoint: std::env::var("AZURE_OPENAI_ENDPOINT").ok(),
            azure_deployment: std::env::var("AZURE_OPENAI_DEPLOYMENT").ok(),
            azure_api_version: std::env::var("AZURE_OPENAI_API_VERSION").ok(),
            azure_api_key: std::env::var("AZURE_OPENAI_API_KEY").ok(),
            default_model: None,
        }
    }
}

/// Trait implemented by every LLM provider.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Provider name recorded in audit entries ("openai", "azure_openai").
    fn provider(&self) -> &str;

    /// Invoke the model once. Backends do not retry; the retry policy lives
    /// in [`crate::AuditedBackend`] so every attempt is auditable.
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(LlmError::ProviderQuota("429".into()).is_retryable());
        assert!(LlmError::Timeout {
            duration: Duration::from_secs(1)
        }
        .is_retryable());
        assert!(!LlmError::Misconfiguration("no key".into()).is_retryable());
        assert!(!LlmError::InvalidResponse("bad json".into()).is_retryable());
    }

    #[test]
    fn invocation_builder_sets_context() {
        let inv = LlmInvocation::new("classification", "gpt-4o-mini", vec![Message::user("hi")])
            .with_context(Some("doc1".into()), Some("claim1".into()))
            .with_temperature(0.1);
        assert_eq!(inv.doc_id.as_deref(), Some("doc1"));
        assert_eq!(inv.claim_id.as_deref(), Some("claim1"));
        assert!((inv.temperature - 0.1).abs() < f32::EPSILON);
    }
}
