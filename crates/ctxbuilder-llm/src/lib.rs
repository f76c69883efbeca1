//! LLM backend abstraction for the pipeline's classify and extract stages.
//!
//! All providers implement the [`LlmBackend`] trait, so callers never know
//! which transport is underneath. Two HTTP providers ship here (OpenAI and
//! Azure OpenAI); the [`AuditedBackend`] wrapper adds the retry policy and
//! guarantees every attempt is observed by the audit sink before its result
//! reaches the caller.

mod audit;
mod azure_openai_backend;
mod http_client;
mod openai_backend;
mod scripted;
mod types;

pub use audit::{AttemptLog, AuditedBackend, LlmCallObserver, NoopObserver};
pub use azure_openai_backend::AzureOpenAiBackend;
pub use openai_backend::OpenAiBackend;
pub use types::{LlmBackend, LlmConfig, LlmError, LlmInvocation, LlmResult, Message, Role, TokenUsage};

// Deterministic canned backend for tests and dry runs.
pub use scripted::ScriptedBackend;

use std::sync::Arc;

/// Construct a backend from configuration.
///
/// Prefers Azure OpenAI when an endpoint is configured, otherwise the
/// OpenAI API. Secrets come from the environment, never from config files.
///
/// # Errors
///
/// Returns [`LlmError::Misconfiguration`] when neither provider has enough
/// configuration to start.
pub fn backend_from_config(config: &LlmConfig) -> Result<Arc<dyn LlmBackend>, LlmError> {
    if config.azure_endpoint.is_some() {
        Ok(Arc::new(AzureOpenAiBackend::new_from_config(config)?))
    } else {
        Ok(Arc::new(OpenAiBackend::new_from_config(config)?))
    }
}
