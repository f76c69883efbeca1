//! Azure OpenAI backend.
//!
//! Same Chat Completions wire format as the OpenAI backend; the differences
//! are the URL shape (`{endpoint}/openai/deployments/{deployment}/chat/
//! completions?api-version=...`) and the `api-key` header.

use crate::http_client::HttpClient;
use crate::openai_backend::{parse_chat_response, to_wire_messages, ChatRequest, ChatResponse};
use crate::types::{LlmBackend, LlmConfig, LlmError, LlmInvocation, LlmResult};
use async_trait::async_trait;
use std::time::Instant;
use tracing::debug;

const DEFAULT_API_VERSION: &str = "2024-06-01";

pub struct AzureOpenAiBackend {
    client: HttpClient,
    endpoint: String,
    deployment: String,
    api_version: String,
    api_key: String,
}

impl AzureOpenAiBackend {
    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` when endpoint, deployment, or
    /// key are missing.
    pub fn new_from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let endpoint = config.azure_endpoint.clone().ok_or_else(|| {
            LlmError::Misconfiguration("Azure OpenAI endpoint not configured".to_string())
        })?;
        let deployment = config.azure_deployment.clone().ok_or_else(|| {
            LlmError::Misconfiguration(
                "Azure OpenAI deployment not configured. Set AZURE_OPENAI_DEPLOYMENT.".to_string(),
            )
        })?;
        let api_key = config.azure_api_key.clone().ok_or_else(|| {
            LlmError::Misconfiguration(
                "Azure OpenAI API key not configured. Set AZURE_OPENAI_API_KEY.".to_string(),
            )
        })?;
        let api_version = config
            .azure_api_version
            .clone()
            .unwrap_or_else(|| DEFAULT_API_VERSION.to_string());

        Ok(Self {
            client: HttpClient::new()?,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            deployment,
            api_version,
            api_key,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint, self.deployment, self.api_version
        )
    }
}

#[async_trait]
impl LlmBackend for AzureOpenAiBackend {
    fn provider(&self) -> &str {
        "azure_openai"
    }

    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        debug!(
            provider = "azure_openai",
            deployment = %self.deployment,
            purpose = %inv.purpose,
            "invoking Azure OpenAI backend"
        );

        // Azure routes by deployment; the model name in the body is ignored
        // but recorded for the audit trail.
        let request_body = ChatRequest {
            model: inv.model.clone(),
            messages: to_wire_messages(&inv),
            max_tokens: inv.max_tokens,
            temperature: inv.temperature,
        };

        let request = reqwest::Client::new()
            .post(self.url())
            .header("api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&request_body);

        let started = Instant::now();
        let response = self
            .client
            .execute_once(request, inv.timeout, "azure_openai")
            .await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let body: ChatResponse = response.json().await.map_err(|e| {
            LlmError::InvalidResponse(format!("Failed to parse Azure OpenAI response: {e}"))
        })?;

        parse_chat_response(body, "azure_openai", &self.deployment, latency_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LlmConfig {
        LlmConfig {
            azure_endpoint: Some("https://example.openai.azure.com/".to_string()),
            azure_deployment: Some("gpt-4o".to_string()),
            azure_api_version: None,
            azure_api_key: Some("key".to_string()),
            ..LlmConfig::default()
        }
    }

    #[test]
    fn url_shape_includes_deployment_and_api_version() {
        let backend = AzureOpenAiBackend::new_from_config(&config()).unwrap();
        assert_eq!(
            backend.url(),
            "https://example.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-06-01"
        );
    }

    #[test]
    fn missing_deployment_is_misconfiguration() {
        let mut cfg = config();
        cfg.azure_deployment = None;
        assert!(matches!(
            AzureOpenAiBackend::new_from_config(&cfg),
            Err(LlmError::Misconfiguration(_))
        ));
    }
}
