//! Document-intelligence provider.
//!
//! Posts the raw document to a layout-analysis HTTP service shaped like
//! Azure Document Intelligence and maps its per-page text into
//! `doc_text_v1`. Endpoint and key come from the environment
//! (`AZURE_DI_ENDPOINT`, `AZURE_DI_API_KEY`).

use crate::{grade_readability, IngestError, IngestionProvider};
use async_trait::async_trait;
use camino::Utf8Path;
use ctxbuilder_doctext::{DocText, Page, PageQuality, TextSource};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const ANALYZE_TIMEOUT: Duration = Duration::from_secs(120);

pub struct DiLikeProvider {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for DiLikeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiLikeProvider")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct AnalyzeResponse {
    pages: Vec<AnalyzePage>,
}

#[derive(Deserialize)]
struct AnalyzePage {
    #[serde(default)]
    text: String,
}

impl DiLikeProvider {
    /// Build from explicit endpoint and key.
    ///
    /// # Errors
    ///
    /// Returns `IngestError::ConfigurationMissing` for empty values.
    pub fn new(endpoint: String, api_key: String) -> Result<Self, IngestError> {
        if endpoint.trim().is_empty() || api_key.trim().is_empty() {
            return Err(IngestError::ConfigurationMissing(
                "document-intelligence endpoint and key must be non-empty".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|e| IngestError::ProviderFatal(format!("HTTP client build failed: {e}")))?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    /// Build from `AZURE_DI_ENDPOINT` / `AZURE_DI_API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns `IngestError::ConfigurationMissing` when either is unset.
    pub fn new_from_env() -> Result<Self, IngestError> {
        let endpoint = std::env::var("AZURE_DI_ENDPOINT").map_err(|_| {
            IngestError::ConfigurationMissing("AZURE_DI_ENDPOINT is not set".to_string())
        })?;
        let api_key = std::env::var("AZURE_DI_API_KEY").map_err(|_| {
            IngestError::ConfigurationMissing("AZURE_DI_API_KEY is not set".to_string())
        })?;
        Self::new(endpoint, api_key)
    }
}

#[async_trait]
impl IngestionProvider for DiLikeProvider {
    fn name(&self) -> &str {
        "di_like"
    }

    fn supports(&self, mime: &str) -> bool {
        matches!(
            mime,
            "application/pdf" | "image/png" | "image/jpeg" | "image/tiff"
        )
    }

    async fn ingest(&self, path: &Utf8Path, doc_id: &str) -> Result<DocText, IngestError> {
        let raw = tokio::fs::read(path.as_std_path()).await?;

        let url = format!("{}/analyze", self.endpoint);
        let response = self
            .client
            .post(&url)
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .header("content-type", "application/octet-stream")
            .body(raw)
            .timeout(ANALYZE_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    IngestError::ProviderTransient(format!("DI request failed: {e}"))
                } else {
                    IngestError::ProviderFatal(format!("DI request failed: {e}"))
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(IngestError::ProviderTransient(format!(
                "DI service returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(IngestError::ProviderFatal(format!(
                "DI service returned {status}"
            )));
        }

        let body: AnalyzeResponse = response.json().await.map_err(|e| {
            IngestError::ProviderFatal(format!("DI response was not parseable: {e}"))
        })?;

        if body.pages.is_empty() {
            return Err(IngestError::ProviderFatal(
                "DI service returned zero pages".to_string(),
            ));
        }

        let pages: Vec<Page> = body
            .pages
            .into_iter()
            .map(|p| Page {
                page: 0,
                quality: PageQuality {
                    readability: grade_readability(&p.text),
                },
                text: p.text,
                source: TextSource::Di,
            })
            .collect();

        debug!(doc_id, pages = pages.len(), "document-intelligence ingested");
        Ok(DocText::new(doc_id, pages))
    }
}
