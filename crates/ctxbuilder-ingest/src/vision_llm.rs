//! Vision-LLM provider.
//!
//! Fallback for scans the layout service cannot read: the page image is
//! base64-embedded into a transcription prompt and the model's transcript
//! becomes the page text, marked `vision_ocr`. Used directly for image
//! sources and by the extraction stage's vision fallback path.

use crate::{grade_readability, IngestError, IngestionProvider};
use async_trait::async_trait;
use base64::Engine;
use camino::Utf8Path;
use ctxbuilder_doctext::{DocText, Page, PageQuality, TextSource};
use ctxbuilder_llm::{LlmBackend, LlmError, LlmInvocation, Message};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const TRANSCRIBE_TIMEOUT: Duration = Duration::from_secs(120);

const TRANSCRIBE_SYSTEM_PROMPT: &str = "You are a transcription engine. Return the complete text \
content of the supplied document image, reading order preserved. Return text only, no commentary.";

pub struct VisionLlmProvider {
    backend: Arc<dyn LlmBackend>,
    model: String,
}

impl std::fmt::Debug for VisionLlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionLlmProvider")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl VisionLlmProvider {
    #[must_use]
    pub fn new(backend: Arc<dyn LlmBackend>, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
        }
    }
}

#[async_trait]
impl IngestionProvider for VisionLlmProvider {
    fn name(&self) -> &str {
        "vision_llm"
    }

    fn supports(&self, mime: &str) -> bool {
        matches!(mime, "image/png" | "image/jpeg" | "image/tiff")
    }

    async fn ingest(&self, path: &Utf8Path, doc_id: &str) -> Result<DocText, IngestError> {
        let raw = tokio::fs::read(path.as_std_path()).await?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&raw);

        let inv = LlmInvocation::new(
            "vision_ingestion",
            self.model.clone(),
            vec![
                Message::system(TRANSCRIBE_SYSTEM_PROMPT),
                Message::user(format!("data:image;base64,{encoded}")),
            ],
        )
        .with_context(Some(doc_id.to_string()), None)
        .with_timeout(TRANSCRIBE_TIMEOUT);

        let result = self.backend.invoke(inv).await.map_err(map_llm_error)?;
        let text = result.raw_response;

        debug!(doc_id, chars = text.len(), "vision transcription complete");

        let quality = PageQuality {
            readability: grade_readability(&text),
        };
        Ok(DocText::new(
            doc_id,
            vec![Page {
                page: 1,
                text,
                source: TextSource::VisionOcr,
                quality,
            }],
        ))
    }
}

fn map_llm_error(err: LlmError) -> IngestError {
    match err {
        LlmError::Misconfiguration(m) => IngestError::ConfigurationMissing(m),
        e if e.is_retryable() => IngestError::ProviderTransient(e.to_string()),
        e => IngestError::ProviderFatal(e.to_string()),
    }
}
