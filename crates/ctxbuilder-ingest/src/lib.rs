//! Ingestion providers.
//!
//! A provider turns a source artifact (PDF, image, text dump) into canonical
//! `doc_text_v1`. Providers are interchangeable behind [`IngestionProvider`]
//! and selected through a registry by sniffed mime type. A provider failure
//! never leaves a partial `pages.json` behind: the orchestrator only writes
//! text after a successful `ingest`.

mod di_like;
mod mime;
mod ocr;
mod plain_text;
mod vision_llm;

pub use di_like::DiLikeProvider;
pub use mime::sniff_mime;
pub use ocr::OcrProvider;
pub use plain_text::PlainTextProvider;
pub use vision_llm::VisionLlmProvider;

use async_trait::async_trait;
use camino::Utf8Path;
use ctxbuilder_doctext::{DocText, Readability};
use std::sync::Arc;
use thiserror::Error;

/// Failure modes shared by every provider.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("file not supported by any provider (mime: {mime})")]
    FileNotSupported { mime: String },

    #[error("provider configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("transient provider failure: {0}")]
    ProviderTransient(String),

    #[error("fatal provider failure: {0}")]
    ProviderFatal(String),

    #[error("IO error reading source: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    /// Whether the orchestrator may retry this ingestion locally.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderTransient(_))
    }
}

/// A source of canonical text.
#[async_trait]
pub trait IngestionProvider: Send + Sync + std::fmt::Debug {
    /// Stable provider name, recorded for reuse detection.
    fn name(&self) -> &str;

    /// Whether this provider handles the given mime type.
    fn supports(&self, mime: &str) -> bool;

    /// Produce canonical text for a source file.
    ///
    /// Implementations must emit 1-based page numbers and never form-feed
    /// characters; [`DocText::new`] enforces both.
    async fn ingest(&self, path: &Utf8Path, doc_id: &str) -> Result<DocText, IngestError>;
}

/// Ordered provider registry; the first supporting provider wins.
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn IngestionProvider>>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new(providers: Vec<Arc<dyn IngestionProvider>>) -> Self {
        Self { providers }
    }

    /// Select the provider for a source file by sniffed mime type.
    pub fn select(
        &self,
        path: &Utf8Path,
        raw: &[u8],
    ) -> Result<(Arc<dyn IngestionProvider>, String), IngestError> {
        let mime = sniff_mime(path, raw);
        self.providers
            .iter()
            .find(|p| p.supports(&mime))
            .cloned()
            .map(|p| (p, mime.clone()))
            .ok_or(IngestError::FileNotSupported { mime })
    }
}

/// Grade the readability of produced text.
///
/// A page with a reasonable share of word characters grades `good`; short
/// or symbol-heavy output grades `warn`; empty output grades `bad`.
#[must_use]
pub fn grade_readability(text: &str) -> Readability {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Readability::Bad;
    }

    let total = trimmed.chars().count();
    let wordish = trimmed
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .count();
    let ratio = wordish as f64 / total as f64;

    if total >= 40 && ratio >= 0.7 {
        Readability::Good
    } else if ratio >= 0.4 {
        Readability::Warn
    } else {
        Readability::Bad
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readability_grades() {
        assert_eq!(grade_readability(""), Readability::Bad);
        assert_eq!(grade_readability("   "), Readability::Bad);
        assert_eq!(
            grade_readability("Fecha del incidente: 13/01/2024. Parte de siniestro completo."),
            Readability::Good
        );
        assert_eq!(grade_readability("@@##!!"), Readability::Bad);
        assert_eq!(grade_readability("ok @@## 12"), Readability::Warn);
    }

    #[tokio::test]
    async fn registry_rejects_unknown_types() {
        let registry = ProviderRegistry::new(vec![Arc::new(PlainTextProvider::new())]);
        let err = registry
            .select(Utf8Path::new("movie.mp4"), &[0xFF, 0xFE, 0x00, 0x01])
            .unwrap_err();
        assert!(matches!(err, IngestError::FileNotSupported { .. }));
    }
}
