//! Plain-text provider.
//!
//! Text dumps arrive with form-feed page separators from upstream export
//! tools; each separated chunk becomes one page.

use crate::{grade_readability, IngestError, IngestionProvider};
use async_trait::async_trait;
use camino::Utf8Path;
use ctxbuilder_doctext::{DocText, Page, PageQuality, TextSource};
use tracing::debug;

#[derive(Debug, Default)]
pub struct PlainTextProvider;

impl PlainTextProvider {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl IngestionProvider for PlainTextProvider {
    fn name(&self) -> &str {
        "plain_text"
    }

    fn supports(&self, mime: &str) -> bool {
        mime == "text/plain"
    }

    async fn ingest(&self, path: &Utf8Path, doc_id: &str) -> Result<DocText, IngestError> {
        let content = tokio::fs::read_to_string(path.as_std_path()).await?;

        let chunks: Vec<&str> = if content.contains('\u{c}') {
            content.split('\u{c}').collect()
        } else {
            vec![content.as_str()]
        };

        let pages: Vec<Page> = chunks
            .into_iter()
            .map(|chunk| Page {
                page: 0, // renumbered by DocText::new
                text: chunk.to_string(),
                source: TextSource::Plain,
                quality: PageQuality {
                    readability: grade_readability(chunk),
                },
            })
            .collect();

        debug!(doc_id, pages = pages.len(), "plain text ingested");
        Ok(DocText::new(doc_id, pages))
    }
}
