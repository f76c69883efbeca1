//! Local OCR provider.
//!
//! Shells out to tesseract for image sources. The binary path defaults to
//! `tesseract` on PATH and can be overridden with `TESSERACT_CMD` (the usual
//! Windows arrangement).

use crate::{grade_readability, IngestError, IngestionProvider};
use async_trait::async_trait;
use camino::Utf8Path;
use ctxbuilder_doctext::{DocText, Page, PageQuality, TextSource};
use tokio::process::Command;
use tracing::debug;

#[derive(Debug)]
pub struct OcrProvider {
    binary: String,
}

impl OcrProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            binary: std::env::var("TESSERACT_CMD").unwrap_or_else(|_| "tesseract".to_string()),
        }
    }

    #[must_use]
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for OcrProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IngestionProvider for OcrProvider {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn supports(&self, mime: &str) -> bool {
        matches!(mime, "image/png" | "image/jpeg" | "image/tiff")
    }

    async fn ingest(&self, path: &Utf8Path, doc_id: &str) -> Result<DocText, IngestError> {
        // `tesseract <image> stdout` prints recognized text directly.
        let output = Command::new(&self.binary)
            .arg(path.as_str())
            .arg("stdout")
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    IngestError::ConfigurationMissing(format!(
                        "tesseract binary '{}' not found; set TESSERACT_CMD",
                        self.binary
                    ))
                } else {
                    IngestError::ProviderFatal(format!("failed to spawn tesseract: {e}"))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(IngestError::ProviderFatal(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).to_string();
        debug!(doc_id, chars = text.len(), "tesseract OCR complete");

        let quality = PageQuality {
            readability: grade_readability(&text),
        };
        Ok(DocText::new(
            doc_id,
            vec![Page {
                page: 1,
                text,
                source: TextSource::Tesseract,
                quality,
            }],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_binary_is_configuration_missing() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("scan.png")).unwrap();
        std::fs::write(path.as_std_path(), [0x89, b'P', b'N', b'G']).unwrap();

        let provider = OcrProvider::with_binary("definitely-not-a-real-tesseract-binary");
        let err = provider.ingest(&path, "d1").await.unwrap_err();
        assert!(matches!(err, IngestError::ConfigurationMissing(_)));
    }

    #[test]
    fn supports_images_not_pdfs() {
        let provider = OcrProvider::with_binary("tesseract");
        assert!(provider.supports("image/png"));
        assert!(!provider.supports("application/pdf"));
    }
}
