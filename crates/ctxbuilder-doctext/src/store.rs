//! Write-once canonical text store.
//!
//! One `pages.json` per `doc_id`, living under the owning claim's doc
//! folder. A written file is immutable; superseding text from a
//! higher-quality source writes a run-scoped file and repoints the default
//! via atomic rename.

use crate::model::DocText;
use camino::{Utf8Path, Utf8PathBuf};
use ctxbuilder_utils::atomic_write::write_json_atomic;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DocTextStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("canonical text already exists for doc {doc_id} with different content")]
    AlreadyExists { doc_id: String },

    #[error("no canonical text for doc {doc_id}")]
    NotFound { doc_id: String },

    #[error("write failed: {0}")]
    Write(#[from] anyhow::Error),
}

/// Canonical text store rooted at a doc folder's `text/` directory.
#[derive(Debug, Clone)]
pub struct DocTextStore {
    text_dir: Utf8PathBuf,
}

impl DocTextStore {
    /// Create a store for a document's `text/` directory.
    #[must_use]
    pub fn new(text_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            text_dir: text_dir.into(),
        }
    }

    /// Path of the default `pages.json`.
    #[must_use]
    pub fn default_path(&self) -> Utf8PathBuf {
        self.text_dir.join("pages.json")
    }

    /// Whether canonical text already exists for this document.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.default_path().exists()
    }

    /// Write the canonical text for a document.
    ///
    /// Idempotent for identical content (same `text_md5`); a conflicting
    /// rewrite of the default is rejected. Use [`Self::supersede`] to
    /// publish refreshed text under a run.
    pub fn write(&self, doc: &DocText) -> Result<(), DocTextStoreError> {
        let path = self.default_path();
        if path.exists() {
            let existing = self.load()?;
            if existing.text_md5() == doc.text_md5() {
                debug!(doc_id = %doc.doc_id, "canonical text unchanged, skipping write");
                return Ok(());
            }
            return Err(DocTextStoreError::AlreadyExists {
                doc_id: doc.doc_id.clone(),
            });
        }

        write_json_atomic(&path, doc)?;
        Ok(())
    }

    /// Publish refreshed text produced by a later run.
    ///
    /// The new content is written to `pages.<run_id>.json` first; the
    /// default pointer is then replaced by a second atomic write, so readers
    /// observe either the old or the new text, never a mix.
    pub fn supersede(&self, doc: &DocText, run_id: &str) -> Result<(), DocTextStoreError> {
        let versioned = self.text_dir.join(format!("pages.{run_id}.json"));
        write_json_atomic(&versioned, doc)?;
        write_json_atomic(&self.default_path(), doc)?;
        debug!(doc_id = %doc.doc_id, run_id, "canonical text superseded");
        Ok(())
    }

    /// Load the default canonical text.
    pub fn load(&self) -> Result<DocText, DocTextStoreError> {
        let path = self.default_path();
        let content = std::fs::read_to_string(path.as_std_path()).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DocTextStoreError::NotFound {
                    doc_id: self.text_dir.to_string(),
                }
            } else {
                DocTextStoreError::Io(e)
            }
        })?;
        serde_json::from_str(&content).map_err(|source| DocTextStoreError::Parse { path, source })
    }

    /// Load from an explicit path (used by readers outside the doc folder).
    pub fn load_from(path: &Utf8Path) -> Result<DocText, DocTextStoreError> {
        let content = std::fs::read_to_string(path.as_std_path())?;
        serde_json::from_str(&content).map_err(|source| DocTextStoreError::Parse {
            path: path.to_owned(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Page, PageQuality, Readability, TextSource};
    use tempfile::TempDir;

    fn doc(doc_id: &str, text: &str) -> DocText {
        DocText::new(
            doc_id,
            vec![Page {
                page: 1,
                text: text.to_string(),
                source: TextSource::Plain,
                quality: PageQuality {
                    readability: Readability::Good,
                },
            }],
        )
    }

    fn store(dir: &TempDir) -> DocTextStore {
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        DocTextStore::new(root.join("text"))
    }

    #[test]
    fn write_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.write(&doc("d1", "hola")).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.doc_id, "d1");
        assert_eq!(loaded.pages[0].text, "hola");
        assert_eq!(loaded.schema_version, "doc_text_v1");
    }

    #[test]
    fn identical_rewrite_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.write(&doc("d1", "hola")).unwrap();
        store.write(&doc("d1", "hola")).unwrap();
    }

    #[test]
    fn conflicting_rewrite_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.write(&doc("d1", "hola")).unwrap();
        let err = store.write(&doc("d1", "different")).unwrap_err();
        assert!(matches!(err, DocTextStoreError::AlreadyExists { .. }));
    }

    #[test]
    fn supersede_updates_default_and_keeps_versioned_copy() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.write(&doc("d1", "low quality")).unwrap();
        store
            .supersede(&doc("d1", "high quality"), "20240101T000000Z_abc")
            .unwrap();

        assert_eq!(store.load().unwrap().pages[0].text, "high quality");
        let versioned =
            DocTextStore::load_from(&store.text_dir.join("pages.20240101T000000Z_abc.json"))
                .unwrap();
        assert_eq!(versioned.pages[0].text, "high quality");
    }

    #[test]
    fn load_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(matches!(
            store.load().unwrap_err(),
            DocTextStoreError::NotFound { .. }
        ));
    }
}
