//! Per-document metadata (`meta/doc.json`).

use camino::Utf8Path;
use chrono::{DateTime, Utc};
use ctxbuilder_utils::atomic_write::write_json_atomic;
use serde::{Deserialize, Serialize};

/// Identity and ingestion provenance of one stored document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocMeta {
    pub doc_id: String,
    pub claim_id: String,
    /// Display only.
    pub original_filename: String,
    pub mime: String,
    /// Provider that produced the canonical text.
    pub ingest_provider: String,
    pub text_md5: String,
    pub ingested_at: DateTime<Utc>,
    /// Hashes used for classification reuse detection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classified_with: Option<ClassificationFingerprint>,
}

/// Inputs that produced the stored classification; a rerun with the same
/// fingerprint reuses it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationFingerprint {
    pub text_md5: String,
    pub model: String,
    pub catalog_hash: String,
}

impl DocMeta {
    pub fn save(&self, path: &Utf8Path) -> anyhow::Result<()> {
        write_json_atomic(path, self)
    }

    pub fn load(path: &Utf8Path) -> anyhow::Result<Option<Self>> {
        match std::fs::read_to_string(path.as_std_path()) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    #[test]
    fn round_trips_and_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("meta/doc.json")).unwrap();

        assert!(DocMeta::load(&path).unwrap().is_none());

        let meta = DocMeta {
            doc_id: "d1".into(),
            claim_id: "c1".into(),
            original_filename: "scan.pdf".into(),
            mime: "application/pdf".into(),
            ingest_provider: "di_like".into(),
            text_md5: "abc".into(),
            ingested_at: Utc::now(),
            classified_with: Some(ClassificationFingerprint {
                text_md5: "abc".into(),
                model: "gpt-4o-mini".into(),
                catalog_hash: "ddd".into(),
            }),
        };
        meta.save(&path).unwrap();

        let loaded = DocMeta::load(&path).unwrap().unwrap();
        assert_eq!(loaded.doc_id, "d1");
        assert_eq!(loaded.classified_with.unwrap().model, "gpt-4o-mini");
    }
}
