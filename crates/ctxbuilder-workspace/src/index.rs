//! Registry index files.
//!
//! `doc_index.json` and `claim_index.json` are caches over the claims tree:
//! convenient for listing, never authoritative. Both are regenerated from
//! on-disk state, so a stale or deleted index is a non-event.

use crate::labels::LabelStore;
use crate::meta::DocMeta;
use crate::paths::WorkspacePaths;
use ctxbuilder_utils::atomic_write::write_json_atomic;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One document row in `doc_index.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocIndexEntry {
    pub doc_id: String,
    pub claim_id: String,
    pub original_filename: String,
    pub ingest_provider: String,
    pub text_md5: String,
    pub has_labels: bool,
}

/// One claim row in `claim_index.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimIndexEntry {
    pub claim_id: String,
    pub doc_count: usize,
}

/// Rebuild both indexes by walking the claims tree.
pub fn rebuild_indexes(paths: &WorkspacePaths) -> anyhow::Result<(Vec<DocIndexEntry>, Vec<ClaimIndexEntry>)> {
    let mut docs = Vec::new();
    let mut claims = Vec::new();

    let claims_dir = paths.claims_dir();
    if let Ok(claim_entries) = std::fs::read_dir(claims_dir.as_std_path()) {
        let mut claim_ids: Vec<String> = claim_entries
            .flatten()
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().to_str().map(String::from))
            .collect();
        claim_ids.sort();

        for claim_id in claim_ids {
            let docs_dir = paths.claim_dir(&claim_id).join("docs");
            let mut doc_count = 0;

            if let Ok(doc_entries) = std::fs::read_dir(docs_dir.as_std_path()) {
                let mut doc_ids: Vec<String> = doc_entries
                    .flatten()
                    .filter(|e| e.path().is_dir())
                    .filter_map(|e| e.file_name().to_str().map(String::from))
                    .collect();
                doc_ids.sort();

                for doc_id in doc_ids {
                    let Some(meta) =
                        DocMeta::load(&paths.doc_meta_path(&claim_id, &doc_id))?
                    else {
                        continue;
                    };
                    doc_count += 1;
                    let has_labels =
                        LabelStore::new(paths.doc_labels_dir(&claim_id, &doc_id)).has_labels();
                    docs.push(DocIndexEntry {
                        doc_id,
                        claim_id: claim_id.clone(),
                        original_filename: meta.original_filename,
                        ingest_provider: meta.ingest_provider,
                        text_md5: meta.text_md5,
                        has_labels,
                    });
                }
            }

            claims.push(ClaimIndexEntry {
                claim_id,
                doc_count,
            });
        }
    }

    write_json_atomic(&paths.doc_index_path(), &docs)?;
    write_json_atomic(&paths.claim_index_path(), &claims)?;
    debug!(docs = docs.len(), claims = claims.len(), "registry indexes rebuilt");

    Ok((docs, claims))
}
