//! The on-disk workspace layout.
//!
//! ```text
//! claims/<claim_id>/
//!   docs/<doc_id>/{source/, text/pages.json, meta/doc.json,
//!                  labels/{latest.json, history.jsonl}}
//!   runs/<claim_run_id>/{manifest.json, outputs/extraction/<doc_id>.json,
//!                        logs/run.log, .complete}
//! runs/<global_run_id>/{manifest.json, summary.json, metrics.json,
//!                       logs/run.log, .complete}
//! registry/{doc_index.json, claim_index.json,
//!           truth/<file_md5>/{latest.json, history.jsonl}}
//! config/{specs/, prompts/, doc_type_catalog.yaml,
//!         prompt_configs_history.jsonl}
//! logs/{decisions.jsonl, llm_calls.jsonl}
//! version_bundles/<run_id>/bundle.json
//! ```
//!
//! Everything below is a path helper; nothing here touches the filesystem
//! except `ensure_layout`.

use camino::{Utf8Path, Utf8PathBuf};

/// Path helpers rooted at one workspace directory.
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    root: Utf8PathBuf,
}

impl WorkspacePaths {
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    // -- claims and documents ------------------------------------------------

    #[must_use]
    pub fn claims_dir(&self) -> Utf8PathBuf {
        self.root.join("claims")
    }

    #[must_use]
    pub fn claim_dir(&self, claim_id: &str) -> Utf8PathBuf {
        self.claims_dir().join(claim_id)
    }

    #[must_use]
    pub fn doc_dir(&self, claim_id: &str, doc_id: &str) -> Utf8PathBuf {
        self.claim_dir(claim_id).join("docs").join(doc_id)
    }

    #[must_use]
    pub fn doc_source_dir(&self, claim_id: &str, doc_id: &str) -> Utf8PathBuf {
        self.doc_dir(claim_id, doc_id).join("source")
    }

    #[must_use]
    pub fn doc_text_dir(&self, claim_id: &str, doc_id: &str) -> Utf8PathBuf {
        self.doc_dir(claim_id, doc_id).join("text")
    }

    #[must_use]
    pub fn doc_meta_path(&self, claim_id: &str, doc_id: &str) -> Utf8PathBuf {
        self.doc_dir(claim_id, doc_id).join("meta/doc.json")
    }

    #[must_use]
    pub fn doc_labels_dir(&self, claim_id: &str, doc_id: &str) -> Utf8PathBuf {
        self.doc_dir(claim_id, doc_id).join("labels")
    }

    // -- runs ----------------------------------------------------------------

    #[must_use]
    pub fn runs_dir(&self) -> Utf8PathBuf {
        self.root.join("runs")
    }

    #[must_use]
    pub fn run_dir(&self, run_id: &str) -> Utf8PathBuf {
        self.runs_dir().join(run_id)
    }

    #[must_use]
    pub fn claim_run_dir(&self, claim_id: &str, claim_run_id: &str) -> Utf8PathBuf {
        self.claim_dir(claim_id).join("runs").join(claim_run_id)
    }

    #[must_use]
    pub fn claim_run_extraction_path(
        &self,
        claim_id: &str,
        claim_run_id: &str,
        doc_id: &str,
    ) -> Utf8PathBuf {
        self.claim_run_dir(claim_id, claim_run_id)
            .join("outputs/extraction")
            .join(format!("{doc_id}.json"))
    }

    // -- registry ------------------------------------------------------------

    #[must_use]
    pub fn registry_dir(&self) -> Utf8PathBuf {
        self.root.join("registry")
    }

    #[must_use]
    pub fn doc_index_path(&self) -> Utf8PathBuf {
        self.registry_dir().join("doc_index.json")
    }

    #[must_use]
    pub fn claim_index_path(&self) -> Utf8PathBuf {
        self.registry_dir().join("claim_index.json")
    }

    #[must_use]
    pub fn truth_dir(&self, file_md5: &str) -> Utf8PathBuf {
        self.registry_dir().join("truth").join(file_md5)
    }

    // -- config, logs, bundles ----------------------------------------------

    #[must_use]
    pub fn config_dir(&self) -> Utf8PathBuf {
        self.root.join("config")
    }

    #[must_use]
    pub fn prompts_dir(&self) -> Utf8PathBuf {
        self.config_dir().join("prompts")
    }

    #[must_use]
    pub fn config_history_path(&self) -> Utf8PathBuf {
        self.config_dir().join("prompt_configs_history.jsonl")
    }

    #[must_use]
    pub fn logs_dir(&self) -> Utf8PathBuf {
        self.root.join("logs")
    }

    #[must_use]
    pub fn decisions_log_path(&self) -> Utf8PathBuf {
        self.logs_dir().join("decisions.jsonl")
    }

    #[must_use]
    pub fn llm_calls_log_path(&self) -> Utf8PathBuf {
        self.logs_dir().join("llm_calls.jsonl")
    }

    #[must_use]
    pub fn compliance_errors_log_path(&self) -> Utf8PathBuf {
        self.logs_dir().join("compliance_errors.log")
    }

    #[must_use]
    pub fn version_bundles_dir(&self) -> Utf8PathBuf {
        self.root.join("version_bundles")
    }

    /// Create the top-level directory skeleton.
    pub fn ensure_layout(&self) -> std::io::Result<()> {
        for dir in [
            self.claims_dir(),
            self.runs_dir(),
            self.registry_dir(),
            self.config_dir(),
            self.logs_dir(),
            self.version_bundles_dir(),
        ] {
            std::fs::create_dir_all(dir.as_std_path())?;
        }
        Ok(())
    }
}
