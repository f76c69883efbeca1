//! Run folders and their artifacts.
//!
//! A run folder is committed by its `.complete` sentinel; readers treat
//! anything without the sentinel as in-progress or abandoned and skip it.
//! Overwriting an existing run folder requires `force`.

use crate::paths::WorkspacePaths;
use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use ctxbuilder_utils::atomic_write::{
    is_committed, publish_complete_marker, write_json_atomic, COMPLETE_MARKER,
};
use ctxbuilder_utils::ErrorCode;
use serde::{Deserialize, Serialize};
use std::io::Write;
use thiserror::Error;
use tracing::info;

/// Schema version for run summaries.
pub const SUMMARY_SCHEMA_VERSION: &str = "run_summary_v1";

#[derive(Debug, Error)]
pub enum RunStoreError {
    #[error("run folder '{run_id}' already exists; pass --force to overwrite")]
    RunExists { run_id: String },

    #[error("run '{run_id}' not found")]
    RunNotFound { run_id: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("write failed: {0}")]
    Write(#[from] anyhow::Error),
}

/// Reference from a global run to one claim's run folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRunRef {
    pub claim_id: String,
    pub claim_run_id: String,
}

/// Global run manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub claims: Vec<String>,
    /// Per-claim run folders owned by this global run.
    pub claim_runs: Vec<ClaimRunRef>,
    pub classifier_model: String,
    pub extractor_model: String,
    pub stages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_bundle_id: Option<String>,
}

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Partial,
    Cancelled,
    Failed,
}

/// Terminal state of one document within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocState {
    Done,
    Failed,
}

/// Stage timings for one document.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DocTimings {
    pub ingestion_ms: u64,
    pub classification_ms: u64,
    pub extraction_ms: u64,
    pub total_ms: u64,
}

/// Per-document outcome recorded in the summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocOutcome {
    pub doc_id: String,
    pub claim_id: String,
    /// Display only; never used as an identifier.
    pub filename: String,
    pub state: DocState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate_status: Option<String>,
    pub reused_text: bool,
    pub reused_classification: bool,
    pub timings: DocTimings,
}

/// The run summary artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub schema_version: String,
    pub run_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub docs: Vec<DocOutcome>,
}

/// One row in `runs list`.
#[derive(Debug, Clone, Serialize)]
pub struct RunListEntry {
    pub run_id: String,
    pub committed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<RunStatus>,
}

/// Run-folder lifecycle over one workspace.
#[derive(Debug, Clone)]
pub struct RunStore {
    paths: WorkspacePaths,
}

impl RunStore {
    #[must_use]
    pub fn new(paths: WorkspacePaths) -> Self {
        Self { paths }
    }

    /// Create a global run folder. Fails if it exists, unless `force`.
    pub fn create_run_dir(&self, run_id: &str, force: bool) -> Result<Utf8PathBuf, RunStoreError> {
        let dir = self.paths.run_dir(run_id);
        if dir.exists() {
            if !force {
                return Err(RunStoreError::RunExists {
                    run_id: run_id.to_string(),
                });
            }
            std::fs::remove_dir_all(dir.as_std_path())?;
            info!(run_id, "existing run folder removed (--force)");
        }
        std::fs::create_dir_all(dir.join("logs").as_std_path())?;
        Ok(dir)
    }

    pub fn write_manifest(&self, manifest: &RunManifest) -> Result<(), RunStoreError> {
        let path = self.paths.run_dir(&manifest.run_id).join("manifest.json");
        write_json_atomic(&path, manifest)?;
        Ok(())
    }

    pub fn write_summary(&self, summary: &RunSummary) -> Result<(), RunStoreError> {
        let path = self.paths.run_dir(&summary.run_id).join("summary.json");
        write_json_atomic(&path, summary)?;
        Ok(())
    }

    pub fn write_metrics(
        &self,
        run_id: &str,
        metrics: &serde_json::Value,
    ) -> Result<(), RunStoreError> {
        let path = self.paths.run_dir(run_id).join("metrics.json");
        write_json_atomic(&path, metrics)?;
        Ok(())
    }

    /// Append a line to the run's plain-text log.
    pub fn append_log(&self, run_id: &str, line: &str) -> Result<(), RunStoreError> {
        let path = self.paths.run_dir(run_id).join("logs/run.log");
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent.as_std_path())?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_std_path())?;
        writeln!(file, "{} {line}", Utc::now().to_rfc3339())?;
        Ok(())
    }

    /// Publish the `.complete` sentinel for a finished run.
    pub fn commit(&self, run_id: &str) -> Result<(), RunStoreError> {
        publish_complete_marker(&self.paths.run_dir(run_id))?;
        Ok(())
    }

    #[must_use]
    pub fn is_committed(&self, run_id: &str) -> bool {
        is_committed(&self.paths.run_dir(run_id))
    }

    pub fn load_manifest(&self, run_id: &str) -> Result<RunManifest, RunStoreError> {
        self.load_json(run_id, "manifest.json")
    }

    pub fn load_summary(&self, run_id: &str) -> Result<RunSummary, RunStoreError> {
        self.load_json(run_id, "summary.json")
    }

    pub fn load_metrics(&self, run_id: &str) -> Result<serde_json::Value, RunStoreError> {
        self.load_json(run_id, "metrics.json")
    }

    fn load_json<T: serde::de::DeserializeOwned>(
        &self,
        run_id: &str,
        file: &str,
    ) -> Result<T, RunStoreError> {
        let path = self.paths.run_dir(run_id).join(file);
        let content =
            std::fs::read_to_string(path.as_std_path()).map_err(|_| RunStoreError::RunNotFound {
                run_id: run_id.to_string(),
            })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// All run folders, newest last. Uncommitted runs are flagged so
    /// callers can skip them.
    pub fn list_runs(&self) -> Result<Vec<RunListEntry>, RunStoreError> {
        let mut entries = Vec::new();
        let runs_dir = self.paths.runs_dir();
        let Ok(read) = std::fs::read_dir(runs_dir.as_std_path()) else {
            return Ok(entries);
        };
        for entry in read.flatten() {
            let Some(run_id) = entry.file_name().to_str().map(String::from) else {
                continue;
            };
            if run_id == COMPLETE_MARKER || !entry.path().is_dir() {
                continue;
            }
            let committed = self.is_committed(&run_id);
            let status = if committed {
                self.load_summary(&run_id).ok().map(|s| s.status)
            } else {
                None
            };
            entries.push(RunListEntry {
                run_id,
                committed,
                status,
            });
        }
        entries.sort_by(|a, b| a.run_id.cmp(&b.run_id));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> RunStore {
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        RunStore::new(WorkspacePaths::new(root))
    }

    fn summary(run_id: &str, status: RunStatus) -> RunSummary {
        RunSummary {
            schema_version: SUMMARY_SCHEMA_VERSION.to_string(),
            run_id: run_id.to_string(),
            status,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            docs: Vec::new(),
        }
    }

    #[test]
    fn create_requires_force_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.create_run_dir("20240101T000000Z_a", false).unwrap();
        assert!(matches!(
            store.create_run_dir("20240101T000000Z_a", false),
            Err(RunStoreError::RunExists { .. })
        ));
        store.create_run_dir("20240101T000000Z_a", true).unwrap();
    }

    #[test]
    fn commit_flow_and_listing() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.create_run_dir("20240101T000000Z_a", false).unwrap();
        store
            .write_summary(&summary("20240101T000000Z_a", RunStatus::Completed))
            .unwrap();
        store
            .write_metrics("20240101T000000Z_a", &serde_json::json!({"phases": {}}))
            .unwrap();
        store.commit("20240101T000000Z_a").unwrap();

        store.create_run_dir("20240102T000000Z_b", false).unwrap();

        let runs = store.list_runs().unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs[0].committed);
        assert_eq!(runs[0].status, Some(RunStatus::Completed));
        assert!(!runs[1].committed);
        assert_eq!(runs[1].status, None);
    }

    #[test]
    fn summary_round_trips_with_doc_outcomes() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.create_run_dir("20240101T000000Z_a", false).unwrap();

        let mut s = summary("20240101T000000Z_a", RunStatus::Partial);
        s.docs.push(DocOutcome {
            doc_id: "d1".into(),
            claim_id: "c1".into(),
            filename: "scan.pdf".into(),
            state: DocState::Failed,
            failed_phase: Some("extraction".into()),
            error_code: Some(ErrorCode::ExtractSchemaInvalid),
            doc_type: Some("loss_notice".into()),
            gate_status: None,
            reused_text: true,
            reused_classification: false,
            timings: DocTimings::default(),
        });
        store.write_summary(&s).unwrap();

        let loaded = store.load_summary("20240101T000000Z_a").unwrap();
        assert_eq!(loaded.status, RunStatus::Partial);
        assert_eq!(loaded.docs.len(), 1);
        assert_eq!(loaded.docs[0].error_code, Some(ErrorCode::ExtractSchemaInvalid));
        assert!(loaded.docs[0].reused_text);
    }

    #[test]
    fn run_log_appends_lines() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.create_run_dir("20240101T000000Z_a", false).unwrap();
        store.append_log("20240101T000000Z_a", "doc d1 ingested").unwrap();
        store.append_log("20240101T000000Z_a", "doc d1 classified").unwrap();

        let content = std::fs::read_to_string(
            dir.path().join("runs/20240101T000000Z_a/logs/run.log"),
        )
        .unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
