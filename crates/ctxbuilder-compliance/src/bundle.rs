//! Version bundles.
//!
//! One immutable bundle per run, created at run start. The bundle records
//! code/model/spec/prompt state and keeps copies of the prompt templates
//! and extraction specs used, so a historical run can be interpreted after
//! the live config has moved on.

use crate::error::ComplianceError;
use crate::records::VersionBundle;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use ctxbuilder_utils::atomic_write::write_json_atomic;
use std::process::Command;
use tracing::debug;
use uuid::Uuid;

/// Bundle store rooted at a workspace's `version_bundles/` directory.
#[derive(Debug, Clone)]
pub struct BundleStore {
    root: Utf8PathBuf,
}

/// Inputs pinned into a new bundle.
#[derive(Debug, Clone)]
pub struct BundleInputs {
    pub run_id: String,
    pub extractor_version: String,
    pub model_name: String,
    pub prompt_template_hash: String,
    pub extraction_spec_hash: String,
    /// Files copied into the bundle (prompt templates, spec YAMLs).
    pub snapshot_files: Vec<Utf8PathBuf>,
}

impl BundleStore {
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn bundle_dir(&self, run_id: &str) -> Utf8PathBuf {
        self.root.join(run_id)
    }

    fn bundle_path(&self, run_id: &str) -> Utf8PathBuf {
        self.bundle_dir(run_id).join("bundle.json")
    }

    /// Create the bundle for a run. Refuses to overwrite an existing one;
    /// bundles are immutable.
    pub fn create(&self, inputs: &BundleInputs) -> Result<VersionBundle, ComplianceError> {
        let path = self.bundle_path(&inputs.run_id);
        if path.exists() {
            return Err(ComplianceError::BundleExists {
                run_id: inputs.run_id.clone(),
            });
        }

        let (git_commit, git_dirty) = detect_git_state();

        let bundle = VersionBundle {
            bundle_id: Uuid::new_v4().to_string(),
            run_id: inputs.run_id.clone(),
            git_commit,
            git_dirty,
            extractor_version: inputs.extractor_version.clone(),
            model_name: inputs.model_name.clone(),
            prompt_template_hash: inputs.prompt_template_hash.clone(),
            extraction_spec_hash: inputs.extraction_spec_hash.clone(),
            created_at: Utc::now(),
        };

        write_json_atomic(&path, &bundle)
            .map_err(|e| ComplianceError::Io(std::io::Error::other(e.to_string())))?;

        // Snapshot the config files the run depends on.
        let snapshot_dir = self.bundle_dir(&inputs.run_id).join("snapshot");
        for source in &inputs.snapshot_files {
            if let Some(name) = source.file_name() {
                std::fs::create_dir_all(snapshot_dir.as_std_path())?;
                std::fs::copy(source.as_std_path(), snapshot_dir.join(name).as_std_path())?;
            }
        }

        debug!(run_id = %inputs.run_id, bundle_id = %bundle.bundle_id, "version bundle created");
        Ok(bundle)
    }

    /// Load the bundle for a run.
    pub fn load(&self, run_id: &str) -> Result<VersionBundle, ComplianceError> {
        let path = self.bundle_path(run_id);
        let content = std::fs::read_to_string(path.as_std_path()).map_err(|_| {
            ComplianceError::BundleNotFound {
                run_id: run_id.to_string(),
            }
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// All bundles, sorted by run id.
    pub fn list(&self) -> Result<Vec<VersionBundle>, ComplianceError> {
        let mut bundles = Vec::new();
        let Ok(entries) = std::fs::read_dir(self.root.as_std_path()) else {
            return Ok(bundles);
        };
        for entry in entries.flatten() {
            let Some(run_id) = entry.file_name().to_str().map(String::from) else {
                continue;
            };
            if let Ok(bundle) = self.load(&run_id) {
                bundles.push(bundle);
            }
        }
        bundles.sort_by(|a, b| a.run_id.cmp(&b.run_id));
        Ok(bundles)
    }
}

/// Best-effort git state detection; a workspace outside a repository gets
/// `(None, false)`.
fn detect_git_state() -> (Option<String>, bool) {
    let commit = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .filter(|s| !s.is_empty());

    let dirty = commit.is_some()
        && Command::new("git")
            .args(["status", "--porcelain"])
            .output()
            .ok()
            .filter(|o| o.status.success())
            .map(|o| !o.stdout.is_empty())
            .unwrap_or(false);

    (commit, dirty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> BundleStore {
        BundleStore::new(
            Utf8PathBuf::from_path_buf(dir.path().join("version_bundles")).unwrap(),
        )
    }

    fn inputs(run_id: &str) -> BundleInputs {
        BundleInputs {
            run_id: run_id.to_string(),
            extractor_version: "0.9.0".to_string(),
            model_name: "gpt-4o-mini".to_string(),
            prompt_template_hash: "abc".to_string(),
            extraction_spec_hash: "def".to_string(),
            snapshot_files: Vec::new(),
        }
    }

    #[test]
    fn create_and_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let created = store.create(&inputs("20240101T000000Z_abc")).unwrap();
        let loaded = store.load("20240101T000000Z_abc").unwrap();
        assert_eq!(created.bundle_id, loaded.bundle_id);
        assert_eq!(loaded.model_name, "gpt-4o-mini");
    }

    #[test]
    fn bundles_are_immutable() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.create(&inputs("20240101T000000Z_abc")).unwrap();
        assert!(matches!(
            store.create(&inputs("20240101T000000Z_abc")),
            Err(ComplianceError::BundleExists { .. })
        ));
    }

    #[test]
    fn snapshot_files_are_copied() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let spec_path = Utf8PathBuf::from_path_buf(dir.path().join("loss_notice.yaml")).unwrap();
        std::fs::write(spec_path.as_std_path(), "doc_type: loss_notice").unwrap();

        let mut inp = inputs("20240101T000000Z_xyz");
        inp.snapshot_files = vec![spec_path];
        store.create(&inp).unwrap();

        let copied = dir
            .path()
            .join("version_bundles/20240101T000000Z_xyz/snapshot/loss_notice.yaml");
        assert!(copied.exists());
    }

    #[test]
    fn list_sorts_by_run_id() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.create(&inputs("20240201T000000Z_b")).unwrap();
        store.create(&inputs("20240101T000000Z_a")).unwrap();

        let bundles = store.list().unwrap();
        assert_eq!(bundles.len(), 2);
        assert!(bundles[0].run_id < bundles[1].run_id);
    }

    #[test]
    fn missing_bundle_is_not_found() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            store(&dir).load("20240101T000000Z_nope"),
            Err(ComplianceError::BundleNotFound { .. })
        ));
    }
}
