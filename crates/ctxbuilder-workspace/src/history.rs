//! Append-only versioned stores.
//!
//! Labels, truth, and config histories all share one mechanic: a
//! `latest.json` that is atomically rewritten, plus a `history.jsonl` where
//! every line is a full snapshot wrapped with `_version_metadata`. History
//! lines are never rewritten or deleted.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use ctxbuilder_utils::atomic_write::{append_jsonl_line, write_json_atomic};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("write failed: {0}")]
    Write(#[from] anyhow::Error),
}

/// Metadata wrapped around every history snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionMetadata {
    pub saved_at: DateTime<Utc>,
    pub version_number: u64,
}

/// One history line: the full snapshot plus its version metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot<T> {
    #[serde(flatten)]
    pub value: T,
    pub _version_metadata: VersionMetadata,
}

/// A `latest.json` + `history.jsonl` pair under one directory.
#[derive(Debug, Clone)]
pub struct VersionedStore {
    dir: Utf8PathBuf,
}

impl VersionedStore {
    #[must_use]
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn latest_path(&self) -> Utf8PathBuf {
        self.dir.join("latest.json")
    }

    #[must_use]
    pub fn history_path(&self) -> Utf8PathBuf {
        self.dir.join("history.jsonl")
    }

    /// Persist a new version: append the snapshot line first, then swap
    /// `latest.json`. A crash between the two leaves history ahead of
    /// latest, which a rebuild reconciles; the reverse would lose history.
    pub fn save<T: Serialize + DeserializeOwned + Clone>(
        &self,
        value: &T,
    ) -> Result<VersionMetadata, HistoryError> {
        let version_number = self.next_version_number()?;
        let metadata = VersionMetadata {
            saved_at: Utc::now(),
            version_number,
        };

        let snapshot = Snapshot {
            value: value.clone(),
            _version_metadata: metadata.clone(),
        };
        append_jsonl_line(&self.history_path(), &snapshot)?;
        write_json_atomic(&self.latest_path(), value)?;

        Ok(metadata)
    }

    /// Load the current version, if any.
    pub fn load_latest<T: DeserializeOwned>(&self) -> Result<Option<T>, HistoryError> {
        match std::fs::read_to_string(self.latest_path().as_std_path()) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Every recorded version, oldest first.
    pub fn history<T: DeserializeOwned>(&self) -> Result<Vec<Snapshot<T>>, HistoryError> {
        let content = match std::fs::read_to_string(self.history_path().as_std_path()) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut snapshots = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            snapshots.push(serde_json::from_str(line)?);
        }
        Ok(snapshots)
    }

    fn next_version_number(&self) -> Result<u64, HistoryError> {
        let content = match std::fs::read_to_string(self.history_path().as_std_path()) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(1),
            Err(e) => return Err(e.into()),
        };
        Ok(content.lines().filter(|l| !l.trim().is_empty()).count() as u64 + 1)
    }
}

/// Append a config snapshot to a standalone history file (no `latest.json`;
/// the live config is the source tree's YAML).
pub fn append_config_snapshot<T: Serialize>(
    history_path: &Utf8Path,
    value: &T,
    version_number: u64,
) -> Result<(), HistoryError> {
    #[derive(Serialize)]
    struct ConfigLine<'a, T: Serialize> {
        #[serde(flatten)]
        value: &'a T,
        _version_metadata: VersionMetadata,
    }

    append_jsonl_line(
        history_path,
        &ConfigLine {
            value,
            _version_metadata: VersionMetadata {
                saved_at: Utc::now(),
                version_number,
            },
        },
    )?;
    Ok(())
}
