//! Ground-truth registry.
//!
//! Truth is keyed by `(file_md5, field_name)`, run-agnostic, and only ever
//! used for comparison. The state machine per field:
//!
//! ```text
//! UNLABELED → LABELED (truth_value required)
//! UNLABELED → UNVERIFIABLE (reason required)
//! LABELED   → LABELED/UNVERIFIABLE only with explicit confirmation
//! ```
//!
//! Every accepted change appends a full-snapshot history line under
//! `registry/truth/<file_md5>/`.

use chrono::{DateTime, Utc};
use ctxbuilder_workspace::{
    HistoryError, LabelState, Snapshot, UnverifiableReason, VersionedStore, WorkspacePaths,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Truth for one field of one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldTruth {
    pub field_name: String,
    pub state: LabelState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truth_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unverifiable_reason: Option<UnverifiableReason>,
    pub updated_at: DateTime<Utc>,
}

/// All recorded truth for one document (keyed by source-file md5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruthRecord {
    pub file_md5: String,
    #[serde(default = "default_true")]
    pub doc_type_correct: bool,
    #[serde(default)]
    pub fields: Vec<FieldTruth>,
}

fn default_true() -> bool {
    true
}

impl TruthRecord {
    #[must_use]
    pub fn new(file_md5: impl Into<String>) -> Self {
        Self {
            file_md5: file_md5.into(),
            doc_type_correct: true,
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldTruth> {
        self.fields.iter().find(|f| f.field_name == name)
    }

    /// Fields currently in `LABELED` state.
    pub fn labeled_fields(&self) -> impl Iterator<Item = &FieldTruth> {
        self.fields
            .iter()
            .filter(|f| f.state == LabelState::Labeled)
    }
}

/// A requested truth change for one field.
#[derive(Debug, Clone)]
pub struct TruthUpdate {
    pub field_name: String,
    pub state: LabelState,
    pub truth_value: Option<String>,
    pub unverifiable_reason: Option<UnverifiableReason>,
}

impl TruthUpdate {
    #[must_use]
    pub fn labeled(field_name: impl Into<String>, truth_value: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            state: LabelState::Labeled,
            truth_value: Some(truth_value.into()),
            unverifiable_reason: None,
        }
    }

    #[must_use]
    pub fn unverifiable(field_name: impl Into<String>, reason: UnverifiableReason) -> Self {
        Self {
            field_name: field_name.into(),
            state: LabelState::Unverifiable,
            truth_value: None,
            unverifiable_reason: Some(reason),
        }
    }
}

#[derive(Debug, Error)]
pub enum TruthError {
    #[error("field '{field}': LABELED requires a truth_value")]
    LabeledWithoutTruth { field: String },

    #[error("field '{field}': UNVERIFIABLE requires an unverifiable_reason")]
    UnverifiableWithoutReason { field: String },

    #[error("field '{field}' is already LABELED; pass confirm to overwrite")]
    RequiresConfirmation { field: String },

    #[error("cannot return field '{field}' to UNLABELED; truth history is append-only")]
    CannotUnlabel { field: String },

    #[error(transparent)]
    History(#[from] HistoryError),
}

/// The registry over one workspace.
pub struct TruthRegistry {
    paths: WorkspacePaths,
}

impl TruthRegistry {
    #[must_use]
    pub fn new(paths: WorkspacePaths) -> Self {
        Self { paths }
    }

    fn store(&self, file_md5: &str) -> VersionedStore {
        VersionedStore::new(self.paths.truth_dir(file_md5))
    }

    /// Current truth for a document, if any has been recorded.
    pub fn latest(&self, file_md5: &str) -> Result<Option<TruthRecord>, TruthError> {
        Ok(self.store(file_md5).load_latest()?)
    }

    /// Full recorded history for a document, oldest first.
    pub fn history(&self, file_md5: &str) -> Result<Vec<Snapshot<TruthRecord>>, TruthError> {
        Ok(self.store(file_md5).history()?)
    }

    /// Apply one field update. Editing an existing `LABELED` entry requires
    /// `confirm`; every accepted change appends a new history line.
    pub fn set_field(
        &self,
        file_md5: &str,
        update: TruthUpdate,
        confirm: bool,
    ) -> Result<TruthRecord, TruthError> {
        match update.state {
            LabelState::Labeled if update.truth_value.is_none() => {
                return Err(TruthError::LabeledWithoutTruth {
                    field: update.field_name,
                });
            }
            LabelState::Unverifiable if update.unverifiable_reason.is_none() => {
                return Err(TruthError::UnverifiableWithoutReason {
                    field: update.field_name,
                });
            }
            LabelState::Unlabeled => {
                return Err(TruthError::CannotUnlabel {
                    field: update.field_name,
                });
            }
            _ => {}
        }

        let mut record = self
            .latest(file_md5)?
            .unwrap_or_else(|| TruthRecord::new(file_md5));

        let existing = record
            .fields
            .iter_mut()
            .find(|f| f.field_name == update.field_name);

        match existing {
            Some(field) => {
                if field.state == LabelState::Labeled && !confirm {
                    return Err(TruthError::RequiresConfirmation {
                        field: update.field_name,
                    });
                }
                field.state = update.state;
                field.truth_value = update.truth_value;
                field.unverifiable_reason = update.unverifiable_reason;
                field.updated_at = Utc::now();
            }
            None => record.fields.push(FieldTruth {
                field_name: update.field_name.clone(),
                state: update.state,
                truth_value: update.truth_value,
                unverifiable_reason: update.unverifiable_reason,
                updated_at: Utc::now(),
            }),
        }

        self.store(file_md5).save(&record)?;
        debug!(file_md5, "truth updated");
        Ok(record)
    }

    /// Record the reviewer's doc-type verdict.
    pub fn set_doc_type_correct(
        &self,
        file_md5: &str,
        correct: bool,
    ) -> Result<TruthRecord, TruthError> {
        let mut record = self
            .latest(file_md5)?
            .unwrap_or_else(|| TruthRecord::new(file_md5));
        record.doc_type_correct = correct;
        self.store(file_md5).save(&record)?;
        Ok(record)
    }
}
