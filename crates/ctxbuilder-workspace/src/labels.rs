//! Reviewer labels (`label_v2`).

use crate::history::{HistoryError, Snapshot, VersionedStore};
use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Schema version for label documents.
pub const LABEL_SCHEMA_VERSION: &str = "label_v2";

/// Truth state of one field label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LabelState {
    Labeled,
    Unlabeled,
    Unverifiable,
}

/// Why a field could not be verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnverifiableReason {
    NotPresentInDoc,
    UnreadableText,
    WrongDocType,
    CannotVerify,
    Other,
}

/// One field's label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldLabel {
    pub field_name: String,
    pub state: LabelState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truth_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unverifiable_reason: Option<UnverifiableReason>,
    pub updated_at: DateTime<Utc>,
}

/// All labels for one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocLabels {
    pub schema_version: String,
    pub doc_id: String,
    /// Reviewer's verdict on the routing; extraction accuracy for docs
    /// marked false is reported separately.
    #[serde(default = "default_true")]
    pub doc_type_correct: bool,
    #[serde(default)]
    pub fields: Vec<FieldLabel>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Error)]
pub enum LabelError {
    #[error("field '{field}': LABELED requires a truth_value")]
    LabeledWithoutTruth { field: String },

    #[error("field '{field}': UNVERIFIABLE requires an unverifiable_reason")]
    UnverifiableWithoutReason { field: String },

    #[error("field '{field}': {state:?} must not carry a truth_value")]
    UnexpectedTruthValue { field: String, state: LabelState },

    #[error(transparent)]
    History(#[from] HistoryError),
}

impl DocLabels {
    #[must_use]
    pub fn new(doc_id: impl Into<String>) -> Self {
        Self {
            schema_version: LABEL_SCHEMA_VERSION.to_string(),
            doc_id: doc_id.into(),
            doc_type_correct: true,
            fields: Vec::new(),
        }
    }

    /// Enforce the `label_v2` state invariants.
    pub fn validate(&self) -> Result<(), LabelError> {
        for field in &self.fields {
            match field.state {
                LabelState::Labeled => {
                    if field.truth_value.is_none() {
                        return Err(LabelError::LabeledWithoutTruth {
                            field: field.field_name.clone(),
                        });
                    }
                }
                LabelState::Unverifiable => {
                    if field.unverifiable_reason.is_none() {
                        return Err(LabelError::UnverifiableWithoutReason {
                            field: field.field_name.clone(),
                        });
                    }
                }
                LabelState::Unlabeled => {
                    if field.truth_value.is_some() {
                        return Err(LabelError::UnexpectedTruthValue {
                            field: field.field_name.clone(),
                            state: field.state,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Look up one field's label.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldLabel> {
        self.fields.iter().find(|f| f.field_name == name)
    }
}

/// Label persistence for one document (latest + append-only history).
#[derive(Debug, Clone)]
pub struct LabelStore {
    store: VersionedStore,
}

impl LabelStore {
    #[must_use]
    pub fn new(labels_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            store: VersionedStore::new(labels_dir),
        }
    }

    /// Validate and persist a new label version.
    pub fn save(&self, labels: &DocLabels) -> Result<(), LabelError> {
        labels.validate()?;
        self.store.save(labels)?;
        Ok(())
    }

    pub fn load_latest(&self) -> Result<Option<DocLabels>, LabelError> {
        Ok(self.store.load_latest()?)
    }

    pub fn history(&self) -> Result<Vec<Snapshot<DocLabels>>, LabelError> {
        Ok(self.store.history()?)
    }

    /// Whether any label has been saved for this document.
    #[must_use]
    pub fn has_labels(&self) -> bool {
        self.store.latest_path().exists()
    }
}
