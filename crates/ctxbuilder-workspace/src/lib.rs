//! Run and workspace storage.
//!
//! One workspace directory owns everything a deployment produces: claims
//! with their documents and labels, global and per-claim run folders,
//! registry indexes, configuration, compliance logs, and version bundles.
//! Histories are append-only; `latest.json` files are atomically rewritten;
//! runs are committed by a `.complete` sentinel.

mod history;
mod index;
mod labels;
mod meta;
mod paths;
mod reset;
mod runs;

pub use history::{append_config_snapshot, HistoryError, Snapshot, VersionMetadata, VersionedStore};
pub use index::{rebuild_indexes, ClaimIndexEntry, DocIndexEntry};
pub use labels::{
    DocLabels, FieldLabel, LabelError, LabelState, LabelStore, UnverifiableReason,
    LABEL_SCHEMA_VERSION,
};
pub use meta::{ClassificationFingerprint, DocMeta};
pub use paths::WorkspacePaths;
pub use reset::{reset_workspace, ResetError, ResetReport};
pub use runs::{
    ClaimRunRef, DocOutcome, DocState, DocTimings, RunListEntry, RunManifest, RunStatus, RunStore,
    RunStoreError, RunSummary, SUMMARY_SCHEMA_VERSION,
};
