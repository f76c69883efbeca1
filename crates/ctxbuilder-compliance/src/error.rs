//! Compliance subsystem errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ComplianceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("canonicalization failed: {0}")]
    Canonicalization(String),

    #[error("encryption failure: {0}")]
    Crypto(String),

    #[error("compliance key unusable: {0}")]
    KeyLoad(String),

    #[error("ledger lock failed: {0}")]
    Lock(String),

    #[error("version bundle for run '{run_id}' already exists")]
    BundleExists { run_id: String },

    #[error("version bundle for run '{run_id}' not found")]
    BundleNotFound { run_id: String },
}
