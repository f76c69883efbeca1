//! Shared foundations for the ctxbuilder pipeline.
//!
//! This crate holds the pieces every other subsystem leans on:
//! - the stable error-code taxonomy and CLI exit codes
//! - atomic file writes (temp + fsync + rename) and `.complete` markers
//! - canonical JSON (RFC 8785) and the md5/sha256 helpers used for
//!   `doc_id`, `text_md5`, spec hashes, and the decision-ledger chain
//! - run identifier generation

pub mod atomic_write;
pub mod canonical;
pub mod error;
pub mod exit_codes;
pub mod ids;
pub mod json_text;

pub use error::ErrorCode;
pub use exit_codes::ExitCode;
