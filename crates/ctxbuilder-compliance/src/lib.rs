//! Compliance core: the tamper-evident side of the pipeline.
//!
//! An append-only decision ledger with a SHA-256 hash chain, a full-fidelity
//! LLM call audit log, an envelope-encrypted storage backend, and immutable
//! per-run version bundles. Ledger files are process-wide singletons per
//! workspace; appends are serialized in-process and OS-locked across
//! processes.
//!
//! Nothing in this crate raises into the pipeline: orchestration treats sink
//! failures as a side-log event and withholds run commitment when the ledger
//! cannot be flushed.

mod bundle;
mod chain;
mod crypto;
mod error;
mod records;
mod storage;

pub use bundle::{BundleInputs, BundleStore};
pub use chain::{compute_record_hash, verify_chain, LedgerVerifyReport};
pub use crypto::generate_key_file;
pub use error::ComplianceError;
pub use records::{
    ActorType, DecisionContext, DecisionRecord, DecisionType, LlmCallRecord, NewDecision,
    Rationale, RecordedMessage, RecordedTokenUsage, ResponseOutcome, VersionBundle,
    DECISION_SCHEMA_VERSION, GENESIS_HASH,
};
pub use storage::{DecisionFilter, DecisionLedger, DecisionStorage, LlmCallLog, LlmCallStorage};
