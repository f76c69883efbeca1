//! ctxbuilder: a document-processing pipeline for insurance claims.
//!
//! Ingests claim documents, extracts canonical per-page text, classifies
//! each document into a typed taxonomy, extracts typed fields with
//! page/offset provenance, gates quality, and records a tamper-evident
//! audit trail.
//!
//! The subsystems live in their own crates; this root crate re-exports the
//! embedding surface and owns the CLI.

pub mod cli;

pub use ctxbuilder_engine::{
    load_catalog, PipelineConfig, PipelineError, PipelineOrchestrator, RunInputs, RunReport, Stage,
};
pub use ctxbuilder_utils::{ErrorCode, ExitCode};
pub use ctxbuilder_workspace::WorkspacePaths;
