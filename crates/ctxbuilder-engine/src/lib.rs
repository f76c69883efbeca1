//! Pipeline orchestrator.
//!
//! Sequences ingestion → classification → extraction → quality gate per
//! document, with per-document isolation, reuse detection, bounded
//! concurrency, phase metrics, and compliance observation. The CLI is a
//! thin façade over [`PipelineOrchestrator`].

mod config;
mod doc_pipeline;
mod orchestrator;
mod phase_metrics;
mod sinks;

pub use config::{PipelineConfig, Stage};
pub use doc_pipeline::DiscoveredDoc;
pub use orchestrator::{load_catalog, PipelineError, PipelineOrchestrator, RunInputs, RunReport};
pub use phase_metrics::{
    ClassificationPhase, ExtractionPhase, IngestionPhase, PhaseMetrics, QualityGatePhase,
};
pub use sinks::{AuditSink, ComplianceSinks};
