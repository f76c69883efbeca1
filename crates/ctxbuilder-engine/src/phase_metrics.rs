//! Per-run phase metrics.
//!
//! Aggregated by the orchestrator as documents finish and written into
//! `metrics.json` under the `phases` key.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestionPhase {
    pub discovered: usize,
    pub ingested: usize,
    /// Reused canonical text from a prior run.
    pub skipped: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassificationPhase {
    pub classified: usize,
    pub low_confidence: usize,
    /// doc_type → count for this run.
    pub distribution: BTreeMap<String, usize>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionPhase {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Docs routed to a type with no extraction spec.
    pub skipped_unsupported: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityGatePhase {
    pub pass: usize,
    pub warn: usize,
    pub fail: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseMetrics {
    pub ingestion: IngestionPhase,
    pub classification: ClassificationPhase,
    pub extraction: ExtractionPhase,
    pub quality_gate: QualityGatePhase,
}

impl PhaseMetrics {
    /// Merge one document's contribution into the run totals.
    pub fn absorb(&mut self, other: &PhaseMetrics) {
        self.ingestion.discovered += other.ingestion.discovered;
        self.ingestion.ingested += other.ingestion.ingested;
        self.ingestion.skipped += other.ingestion.skipped;
        self.ingestion.failed += other.ingestion.failed;
        self.ingestion.duration_ms += other.ingestion.duration_ms;

        self.classification.classified += other.classification.classified;
        self.classification.low_confidence += other.classification.low_confidence;
        self.classification.duration_ms += other.classification.duration_ms;
        for (doc_type, count) in &other.classification.distribution {
            *self
                .classification
                .distribution
                .entry(doc_type.clone())
                .or_default() += count;
        }

        self.extraction.attempted += other.extraction.attempted;
        self.extraction.succeeded += other.extraction.succeeded;
        self.extraction.failed += other.extraction.failed;
        self.extraction.skipped_unsupported += other.extraction.skipped_unsupported;
        self.extraction.duration_ms += other.extraction.duration_ms;

        self.quality_gate.pass += other.quality_gate.pass;
        self.quality_gate.warn += other.quality_gate.warn;
        self.quality_gate.fail += other.quality_gate.fail;
    }
}
