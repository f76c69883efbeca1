//! The `extraction_result_v1` data model.
//!
//! The whole struct is the on-disk artifact written per document per run,
//! failure or success. Gate reasons are a closed enum so metrics can
//! aggregate them across runs.

use ctxbuilder_utils::ErrorCode;
use serde::{Deserialize, Serialize};

/// Schema version written into every extraction artifact.
pub const EXTRACTION_SCHEMA_VERSION: &str = "extraction_result_v1";

/// Run provenance pinned into the artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub extractor_version: String,
    pub model: String,
    pub prompt_version: String,
    pub input_hashes: InputHashes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputHashes {
    pub pdf_md5: String,
    pub text_md5: String,
}

/// Document identity and routing outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocInfo {
    pub doc_id: String,
    pub claim_id: String,
    pub doc_type: String,
    pub doc_type_confidence: f64,
    pub language: String,
    pub page_count: u32,
}

/// How a provenance span was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvenanceMethod {
    /// Quote bound to text produced by the layout service or a text source.
    DiText,
    /// Quote bound to text produced by OCR or a vision model.
    VisionOcr,
    /// Quote could not be bound; only the model's own citation exists.
    LlmParse,
}

/// One evidence span tying a value to canonical text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub page: u32,
    pub method: ProvenanceMethod,
    pub text_quote: String,
    pub char_start: usize,
    pub char_end: usize,
}

/// Presence of an extracted field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldStatus {
    Present,
    Missing,
}

/// One extracted field with its evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldResult {
    pub name: String,
    pub value: Option<String>,
    pub normalized_value: Option<String>,
    pub confidence: f64,
    pub status: FieldStatus,
    #[serde(default)]
    pub provenance: Vec<Provenance>,
    /// Field-level reasons (`validation_failed`, `ambiguous_value`, ...).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<GateReason>,
}

/// Gate verdict for one document in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    Pass,
    Warn,
    Fail,
}

/// Canonical gate reasons. Serialized snake_case strings are the metrics
/// aggregation keys; do not rename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateReason {
    MissingRequiredFields,
    LowEvidenceRate,
    ProvenanceWeak,
    ValidationFailed,
    AmbiguousValue,
    ExtractionFailed,
}

/// Quality-gate block of the artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityGate {
    pub status: GateStatus,
    #[serde(default)]
    pub reasons: Vec<GateReason>,
    #[serde(default)]
    pub missing_required_fields: Vec<String>,
    pub needs_vision_fallback: bool,
}

impl QualityGate {
    /// Placeholder gate before evaluation; the gate stage replaces it.
    #[must_use]
    pub fn pending() -> Self {
        Self {
            status: GateStatus::Fail,
            reasons: Vec::new(),
            missing_required_fields: Vec::new(),
            needs_vision_fallback: false,
        }
    }
}

/// The full per-doc artifact (`extraction_result_v1`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub schema_version: String,
    pub run: RunInfo,
    pub doc: DocInfo,
    pub fields: Vec<FieldResult>,
    pub quality_gate: QualityGate,
    /// Version bundle this extraction was produced under.
    pub version_bundle_id: Option<String>,
    /// Set when the pipeline failed before or during extraction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
}

impl ExtractionResult {
    /// An artifact for a failed extraction: empty fields, failing gate.
    ///
    /// The orchestrator always writes one of these when the extract stage
    /// dies, so every attempted document leaves an artifact behind.
    #[must_use]
    pub fn failed(run: RunInfo, doc: DocInfo, error_code: ErrorCode) -> Self {
        Self {
            schema_version: EXTRACTION_SCHEMA_VERSION.to_string(),
            run,
            doc,
            fields: Vec::new(),
            quality_gate: QualityGate {
                status: GateStatus::Fail,
                reasons: vec![GateReason::ExtractionFailed],
                missing_required_fields: Vec::new(),
                needs_vision_fallback: false,
            },
            version_bundle_id: None,
            error_code: Some(error_code),
        }
    }

    /// Fields with `status = present`.
    pub fn present_fields(&self) -> impl Iterator<Item = &FieldResult> {
        self.fields
            .iter()
            .filter(|f| f.status == FieldStatus::Present)
    }
}
