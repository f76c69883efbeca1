//! Evidence-first field extraction.
//!
//! Two passes per document: a deterministic candidate-span finder over the
//! canonical text, then one structured LLM call (with a single repair
//! attempt) whose cited quotes are bound back to exact page offsets. Every
//! `present` field in the output carries at least one provenance span or an
//! explicit `provenance_weak` mark with capped confidence.

mod engine;
mod finder;
mod parse;
mod types;

pub use engine::{ExtractError, ExtractOutcome, Extractor, ExtractorConfig};
pub use finder::{find_candidates, is_short_document, CandidateScan, CandidateWindow, DEFAULT_WINDOW};
pub use parse::{parse_fields_response, FieldAnswer, FieldsResponse, ParseError};
pub use types::{
    DocInfo, ExtractionResult, FieldResult, FieldStatus, GateReason, GateStatus, InputHashes,
    Provenance, ProvenanceMethod, QualityGate, RunInfo, EXTRACTION_SCHEMA_VERSION,
};
