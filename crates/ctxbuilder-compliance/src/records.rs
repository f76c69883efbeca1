//! Compliance record types.
//!
//! Decisions reference LLM calls by `call_id`; calls never back-reference
//! decisions. Runs are referenced by id through the version bundle. The
//! reference graph is a DAG of ids, never embedded records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Schema version for decision records.
pub const DECISION_SCHEMA_VERSION: &str = "decision_record_v1";

/// Sentinel `previous_hash` of the first record in a ledger.
pub const GENESIS_HASH: &str = "GENESIS";

/// What kind of materially relevant decision is being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    Classification,
    Extraction,
    QualityGate,
    HumanReview,
    Override,
}

/// Who made the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    System,
    Human,
}

/// Why the decision was made.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Rationale {
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub evidence_refs: Vec<String>,
}

/// One ledger entry. `record_hash` covers the canonical JSON of the record
/// with both hash fields removed; `previous_hash` links to the prior entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub schema_version: String,
    pub decision_id: Uuid,
    pub decision_type: DecisionType,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
    pub actor_type: ActorType,
    pub actor_id: String,
    pub rationale: Rationale,
    /// Free-shape outcome payload (classification result, gate verdict...).
    pub outcome: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_bundle_id: Option<String>,
    /// LLM call that informed this decision, when one did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pii_refs: Option<Vec<String>>,
    pub record_hash: String,
    pub previous_hash: String,
}

/// A decision before it enters the ledger; the storage layer assigns the
/// hash chain fields.
#[derive(Debug, Clone)]
pub struct NewDecision {
    pub decision_type: DecisionType,
    pub claim_id: Option<String>,
    pub doc_id: Option<String>,
    pub actor_type: ActorType,
    pub actor_id: String,
    pub rationale: Rationale,
    pub outcome: serde_json::Value,
    pub version_bundle_id: Option<String>,
    pub call_id: Option<Uuid>,
    pub pii_refs: Option<Vec<String>>,
}

impl NewDecision {
    /// System decision with the given type and outcome payload.
    #[must_use]
    pub fn system(decision_type: DecisionType, outcome: serde_json::Value) -> Self {
        Self {
            decision_type,
            claim_id: None,
            doc_id: None,
            actor_type: ActorType::System,
            actor_id: "pipeline".to_string(),
            rationale: Rationale::default(),
            outcome,
            version_bundle_id: None,
            call_id: None,
            pii_refs: None,
        }
    }

    #[must_use]
    pub fn with_doc(mut self, claim_id: impl Into<String>, doc_id: impl Into<String>) -> Self {
        self.claim_id = Some(claim_id.into());
        self.doc_id = Some(doc_id.into());
        self
    }

    #[must_use]
    pub fn with_rationale(mut self, summary: impl Into<String>, confidence: Option<f64>) -> Self {
        self.rationale.summary = summary.into();
        self.rationale.confidence = confidence;
        self
    }

    #[must_use]
    pub fn with_call(mut self, call_id: Uuid) -> Self {
        self.call_id = Some(call_id);
        self
    }

    #[must_use]
    pub fn with_bundle(mut self, bundle_id: impl Into<String>) -> Self {
        self.version_bundle_id = Some(bundle_id.into());
        self
    }
}

/// Full audit record of one LLM attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmCallRecord {
    pub call_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub parameters: BTreeMap<String, serde_json::Value>,
    pub messages: Vec<RecordedMessage>,
    /// Raw response text, or the error display for failed attempts.
    pub response: ResponseOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<RecordedTokenUsage>,
    pub latency_ms: u64,
    pub decision_context: DecisionContext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseOutcome {
    Text(String),
    Error(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RecordedTokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_id: Option<String>,
    pub purpose: String,
}

/// Immutable snapshot of the code/model/spec/prompt state behind a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionBundle {
    pub bundle_id: String,
    pub run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_commit: Option<String>,
    pub git_dirty: bool,
    pub extractor_version: String,
    pub model_name: String,
    pub prompt_template_hash: String,
    pub extraction_spec_hash: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_types_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&DecisionType::QualityGate).unwrap(),
            "\"quality_gate\""
        );
        assert_eq!(
            serde_json::to_string(&ActorType::System).unwrap(),
            "\"system\""
        );
    }

    #[test]
    fn new_decision_builder() {
        let d = NewDecision::system(DecisionType::Classification, serde_json::json!({"x": 1}))
            .with_doc("claim-1", "doc-1")
            .with_rationale("routed by content", Some(0.9))
            .with_bundle("bundle-1");
        assert_eq!(d.claim_id.as_deref(), Some("claim-1"));
        assert_eq!(d.rationale.confidence, Some(0.9));
        assert_eq!(d.version_bundle_id.as_deref(), Some("bundle-1"));
    }
}
