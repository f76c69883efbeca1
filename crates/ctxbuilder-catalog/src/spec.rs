//! Per-doc-type extraction specs.

use crate::normalize::{NORMALIZER_NAMES, VALIDATOR_NAMES};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// Rules for a single field in a spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldRule {
    /// Normalizer name; see [`crate::normalize::NORMALIZER_NAMES`].
    pub normalize: String,
    /// Validator name; see [`crate::normalize::VALIDATOR_NAMES`].
    pub validate: String,
    /// Literal substrings whose vicinity is likely to contain the value.
    #[serde(default)]
    pub hints: Vec<String>,
    /// Authority rank when the same field appears on several pages; lower
    /// wins (header blocks are rank 0).
    #[serde(default)]
    pub authority_rank: u32,
}

/// Threshold condition used by the quality gate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GateCondition {
    pub min_required_present_ratio: f64,
    pub min_evidence_rate: f64,
}

/// The fail arm is explicit in specs even though it is the catch-all.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FailCondition {
    pub otherwise: bool,
}

/// Quality-gate thresholds. All three arms are mandatory; the loader
/// rejects specs that omit any of them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GateRule {
    pub pass_if: GateCondition,
    pub warn_if: GateCondition,
    pub fail_if: FailCondition,
}

/// One doc type's extraction contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocTypeSpec {
    pub doc_type: String,
    pub version: String,
    pub required_fields: Vec<String>,
    #[serde(default)]
    pub optional_fields: Vec<String>,
    /// `BTreeMap` keeps serialization deterministic for spec hashing.
    pub field_rules: BTreeMap<String, FieldRule>,
    pub quality_gate: GateRule,
}

#[derive(Debug, Error)]
pub enum SpecError {
    #[error("spec '{doc_type}': required_fields must not be empty")]
    EmptyRequiredFields { doc_type: String },

    #[error("spec '{doc_type}': duplicate field name '{field}'")]
    DuplicateField { doc_type: String, field: String },

    #[error("spec '{doc_type}': field '{field}' has no field_rules entry")]
    MissingFieldRule { doc_type: String, field: String },

    #[error("spec '{doc_type}': field '{field}' uses unknown normalizer '{name}'")]
    UnknownNormalizer {
        doc_type: String,
        field: String,
        name: String,
    },

    #[error("spec '{doc_type}': field '{field}' uses unknown validator '{name}'")]
    UnknownValidator {
        doc_type: String,
        field: String,
        name: String,
    },

    #[error("spec '{doc_type}': gate threshold out of range: {detail}")]
    InvalidGate { doc_type: String, detail: String },

    #[error("failed to hash spec '{doc_type}': {reason}")]
    Hash { doc_type: String, reason: String },
}

impl DocTypeSpec {
    /// Every field the spec knows about, required first.
    pub fn all_fields(&self) -> impl Iterator<Item = &String> {
        self.required_fields.iter().chain(self.optional_fields.iter())
    }

    /// Whether `field` is in `required_fields`.
    #[must_use]
    pub fn is_required(&self, field: &str) -> bool {
        self.required_fields.iter().any(|f| f == field)
    }

    /// Deterministic content hash of the spec (JCS + SHA-256).
    pub fn extraction_spec_hash(&self) -> Result<String, SpecError> {
        ctxbuilder_utils::canonical::sha256_canonical_json(self).map_err(|e| SpecError::Hash {
            doc_type: self.doc_type.clone(),
            reason: e.to_string(),
        })
    }

    /// Fail-fast structural validation, run at load time.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.required_fields.is_empty() {
            return Err(SpecError::EmptyRequiredFields {
                doc_type: self.doc_type.clone(),
            });
        }

        let mut seen = HashSet::new();
        for field in self.all_fields() {
            if !seen.insert(field.clone()) {
                return Err(SpecError::DuplicateField {
                    doc_type: self.doc_type.clone(),
                    field: field.clone(),
                });
            }
        }

        for field in self.all_fields() {
            let rule = self.field_rules.get(field).ok_or_else(|| {
                SpecError::MissingFieldRule {
                    doc_type: self.doc_type.clone(),
                    field: field.clone(),
                }
            })?;

            if !NORMALIZER_NAMES.contains(&rule.normalize.as_str()) {
                return Err(SpecError::UnknownNormalizer {
                    doc_type: self.doc_type.clone(),
                    field: field.clone(),
                    name: rule.normalize.clone(),
                });
            }
            if !VALIDATOR_NAMES.contains(&rule.validate.as_str()) {
                return Err(SpecError::UnknownValidator {
                    doc_type: self.doc_type.clone(),
                    field: field.clone(),
                    name: rule.validate.clone(),
                });
            }
        }

        for (label, cond) in [
            ("pass_if", self.quality_gate.pass_if),
            ("warn_if", self.quality_gate.warn_if),
        ] {
            if !(0.0..=1.0).contains(&cond.min_required_present_ratio)
                || !(0.0..=1.0).contains(&cond.min_evidence_rate)
            {
                return Err(SpecError::InvalidGate {
                    doc_type: self.doc_type.clone(),
                    detail: format!("{label} thresholds must be within [0, 1]"),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_spec() -> DocTypeSpec {
        let mut field_rules = BTreeMap::new();
        field_rules.insert(
            "incident_date".to_string(),
            FieldRule {
                normalize: "date_to_iso".to_string(),
                validate: "is_iso_date".to_string(),
                hints: vec!["fecha".to_string(), "date".to_string()],
                authority_rank: 0,
            },
        );
        field_rules.insert(
            "policy_number".to_string(),
            FieldRule {
                normalize: "uppercase_trim".to_string(),
                validate: "non_empty".to_string(),
                hints: vec!["póliza".to_string(), "policy".to_string()],
                authority_rank: 0,
            },
        );

        DocTypeSpec {
            doc_type: "loss_notice".to_string(),
            version: "1".to_string(),
            required_fields: vec!["incident_date".to_string()],
            optional_fields: vec!["policy_number".to_string()],
            field_rules,
            quality_gate: GateRule {
                pass_if: GateCondition {
                    min_required_present_ratio: 1.0,
                    min_evidence_rate: 0.8,
                },
                warn_if: GateCondition {
                    min_required_present_ratio: 1.0,
                    min_evidence_rate: 0.0,
                },
                fail_if: FailCondition { otherwise: true },
            },
        }
    }

    #[test]
    fn valid_spec_passes() {
        sample_spec().validate().unwrap();
    }

    #[test]
    fn empty_required_fields_rejected() {
        let mut spec = sample_spec();
        spec.required_fields.clear();
        assert!(matches!(
            spec.validate().unwrap_err(),
            SpecError::EmptyRequiredFields { .. }
        ));
    }

    #[test]
    fn duplicate_field_rejected() {
        let mut spec = sample_spec();
        spec.optional_fields.push("incident_date".to_string());
        assert!(matches!(
            spec.validate().unwrap_err(),
            SpecError::DuplicateField { .. }
        ));
    }

    #[test]
    fn unknown_normalizer_rejected() {
        let mut spec = sample_spec();
        spec.field_rules.get_mut("incident_date").unwrap().normalize = "mystery".to_string();
        assert!(matches!(
            spec.validate().unwrap_err(),
            SpecError::UnknownNormalizer { .. }
        ));
    }

    #[test]
    fn missing_field_rule_rejected() {
        let mut spec = sample_spec();
        spec.field_rules.remove("policy_number");
        assert!(matches!(
            spec.validate().unwrap_err(),
            SpecError::MissingFieldRule { .. }
        ));
    }

    #[test]
    fn spec_hash_is_deterministic_and_content_sensitive() {
        let spec = sample_spec();
        let h1 = spec.extraction_spec_hash().unwrap();
        let h2 = sample_spec().extraction_spec_hash().unwrap();
        assert_eq!(h1, h2);

        let mut changed = sample_spec();
        changed.version = "2".to_string();
        assert_ne!(h1, changed.extraction_spec_hash().unwrap());
    }

    #[test]
    fn out_of_range_gate_rejected() {
        let mut spec = sample_spec();
        spec.quality_gate.pass_if.min_evidence_rate = 1.5;
        assert!(matches!(
            spec.validate().unwrap_err(),
            SpecError::InvalidGate { .. }
        ));
    }
}
