//! Quality gate.
//!
//! A pure function of `(extraction_result_v1, DocTypeSpec)`. Running it
//! twice on the same inputs yields the same status and the same reasons, in
//! the same order. The orchestrator replaces the artifact's pending gate
//! block with this output before writing.

use ctxbuilder_catalog::DocTypeSpec;
use ctxbuilder_extraction::{
    ExtractionResult, FieldStatus, GateReason, GateStatus, QualityGate,
};
use tracing::debug;

/// Evaluate the gate for one extraction result.
#[must_use]
pub fn evaluate(result: &ExtractionResult, spec: &DocTypeSpec) -> QualityGate {
    let required_count = spec.required_fields.len();
    let present_required = result
        .fields
        .iter()
        .filter(|f| f.status == FieldStatus::Present && spec.is_required(&f.name))
        .count();

    let present_total = result
        .fields
        .iter()
        .filter(|f| f.status == FieldStatus::Present)
        .count();
    let present_with_provenance = result
        .fields
        .iter()
        .filter(|f| f.status == FieldStatus::Present && !f.provenance.is_empty())
        .count();

    let required_present_ratio = if required_count == 0 {
        1.0
    } else {
        present_required as f64 / required_count as f64
    };
    let evidence_rate = if present_total == 0 {
        0.0
    } else {
        present_with_provenance as f64 / present_total as f64
    };

    let missing_required_fields: Vec<String> = spec
        .required_fields
        .iter()
        .filter(|name| {
            !result
                .fields
                .iter()
                .any(|f| &f.name == *name && f.status == FieldStatus::Present)
        })
        .cloned()
        .collect();

    let mut reasons = Vec::new();
    if !missing_required_fields.is_empty() {
        reasons.push(GateReason::MissingRequiredFields);
    }

    let gate = &spec.quality_gate;
    let status = if required_present_ratio >= gate.pass_if.min_required_present_ratio
        && evidence_rate >= gate.pass_if.min_evidence_rate
        && present_total > 0
    {
        GateStatus::Pass
    } else if required_present_ratio >= gate.warn_if.min_required_present_ratio
        && evidence_rate >= gate.warn_if.min_evidence_rate
        && present_total > 0
    {
        reasons.push(GateReason::LowEvidenceRate);
        GateStatus::Warn
    } else {
        GateStatus::Fail
    };

    // Field-level reasons bubble up so reviewers see them at the doc level.
    for field in &result.fields {
        for reason in &field.reasons {
            if !reasons.contains(reason) {
                reasons.push(*reason);
            }
        }
    }
    if result.error_code.is_some() && !reasons.contains(&GateReason::ExtractionFailed) {
        reasons.push(GateReason::ExtractionFailed);
    }

    debug!(
        doc_id = %result.doc.doc_id,
        ?status,
        required_present_ratio,
        evidence_rate,
        "quality gate evaluated"
    );

    QualityGate {
        status,
        reasons,
        missing_required_fields,
        needs_vision_fallback: result.quality_gate.needs_vision_fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxbuilder_catalog::{FailCondition, FieldRule, GateCondition, GateRule};
    use ctxbuilder_extraction::{
        DocInfo, FieldResult, InputHashes, Provenance, ProvenanceMethod, RunInfo,
        EXTRACTION_SCHEMA_VERSION,
    };
    use std::collections::BTreeMap;

    fn spec() -> DocTypeSpec {
        let mut field_rules = BTreeMap::new();
        for (name, hints) in [("incident_date", vec!["fecha"]), ("policy_number", vec!["policy"])] {
            field_rules.insert(
                name.to_string(),
                FieldRule {
                    normalize: "trim".to_string(),
                    validate: "non_empty".to_string(),
                    hints: hints.into_iter().map(String::from).collect(),
                    authority_rank: 0,
                },
            );
        }
        DocTypeSpec {
            doc_type: "police_report".to_string(),
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

    fn result_with_fields(fields: Vec<FieldResult>) -> ExtractionResult {
        ExtractionResult {
            schema_version: EXTRACTION_SCHEMA_VERSION.to_string(),
            run: RunInfo {
                run_id: "r".into(),
                extractor_version: "0.9.0".into(),
                model: "m".into(),
                prompt_version: "p1".into(),
                input_hashes: InputHashes {
                    pdf_md5: "a".into(),
                    text_md5: "b".into(),
                },
            },
            doc: DocInfo {
                doc_id: "d".into(),
                claim_id: "c".into(),
                doc_type: "police_report".into(),
                doc_type_confidence: 0.9,
                language: "es".into(),
                page_count: 1,
            },
            fields,
            quality_gate: QualityGate::pending(),
            version_bundle_id: None,
            error_code: None,
        }
    }

    fn present(name: &str, with_provenance: bool) -> FieldResult {
        FieldResult {
            name: name.to_string(),
            value: Some("v".into()),
            normalized_value: Some("v".into()),
            confidence: 0.9,
            status: FieldStatus::Present,
            provenance: if with_provenance {
                vec![Provenance {
                    page: 1,
                    method: ProvenanceMethod::DiText,
                    text_quote: "v".into(),
                    char_start: 0,
                    char_end: 1,
                }]
            } else {
                Vec::new()
            },
            reasons: if with_provenance {
                Vec::new()
            } else {
                vec![GateReason::ProvenanceWeak]
            },
        }
    }

    fn missing(name: &str) -> FieldResult {
        FieldResult {
            name: name.to_string(),
            value: None,
            normalized_value: None,
            confidence: 0.0,
            status: FieldStatus::Missing,
            provenance: Vec::new(),
            reasons: Vec::new(),
        }
    }

    #[test]
    fn full_evidence_passes() {
        let result = result_with_fields(vec![present("incident_date", true)]);
        let gate = evaluate(&result, &spec());
        assert_eq!(gate.status, GateStatus::Pass);
        assert!(gate.missing_required_fields.is_empty());
    }

    #[test]
    fn weak_evidence_warns() {
        let result = result_with_fields(vec![
            present("incident_date", false),
        ]);
        let gate = evaluate(&result, &spec());
        assert_eq!(gate.status, GateStatus::Warn);
        assert!(gate.reasons.contains(&GateReason::LowEvidenceRate));
        assert!(gate.reasons.contains(&GateReason::ProvenanceWeak));
    }

    #[test]
    fn missing_required_fails_with_named_fields() {
        let result = result_with_fields(vec![missing("incident_date"), present("policy_number", true)]);
        let gate = evaluate(&result, &spec());
        assert_eq!(gate.status, GateStatus::Fail);
        assert_eq!(gate.missing_required_fields, vec!["incident_date"]);
        assert!(gate.reasons.contains(&GateReason::MissingRequiredFields));
    }

    #[test]
    fn empty_result_fails() {
        let result = result_with_fields(vec![]);
        let gate = evaluate(&result, &spec());
        assert_eq!(gate.status, GateStatus::Fail);
    }

    #[test]
    fn evaluation_is_idempotent() {
        let result = result_with_fields(vec![present("incident_date", false), missing("policy_number")]);
        let first = evaluate(&result, &spec());
        let second = evaluate(&result, &spec());
        assert_eq!(first.status, second.status);
        assert_eq!(first.reasons, second.reasons);
        assert_eq!(first.missing_required_fields, second.missing_required_fields);
    }

    #[test]
    fn vision_fallback_flag_is_preserved() {
        let mut result = result_with_fields(vec![present("incident_date", true)]);
        result.quality_gate.needs_vision_fallback = true;
        let gate = evaluate(&result, &spec());
        assert!(gate.needs_vision_fallback);
    }
}
