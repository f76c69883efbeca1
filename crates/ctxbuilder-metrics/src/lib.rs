//! Comparative run metrics.
//!
//! A pure function over (latest truth, one run's extractions, the catalog's
//! normalizers). No clock, no filesystem: the same inputs always produce
//! the same report, and the report is never written back as truth.
//!
//! Per `(doc, field)` with truth state LABELED:
//! - `Correct`   — normalize(extracted) == normalize(truth)
//! - `Incorrect` — extracted present but unequal
//! - `Missing`   — extraction produced no value
//!
//! Accuracy = Correct / (Correct + Incorrect + Missing) over LABELED fields
//! only. UNVERIFIABLE and UNLABELED are excluded from the denominator, and
//! docs marked `doc_type_correct=false` are excluded from accuracy and
//! reported separately.

use ctxbuilder_catalog::{normalize_value, Catalog};
use ctxbuilder_extraction::{ExtractionResult, FieldStatus};
use ctxbuilder_truth::TruthRecord;
use ctxbuilder_workspace::LabelState;
use serde::Serialize;

/// Outcome of comparing one extracted field against truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOutcome {
    Correct,
    Incorrect,
    Missing,
    Unverifiable,
    Unlabeled,
}

/// Remediation weights per failure mode.
const WEIGHT_EXTRACTOR_MISS: u64 = 3;
const WEIGHT_INCORRECT: u64 = 3;
const WEIGHT_EVIDENCE_MISSING: u64 = 2;
const WEIGHT_CANNOT_VERIFY: u64 = 1;

/// One document in the metrics scope.
#[derive(Debug)]
pub struct ScopedDoc<'a> {
    pub doc_id: String,
    pub truth: Option<&'a TruthRecord>,
    pub extraction: Option<&'a ExtractionResult>,
}

/// Per-field comparison detail, for remediation drill-down.
#[derive(Debug, Clone, Serialize)]
pub struct FieldComparison {
    pub doc_id: String,
    pub field_name: String,
    pub outcome: FieldOutcome,
}

/// The metrics report for one run.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub correct: usize,
    pub incorrect: usize,
    pub missing: usize,
    pub unverifiable: usize,
    pub unlabeled: usize,
    /// `None` when no LABELED fields are in scope.
    pub accuracy: Option<f64>,
    pub label_coverage: f64,
    pub run_coverage: f64,
    /// Docs excluded from accuracy because the reviewer marked the routing
    /// wrong; reported, never silently dropped.
    pub excluded_wrong_doc_type: usize,
    /// Σ(weight[mode] · count) for remediation ordering.
    pub priority_score: u64,
    pub comparisons: Vec<FieldComparison>,
}

/// Compute the report for one run's scope.
#[must_use]
pub fn compute(docs: &[ScopedDoc<'_>], catalog: &Catalog) -> MetricsReport {
    let mut correct = 0;
    let mut incorrect = 0;
    let mut missing = 0;
    let mut unverifiable = 0;
    let mut unlabeled = 0;
    let mut evidence_missing = 0;
    let mut excluded_wrong_doc_type = 0;
    let mut comparisons = Vec::new();

    let total_docs = docs.len();
    let mut labeled_docs = 0;
    let mut docs_with_extraction = 0;

    for doc in docs {
        if doc.extraction.is_some() {
            docs_with_extraction += 1;
        }

        let Some(truth) = doc.truth else {
            continue;
        };
        if truth.labeled_fields().next().is_some() {
            labeled_docs += 1;
        }
        if !truth.doc_type_correct {
            excluded_wrong_doc_type += 1;
            continue;
        }

        for field_truth in &truth.fields {
            let extracted = doc.extraction.and_then(|e| {
                e.fields.iter().find(|f| f.name == field_truth.field_name)
            });

            let outcome = match field_truth.state {
                LabelState::Unlabeled => FieldOutcome::Unlabeled,
                LabelState::Unverifiable => FieldOutcome::Unverifiable,
                LabelState::Labeled => {
                    let truth_value = field_truth.truth_value.as_deref().unwrap_or_default();
                    match extracted {
                        Some(f) if f.status == FieldStatus::Present => {
                            let normalizer = doc
                                .extraction
                                .and_then(|e| catalog.spec(&e.doc.doc_type))
                                .and_then(|s| s.field_rules.get(&field_truth.field_name))
                                .map(|r| r.normalize.as_str())
                                .unwrap_or("trim");
                            let normalized_truth = normalize_value(normalizer, truth_value)
                                .unwrap_or_else(|_| truth_value.trim().to_string());
                            let normalized_extracted = f
                                .normalized_value
                                .clone()
                                .or_else(|| f.value.clone())
                                .unwrap_or_default();

                            if f.provenance.is_empty() {
                                evidence_missing += 1;
                            }
                            if normalized_extracted == normalized_truth {
                                FieldOutcome::Correct
                            } else {
                                FieldOutcome::Incorrect
                            }
                        }
                        _ => FieldOutcome::Missing,
                    }
                }
            };

            match outcome {
                FieldOutcome::Correct => correct += 1,
                FieldOutcome::Incorrect => incorrect += 1,
                FieldOutcome::Missing => missing += 1,
                FieldOutcome::Unverifiable => unverifiable += 1,
                FieldOutcome::Unlabeled => unlabeled += 1,
            }

            comparisons.push(FieldComparison {
                doc_id: doc.doc_id.clone(),
                field_name: field_truth.field_name.clone(),
                outcome,
            });
        }
    }

    let denominator = correct + incorrect + missing;
    let accuracy = if denominator > 0 {
        Some(correct as f64 / denominator as f64)
    } else {
        None
    };

    let coverage = |n: usize| {
        if total_docs == 0 {
            0.0
        } else {
            n as f64 / total_docs as f64
        }
    };

    MetricsReport {
        correct,
        incorrect,
        missing,
        unverifiable,
        unlabeled,
        accuracy,
        label_coverage: coverage(labeled_docs),
        run_coverage: coverage(docs_with_extraction),
        excluded_wrong_doc_type,
        priority_score: WEIGHT_EXTRACTOR_MISS * missing as u64
            + WEIGHT_INCORRECT * incorrect as u64
            + WEIGHT_EVIDENCE_MISSING * evidence_missing as u64
            + WEIGHT_CANNOT_VERIFY * unverifiable as u64,
        comparisons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxbuilder_extraction::{
        DocInfo, FieldResult, InputHashes, Provenance, ProvenanceMethod, QualityGate, RunInfo,
        EXTRACTION_SCHEMA_VERSION,
    };
    use ctxbuilder_truth::FieldTruth;
    use ctxbuilder_workspace::UnverifiableReason;

    fn catalog() -> Catalog {
        let dir = tempfile::TempDir::new().unwrap();
        let config = camino::Utf8PathBuf::from_path_buf(dir.path().join("config")).unwrap();
        std::fs::create_dir_all(config.join("specs").as_std_path()).unwrap();
        std::fs::write(
            config.join("doc_type_catalog.yaml").as_std_path(),
            "- doc_type: loss_notice\n  description: FNOL\n  cues: [fecha]\n",
        )
        .unwrap();
        std::fs::write(
            config.join("specs/loss_notice.yaml").as_std_path(),
            r#"
doc_type: loss_notice
version: "1"
required_fields: [incident_date]
field_rules:
  incident_date:
    normalize: date_to_iso
    validate: is_iso_date
    hints: [fecha]
quality_gate:
  pass_if: { min_required_present_ratio: 1.0, min_evidence_rate: 0.8 }
  warn_if: { min_required_present_ratio: 1.0, min_evidence_rate: 0.0 }
  fail_if: { otherwise: true }
"#,
        )
        .unwrap();
        Catalog::load(&config).unwrap()
    }

    fn extraction(doc_id: &str, fields: Vec<FieldResult>) -> ExtractionResult {
        ExtractionResult {
            schema_version: EXTRACTION_SCHEMA_VERSION.to_string(),
            run: RunInfo {
                run_id: "r1".into(),
                extractor_version: "0.9.0".into(),
                model: "m".into(),
                prompt_version: "p1".into(),
                input_hashes: InputHashes {
                    pdf_md5: doc_id.into(),
                    text_md5: "t".into(),
                },
            },
            doc: DocInfo {
                doc_id: doc_id.into(),
                claim_id: "c1".into(),
                doc_type: "loss_notice".into(),
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

    fn present_field(name: &str, normalized: &str) -> FieldResult {
        FieldResult {
            name: name.into(),
            value: Some(normalized.into()),
            normalized_value: Some(normalized.into()),
            confidence: 0.9,
            status: FieldStatus::Present,
            provenance: vec![Provenance {
                page: 1,
                method: ProvenanceMethod::DiText,
                text_quote: normalized.into(),
                char_start: 0,
                char_end: 1,
            }],
            reasons: Vec::new(),
        }
    }

    fn missing_field(name: &str) -> FieldResult {
        FieldResult {
            name: name.into(),
            value: None,
            normalized_value: None,
            confidence: 0.0,
            status: FieldStatus::Missing,
            provenance: Vec::new(),
            reasons: Vec::new(),
        }
    }

    fn truth_labeled(file_md5: &str, entries: &[(&str, &str)]) -> TruthRecord {
        let mut record = TruthRecord::new(file_md5);
        for (name, value) in entries {
            record.fields.push(FieldTruth {
                field_name: (*name).to_string(),
                state: LabelState::Labeled,
                truth_value: Some((*value).to_string()),
                unverifiable_reason: None,
                updated_at: chrono::DateTime::from_timestamp(0, 0).unwrap(),
            });
        }
        record
    }

    /// Accuracy arithmetic: 7 correct, 2 incorrect, 1 missing, plus
    /// 1 unverifiable and 5 unlabeled out of scope, gives 0.70.
    #[test]
    fn accuracy_counts_only_labeled_fields() {
        let catalog = catalog();
        let mut truths = Vec::new();
        let mut extractions = Vec::new();

        for n in 0..10 {
            let doc_id = format!("d{n}");
            let mut truth = truth_labeled(&doc_id, &[("incident_date", "2024-01-13")]);
            // Add noise that must stay out of the denominator.
            if n < 5 {
                truth.fields.push(FieldTruth {
                    field_name: "unlabeled_extra".into(),
                    state: LabelState::Unlabeled,
                    truth_value: None,
                    unverifiable_reason: None,
                    updated_at: chrono::DateTime::from_timestamp(0, 0).unwrap(),
                });
            }
            if n == 0 {
                truth.fields.push(FieldTruth {
                    field_name: "unverifiable_extra".into(),
                    state: LabelState::Unverifiable,
                    truth_value: None,
                    unverifiable_reason: Some(UnverifiableReason::UnreadableText),
                    updated_at: chrono::DateTime::from_timestamp(0, 0).unwrap(),
                });
            }
            truths.push(truth);

            let field = match n {
                0..=6 => present_field("incident_date", "2024-01-13"),
                7 | 8 => present_field("incident_date", "2024-02-20"),
                _ => missing_field("incident_date"),
            };
            extractions.push(extraction(&doc_id, vec![field]));
        }

        let docs: Vec<ScopedDoc> = (0..10)
            .map(|n| ScopedDoc {
                doc_id: format!("d{n}"),
                truth: Some(&truths[n]),
                extraction: Some(&extractions[n]),
            })
            .collect();

        let report = compute(&docs, &catalog);
        assert_eq!(report.correct, 7);
        assert_eq!(report.incorrect, 2);
        assert_eq!(report.missing, 1);
        assert_eq!(report.unverifiable, 1);
        assert_eq!(report.unlabeled, 5);
        assert!((report.accuracy.unwrap() - 0.70).abs() < 1e-9);
    }

    #[test]
    fn normalizer_is_shared_with_extraction() {
        let catalog = catalog();
        // Truth recorded in source form; the shared date normalizer makes
        // it comparable with the extractor's ISO output.
        let truth = truth_labeled("d1", &[("incident_date", "13/01/2024")]);
        let ext = extraction("d1", vec![present_field("incident_date", "2024-01-13")]);

        let docs = vec![ScopedDoc {
            doc_id: "d1".into(),
            truth: Some(&truth),
            extraction: Some(&ext),
        }];
        let report = compute(&docs, &catalog);
        assert_eq!(report.correct, 1);
        assert_eq!(report.accuracy, Some(1.0));
    }

    #[test]
    fn wrong_doc_type_is_excluded_and_reported() {
        let catalog = catalog();
        let mut truth = truth_labeled("d1", &[("incident_date", "2024-01-13")]);
        truth.doc_type_correct = false;
        let ext = extraction("d1", vec![present_field("incident_date", "2024-01-13")]);

        let docs = vec![ScopedDoc {
            doc_id: "d1".into(),
            truth: Some(&truth),
            extraction: Some(&ext),
        }];
        let report = compute(&docs, &catalog);
        assert_eq!(report.excluded_wrong_doc_type, 1);
        assert_eq!(report.accuracy, None);
    }

    #[test]
    fn coverage_ratios() {
        let catalog = catalog();
        let truth = truth_labeled("d1", &[("incident_date", "2024-01-13")]);
        let ext = extraction("d1", vec![present_field("incident_date", "2024-01-13")]);

        let docs = vec![
            ScopedDoc {
                doc_id: "d1".into(),
                truth: Some(&truth),
                extraction: Some(&ext),
            },
            ScopedDoc {
                doc_id: "d2".into(),
                truth: None,
                extraction: None,
            },
        ];
        let report = compute(&docs, &catalog);
        assert!((report.label_coverage - 0.5).abs() < 1e-9);
        assert!((report.run_coverage - 0.5).abs() < 1e-9);
    }

    #[test]
    fn priority_score_weights_modes() {
        let catalog = catalog();
        // One miss (3) + one incorrect (3) + incorrect without provenance (2).
        let truth = truth_labeled("d1", &[("incident_date", "2024-01-13")]);
        let truth2 = truth_labeled("d2", &[("incident_date", "2024-01-13")]);
        let mut bad = present_field("incident_date", "1999-01-01");
        bad.provenance.clear();
        let ext1 = extraction("d1", vec![missing_field("incident_date")]);
        let ext2 = extraction("d2", vec![bad]);

        let docs = vec![
            ScopedDoc {
                doc_id: "d1".into(),
                truth: Some(&truth),
                extraction: Some(&ext1),
            },
            ScopedDoc {
                doc_id: "d2".into(),
                truth: Some(&truth2),
                extraction: Some(&ext2),
            },
        ];
        let report = compute(&docs, &catalog);
        assert_eq!(report.priority_score, 3 + 3 + 2);
    }

    #[test]
    fn report_is_deterministic() {
        let catalog = catalog();
        let truth = truth_labeled("d1", &[("incident_date", "2024-01-13")]);
        let ext = extraction("d1", vec![present_field("incident_date", "2024-01-13")]);
        let docs = vec![ScopedDoc {
            doc_id: "d1".into(),
            truth: Some(&truth),
            extraction: Some(&ext),
        }];

        let a = compute(&docs, &catalog);
        let b = compute(&docs, &catalog);
        assert_eq!(a.accuracy, b.accuracy);
        assert_eq!(a.priority_score, b.priority_score);
    }
}
