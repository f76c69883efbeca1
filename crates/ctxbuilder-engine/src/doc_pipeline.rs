//! The per-document state machine.
//!
//! `discovered → ingesting → classifying → extracting → gating → done |
//! failed(phase)`. Transitions are linear; a failure records the phase and
//! error code, skips the remaining stages, and leaves the document in the
//! run's aggregates. Nothing a single document does can take down its
//! siblings: every fallible step is contained here.

use crate::config::{PipelineConfig, Stage};
use crate::phase_metrics::PhaseMetrics;
use crate::sinks::ComplianceSinks;
use camino::Utf8PathBuf;
use chrono::Utc;
use ctxbuilder_catalog::Catalog;
use ctxbuilder_classify::{Classification, Classifier, ClassifierConfig, ClassifyError};
use ctxbuilder_compliance::{DecisionType, NewDecision};
use ctxbuilder_doctext::{DocText, DocTextStore};
use ctxbuilder_extraction::{
    DocInfo, ExtractError, ExtractionResult, Extractor, ExtractorConfig, GateStatus, InputHashes,
    RunInfo,
};
use ctxbuilder_ingest::{IngestError, ProviderRegistry};
use ctxbuilder_llm::{AuditedBackend, LlmError};
use ctxbuilder_utils::atomic_write::write_json_atomic;
use ctxbuilder_utils::ids::doc_id_from_bytes;
use ctxbuilder_utils::ErrorCode;
use ctxbuilder_workspace::{
    ClassificationFingerprint, DocMeta, DocOutcome, DocState, DocTimings, WorkspacePaths,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// One source file waiting to be processed.
#[derive(Debug, Clone)]
pub struct DiscoveredDoc {
    pub claim_id: String,
    pub source_path: Utf8PathBuf,
    pub filename: String,
}

/// Everything a doc task needs, shared read-only across tasks.
pub(crate) struct DocTaskDeps {
    pub paths: WorkspacePaths,
    pub catalog: Arc<Catalog>,
    pub providers: Arc<ProviderRegistry>,
    pub backend: Arc<AuditedBackend>,
    pub sinks: Arc<ComplianceSinks>,
    pub config: PipelineConfig,
    pub run_id: String,
    pub bundle_id: Option<String>,
}

/// What one document contributes back to the run.
pub(crate) struct DocResult {
    pub outcome: DocOutcome,
    pub metrics: PhaseMetrics,
    pub extraction: Option<ExtractionResult>,
}

/// Process one document through every enabled stage.
pub(crate) async fn process_doc(deps: &DocTaskDeps, doc: DiscoveredDoc) -> DocResult {
    let started = Instant::now();
    let mut metrics = PhaseMetrics::default();
    metrics.ingestion.discovered = 1;
    let mut timings = DocTimings::default();

    let outcome = |state: DocState,
                       failed_phase: Option<&str>,
                       error_code: Option<ErrorCode>,
                       doc_id: String,
                       doc_type: Option<String>,
                       gate: Option<String>,
                       reused_text: bool,
                       reused_classification: bool,
                       timings: DocTimings| DocOutcome {
        doc_id,
        claim_id: doc.claim_id.clone(),
        filename: doc.filename.clone(),
        state,
        failed_phase: failed_phase.map(String::from),
        error_code,
        doc_type,
        gate_status: gate,
        reused_text,
        reused_classification,
        timings,
    };

    // -- read + identify -----------------------------------------------------

    let raw = match std::fs::read(doc.source_path.as_std_path()) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(path = %doc.source_path, error = %e, "source unreadable");
            metrics.ingestion.failed = 1;
            return DocResult {
                outcome: outcome(
                    DocState::Failed,
                    Some("ingestion"),
                    Some(ErrorCode::DocNotSupported),
                    String::new(),
                    None,
                    None,
                    false,
                    false,
                    timings,
                ),
                metrics,
                extraction: None,
            };
        }
    };
    let doc_id = doc_id_from_bytes(&raw);

    // Archive the source under its owning claim before any processing.
    let source_dir = deps.paths.doc_source_dir(&doc.claim_id, &doc_id);
    let archived = source_dir.join(&doc.filename);
    if !archived.exists() {
        if std::fs::create_dir_all(source_dir.as_std_path()).is_ok() {
            let _ = std::fs::copy(doc.source_path.as_std_path(), archived.as_std_path());
        }
    }

    // -- ingestion -----------------------------------------------------------

    let ingest_started = Instant::now();
    let (doc_text, reused_text, provider_name, mime) =
        match ingest_stage(deps, &doc, &doc_id, &raw).await {
            Ok(v) => v,
            Err(code) => {
                metrics.ingestion.failed = 1;
                metrics.ingestion.duration_ms = ingest_started.elapsed().as_millis() as u64;
                timings.ingestion_ms = metrics.ingestion.duration_ms;
                timings.total_ms = started.elapsed().as_millis() as u64;
                return DocResult {
                    outcome: outcome(
                        DocState::Failed,
                        Some("ingestion"),
                        Some(code),
                        doc_id,
                        None,
                        None,
                        false,
                        false,
                        timings,
                    ),
                    metrics,
                    extraction: None,
                };
            }
        };
    if reused_text {
        metrics.ingestion.skipped = 1;
    } else {
        metrics.ingestion.ingested = 1;
    }
    metrics.ingestion.duration_ms = ingest_started.elapsed().as_millis() as u64;
    timings.ingestion_ms = metrics.ingestion.duration_ms;

    // Persist doc metadata (provider + text hash drive reuse next run).
    let meta_path = deps.paths.doc_meta_path(&doc.claim_id, &doc_id);
    let mut meta = DocMeta::load(&meta_path).ok().flatten().unwrap_or(DocMeta {
        doc_id: doc_id.clone(),
        claim_id: doc.claim_id.clone(),
        original_filename: doc.filename.clone(),
        mime: mime.clone(),
        ingest_provider: provider_name.clone(),
        text_md5: doc_text.text_md5(),
        ingested_at: Utc::now(),
        classified_with: None,
    });
    meta.ingest_provider = provider_name;
    meta.text_md5 = doc_text.text_md5();
    if meta.save(&meta_path).is_err() {
        warn!(doc_id = %doc_id, "failed to persist doc metadata");
    }

    if !deps.config.runs_stage(Stage::Classify) {
        timings.total_ms = started.elapsed().as_millis() as u64;
        return DocResult {
            outcome: outcome(
                DocState::Done,
                None,
                None,
                doc_id,
                None,
                None,
                reused_text,
                false,
                timings,
            ),
            metrics,
            extraction: None,
        };
    }

    // -- classification ------------------------------------------------------

    let classify_started = Instant::now();
    let (classification, reused_classification) =
        match classify_stage(deps, &doc, &doc_id, &doc_text, &meta, &meta_path).await {
            Ok(v) => v,
            Err(code) => {
                metrics.classification.duration_ms =
                    classify_started.elapsed().as_millis() as u64;
                timings.classification_ms = metrics.classification.duration_ms;
                timings.total_ms = started.elapsed().as_millis() as u64;
                return DocResult {
                    outcome: outcome(
                        DocState::Failed,
                        Some("classification"),
                        Some(code),
                        doc_id,
                        None,
                        None,
                        reused_text,
                        false,
                        timings,
                    ),
                    metrics,
                    extraction: None,
                };
            }
        };

    metrics.classification.classified = 1;
    metrics.classification.duration_ms = classify_started.elapsed().as_millis() as u64;
    timings.classification_ms = metrics.classification.duration_ms;
    *metrics
        .classification
        .distribution
        .entry(classification.doc_type.clone())
        .or_default() += 1;

    let low_confidence =
        classification.doc_type_confidence < deps.config.classify_low_confidence;
    if low_confidence {
        metrics.classification.low_confidence = 1;
    }

    if !deps.config.runs_stage(Stage::Extract) {
        timings.total_ms = started.elapsed().as_millis() as u64;
        return DocResult {
            outcome: outcome(
                DocState::Done,
                None,
                low_confidence.then_some(ErrorCode::ClassifyLowConf),
                doc_id,
                Some(classification.doc_type),
                None,
                reused_text,
                reused_classification,
                timings,
            ),
            metrics,
            extraction: None,
        };
    }

    // -- extraction + gate ---------------------------------------------------

    let Some(spec) = deps.catalog.spec(&classification.doc_type) else {
        // Routed to a type with no extraction contract; not a failure.
        metrics.extraction.skipped_unsupported = 1;
        timings.total_ms = started.elapsed().as_millis() as u64;
        return DocResult {
            outcome: outcome(
                DocState::Done,
                None,
                low_confidence.then_some(ErrorCode::ClassifyLowConf),
                doc_id,
                Some(classification.doc_type),
                None,
                reused_text,
                reused_classification,
                timings,
            ),
            metrics,
            extraction: None,
        };
    };

    metrics.extraction.attempted = 1;
    let extract_started = Instant::now();

    let run_info = RunInfo {
        run_id: deps.run_id.clone(),
        extractor_version: env!("CARGO_PKG_VERSION").to_string(),
        model: deps.config.extractor_model.clone(),
        prompt_version: deps.config.prompt_version.clone(),
        input_hashes: InputHashes {
            pdf_md5: doc_id.clone(),
            text_md5: doc_text.text_md5(),
        },
    };
    let doc_info = DocInfo {
        doc_id: doc_id.clone(),
        claim_id: doc.claim_id.clone(),
        doc_type: classification.doc_type.clone(),
        doc_type_confidence: classification.doc_type_confidence,
        language: classification.language.clone(),
        page_count: doc_text.page_count,
    };

    let extractor = Extractor::new(
        deps.backend.as_ref(),
        ExtractorConfig {
            model: deps.config.extractor_model.clone(),
            prompt_version: deps.config.prompt_version.clone(),
            extractor_version: env!("CARGO_PKG_VERSION").to_string(),
            window: deps.config.window,
            timeout: deps.config.extract_timeout,
        },
    );

    let extraction_attempt = tokio::time::timeout(
        deps.config.extract_timeout,
        extractor.extract(&doc_text, spec, run_info.clone(), doc_info.clone()),
    )
    .await;

    let (mut result, failure_code, call_ids) = match extraction_attempt {
        Ok(Ok(outcome_ok)) => {
            metrics.extraction.succeeded = 1;
            (outcome_ok.result, None, outcome_ok.call_ids)
        }
        Ok(Err(err)) => {
            metrics.extraction.failed = 1;
            let code = map_extract_error(&err);
            warn!(doc_id = %doc_id, error = %err, code = %code, "extraction failed");
            (
                ExtractionResult::failed(run_info, doc_info, code),
                Some(code),
                Vec::new(),
            )
        }
        Err(_) => {
            metrics.extraction.failed = 1;
            warn!(doc_id = %doc_id, "extraction timed out");
            (
                ExtractionResult::failed(run_info, doc_info, ErrorCode::Timeout),
                Some(ErrorCode::Timeout),
                Vec::new(),
            )
        }
    };
    metrics.extraction.duration_ms = extract_started.elapsed().as_millis() as u64;
    timings.extraction_ms = metrics.extraction.duration_ms;

    // Gate evaluation runs on success and failure alike; a failed
    // extraction gates `fail` with its own reason.
    result.quality_gate = ctxbuilder_gate::evaluate(&result, spec);
    result.version_bundle_id = deps.bundle_id.clone();

    match result.quality_gate.status {
        GateStatus::Pass => metrics.quality_gate.pass = 1,
        GateStatus::Warn => metrics.quality_gate.warn = 1,
        GateStatus::Fail => metrics.quality_gate.fail = 1,
    }

    // The artifact is written even when extraction failed.
    let artifact_path =
        deps.paths
            .claim_run_extraction_path(&doc.claim_id, &deps.run_id, &doc_id);
    let mut write_failed = false;
    if let Err(e) = write_json_atomic(&artifact_path, &result) {
        warn!(doc_id = %doc_id, error = %e, "failed to write extraction artifact");
        write_failed = true;
    }

    record_extraction_decisions(deps, &doc, &doc_id, &result, &call_ids);

    let final_error = if write_failed {
        Some(ErrorCode::OutputWriteFailed)
    } else {
        failure_code.or(low_confidence.then_some(ErrorCode::ClassifyLowConf))
    };
    let state = if write_failed || failure_code.is_some() {
        DocState::Failed
    } else {
        DocState::Done
    };
    let failed_phase = if write_failed {
        Some("gating")
    } else if failure_code.is_some() {
        Some("extraction")
    } else {
        None
    };

    timings.total_ms = started.elapsed().as_millis() as u64;
    info!(
        doc_id = %doc_id,
        claim_id = %doc.claim_id,
        doc_type = %classification.doc_type,
        gate = ?result.quality_gate.status,
        "document processed"
    );

    DocResult {
        outcome: outcome(
            state,
            failed_phase,
            final_error,
            doc_id,
            Some(classification.doc_type),
            Some(format!("{:?}", result.quality_gate.status).to_lowercase()),
            reused_text,
            reused_classification,
            timings,
        ),
        metrics,
        extraction: Some(result),
    }
}

/// Ingest or reuse canonical text.
async fn ingest_stage(
    deps: &DocTaskDeps,
    doc: &DiscoveredDoc,
    doc_id: &str,
    raw: &[u8],
) -> Result<(DocText, bool, String, String), ErrorCode> {
    let store = DocTextStore::new(deps.paths.doc_text_dir(&doc.claim_id, doc_id));
    let (provider, mime) = deps
        .providers
        .select(&doc.source_path, raw)
        .map_err(|_| ErrorCode::DocNotSupported)?;

    // Reuse: existing canonical text from the same provider with the same
    // content hash means ingestion is skipped entirely.
    if store.exists() {
        if let Ok(existing) = store.load() {
            let meta = DocMeta::load(&deps.paths.doc_meta_path(&doc.claim_id, doc_id))
                .ok()
                .flatten();
            let same_provider = meta
                .as_ref()
                .map(|m| m.ingest_provider == provider.name())
                .unwrap_or(false);
            let same_text = meta
                .as_ref()
                .map(|m| m.text_md5 == existing.text_md5())
                .unwrap_or(false);
            if same_provider && same_text {
                info!(doc_id, "canonical text reused");
                return Ok((existing, true, provider.name().to_string(), mime));
            }
        }
    }

    let attempt = tokio::time::timeout(
        deps.config.ingestion_timeout,
        provider.ingest(&doc.source_path, doc_id),
    )
    .await;

    let doc_text = match attempt {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => return Err(map_ingest_error(&e)),
        Err(_) => return Err(ErrorCode::Timeout),
    };

    if doc_text.pages.is_empty() {
        return Err(ErrorCode::TextMissing);
    }

    if store.exists() {
        // A different provider or refreshed source produced new text;
        // publish it under this run and repoint the default.
        store
            .supersede(&doc_text, &deps.run_id)
            .map_err(|_| ErrorCode::OutputWriteFailed)?;
    } else {
        store.write(&doc_text).map_err(|_| ErrorCode::OutputWriteFailed)?;
    }
    Ok((doc_text, false, provider.name().to_string(), mime))
}

/// Classify or reuse a stored classification.
async fn classify_stage(
    deps: &DocTaskDeps,
    doc: &DiscoveredDoc,
    doc_id: &str,
    doc_text: &DocText,
    meta: &DocMeta,
    meta_path: &camino::Utf8Path,
) -> Result<(Classification, bool), ErrorCode> {
    let fingerprint = ClassificationFingerprint {
        text_md5: doc_text.text_md5(),
        model: deps.config.classifier_model.clone(),
        catalog_hash: deps.catalog.catalog_hash(),
    };

    let stored_path = deps
        .paths
        .doc_dir(&doc.claim_id, doc_id)
        .join("meta/classification.json");

    if meta.classified_with.as_ref() == Some(&fingerprint) {
        if let Ok(content) = std::fs::read_to_string(stored_path.as_std_path()) {
            if let Ok(stored) = serde_json::from_str::<Classification>(&content) {
                info!(doc_id, "classification reused");
                return Ok((stored, true));
            }
        }
    }

    let classifier = Classifier::new(
        deps.backend.as_ref(),
        ClassifierConfig {
            model: deps.config.classifier_model.clone(),
            timeout: deps.config.classify_timeout,
            temperature: 0.0,
        },
    );

    let attempt = tokio::time::timeout(
        deps.config.classify_timeout,
        classifier.classify(doc_text, &deps.catalog, &doc.filename, &doc.claim_id),
    )
    .await;

    let outcome = match attempt {
        Ok(Ok(o)) => o,
        Ok(Err(e)) => return Err(map_classify_error(&e)),
        Err(_) => return Err(ErrorCode::Timeout),
    };

    // Persist for reuse and record the routing decision.
    let _ = write_json_atomic(&stored_path, &outcome.classification);
    let mut updated = meta.clone();
    updated.classified_with = Some(fingerprint);
    let _ = updated.save(meta_path);

    let mut decision = NewDecision::system(
        DecisionType::Classification,
        serde_json::to_value(&outcome.classification).unwrap_or_default(),
    )
    .with_doc(doc.claim_id.clone(), doc_id.to_string())
    .with_rationale(
        outcome.classification.summary.clone(),
        Some(outcome.classification.doc_type_confidence),
    );
    if let Some(call_id) = outcome.call_id {
        decision = decision.with_call(call_id);
    }
    if let Some(bundle_id) = &deps.bundle_id {
        decision = decision.with_bundle(bundle_id.clone());
    }
    deps.sinks.record_decision(decision);

    Ok((outcome.classification, false))
}

fn record_extraction_decisions(
    deps: &DocTaskDeps,
    doc: &DiscoveredDoc,
    doc_id: &str,
    result: &ExtractionResult,
    call_ids: &[uuid::Uuid],
) {
    let mut extraction_decision = NewDecision::system(
        DecisionType::Extraction,
        serde_json::json!({
            "field_count": result.fields.len(),
            "present": result.present_fields().count(),
            "error_code": result.error_code,
        }),
    )
    .with_doc(doc.claim_id.clone(), doc_id.to_string())
    .with_rationale(
        format!(
            "extracted {} of {} fields",
            result.present_fields().count(),
            result.fields.len()
        ),
        None,
    );
    if let Some(call_id) = call_ids.last() {
        extraction_decision = extraction_decision.with_call(*call_id);
    }
    if let Some(bundle_id) = &deps.bundle_id {
        extraction_decision = extraction_decision.with_bundle(bundle_id.clone());
    }
    deps.sinks.record_decision(extraction_decision);

    let mut gate_decision = NewDecision::system(
        DecisionType::QualityGate,
        serde_json::to_value(&result.quality_gate).unwrap_or_default(),
    )
    .with_doc(doc.claim_id.clone(), doc_id.to_string())
    .with_rationale(
        format!("gate {:?}", result.quality_gate.status).to_lowercase(),
        None,
    );
    if let Some(bundle_id) = &deps.bundle_id {
        gate_decision = gate_decision.with_bundle(bundle_id.clone());
    }
    deps.sinks.record_decision(gate_decision);
}

fn map_ingest_error(err: &IngestError) -> ErrorCode {
    match err {
        IngestError::FileNotSupported { .. } => ErrorCode::DocNotSupported,
        IngestError::ConfigurationMissing(_) => ErrorCode::ConfigMissing,
        IngestError::ProviderTransient(_) => ErrorCode::RateLimited,
        IngestError::ProviderFatal(_) => ErrorCode::UnknownException,
        IngestError::Io(_) => ErrorCode::DocNotSupported,
    }
}

fn map_classify_error(err: &ClassifyError) -> ErrorCode {
    match err {
        ClassifyError::Exception(_) => ErrorCode::ClassifyException,
        ClassifyError::Llm(llm) => map_llm_error(llm, ErrorCode::ClassifyException),
    }
}

fn map_extract_error(err: &ExtractError) -> ErrorCode {
    match err {
        ExtractError::SchemaInvalid(_) => ErrorCode::ExtractSchemaInvalid,
        ExtractError::Llm(llm) => map_llm_error(llm, ErrorCode::ExtractException),
    }
}

fn map_llm_error(err: &LlmError, fallback: ErrorCode) -> ErrorCode {
    match err {
        LlmError::ProviderQuota(_) => ErrorCode::RateLimited,
        LlmError::Timeout { .. } => ErrorCode::Timeout,
        LlmError::Misconfiguration(_) => ErrorCode::ConfigMissing,
        _ => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_mapping_covers_the_taxonomy() {
        assert_eq!(
            map_ingest_error(&IngestError::FileNotSupported { mime: "x".into() }),
            ErrorCode::DocNotSupported
        );
        assert_eq!(
            map_ingest_error(&IngestError::ConfigurationMissing("k".into())),
            ErrorCode::ConfigMissing
        );
        assert_eq!(
            map_ingest_error(&IngestError::ProviderTransient("429".into())),
            ErrorCode::RateLimited
        );

        assert_eq!(
            map_classify_error(&ClassifyError::Exception("bad".into())),
            ErrorCode::ClassifyException
        );
        assert_eq!(
            map_extract_error(&ExtractError::SchemaInvalid("bad".into())),
            ErrorCode::ExtractSchemaInvalid
        );
        assert_eq!(
            map_extract_error(&ExtractError::Llm(LlmError::ProviderQuota("429".into()))),
            ErrorCode::RateLimited
        );
        assert_eq!(
            map_extract_error(&ExtractError::Llm(LlmError::Timeout {
                duration: std::time::Duration::from_secs(1)
            })),
            ErrorCode::Timeout
        );
    }
}
