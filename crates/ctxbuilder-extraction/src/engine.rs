//! Structured extraction engine (pass two).
//!
//! Takes the candidate windows from the finder, makes one typed LLM call
//! (plus at most one repair call), binds every cited quote back to exact
//! offsets in the canonical text, applies the spec's normalizers and
//! validators, and resolves conflicting candidates.

use crate::finder::{find_candidates, is_short_document, CandidateScan, DEFAULT_WINDOW};
use crate::parse::{parse_fields_response, repair_prompt, FieldAnswer, ParseError};
use crate::types::{
    DocInfo, ExtractionResult, FieldResult, FieldStatus, GateReason, Provenance, ProvenanceMethod,
    QualityGate, RunInfo, EXTRACTION_SCHEMA_VERSION,
};
use ctxbuilder_catalog::{is_missing_value, normalize_value, validate_value, DocTypeSpec};
use ctxbuilder_doctext::{find_quote_in_page, DocText, TextSource};
use ctxbuilder_llm::{AuditedBackend, LlmError, LlmInvocation, Message};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Candidates bound further than this from a hint lose the tie-break.
const HINT_PROXIMITY: usize = 200;

/// Confidence ceiling for values whose quote could not be bound.
const UNBOUND_CONFIDENCE_CAP: f64 = 0.5;

/// Confidence assumed when the model does not self-report one.
const DEFAULT_CONFIDENCE: f64 = 0.7;

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub model: String,
    pub prompt_version: String,
    pub extractor_version: String,
    /// Candidate window radius in code points.
    pub window: usize,
    pub timeout: Duration,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            prompt_version: "extract-v1".to_string(),
            extractor_version: env!("CARGO_PKG_VERSION").to_string(),
            window: DEFAULT_WINDOW,
            timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    /// Response failed schema validation after the single repair attempt.
    #[error("extraction response invalid after repair attempt: {0}")]
    SchemaInvalid(String),

    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// Extraction output: the artifact body plus the audit call ids that
/// produced it, for the decision record to reference.
#[derive(Debug)]
pub struct ExtractOutcome {
    pub result: ExtractionResult,
    pub call_ids: Vec<Uuid>,
}

pub struct Extractor<'a> {
    backend: &'a AuditedBackend,
    config: ExtractorConfig,
}

impl<'a> Extractor<'a> {
    #[must_use]
    pub fn new(backend: &'a AuditedBackend, config: ExtractorConfig) -> Self {
        Self { backend, config }
    }

    /// Run find → extract for one classified document.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::SchemaInvalid`] when the model's response is
    /// unusable after the repair attempt, and [`ExtractError::Llm`] when the
    /// provider fails terminally. The caller converts either into a failed
    /// `extraction_result_v1` artifact.
    pub async fn extract(
        &self,
        doc: &DocText,
        spec: &DocTypeSpec,
        run: RunInfo,
        doc_info: DocInfo,
    ) -> Result<ExtractOutcome, ExtractError> {
        let scan = find_candidates(doc, spec, self.config.window);
        debug!(
            doc_id = %doc_info.doc_id,
            windows = scan.windows.len(),
            uncovered = scan.uncovered_required.len(),
            "candidate scan complete"
        );

        let prompt = self.build_prompt(doc, spec, &scan);
        let mut call_ids = Vec::new();

        let invocation = LlmInvocation::new("extraction", self.config.model.clone(), vec![
            Message::system(EXTRACT_SYSTEM_PROMPT),
            Message::user(prompt.clone()),
        ])
        .with_context(Some(doc_info.doc_id.clone()), Some(doc_info.claim_id.clone()))
        .with_timeout(self.config.timeout);

        let (first, call_id) = self.backend.invoke_audited(invocation).await?;
        call_ids.push(call_id);

        let answers = match parse_fields_response(&first.raw_response) {
            Ok(parsed) => parsed.fields,
            Err(parse_err) => {
                warn!(doc_id = %doc_info.doc_id, error = %parse_err, "schema-invalid response, attempting repair");
                let repair = LlmInvocation::new("extraction_repair", self.config.model.clone(), vec![
                    Message::system(EXTRACT_SYSTEM_PROMPT),
                    Message::user(prompt),
                    Message::new(ctxbuilder_llm::Role::Assistant, first.raw_response.clone()),
                    Message::user(repair_prompt(&first.raw_response, &parse_err)),
                ])
                .with_context(Some(doc_info.doc_id.clone()), Some(doc_info.claim_id.clone()))
                .with_timeout(self.config.timeout);

                let (second, repair_call_id) = self.backend.invoke_audited(repair).await?;
                call_ids.push(repair_call_id);

                parse_fields_response(&second.raw_response)
                    .map_err(|e| ExtractError::SchemaInvalid(e.to_string()))?
                    .fields
            }
        };

        let fields = resolve_fields(doc, spec, &answers);

        let result = ExtractionResult {
            schema_version: EXTRACTION_SCHEMA_VERSION.to_string(),
            run,
            doc: doc_info,
            fields,
            quality_gate: QualityGate {
                needs_vision_fallback: scan.needs_vision_fallback,
                ..QualityGate::pending()
            },
            version_bundle_id: None,
            error_code: None,
        };

        Ok(ExtractOutcome { result, call_ids })
    }

    fn build_prompt(&self, doc: &DocText, spec: &DocTypeSpec, scan: &CandidateScan) -> String {
        let mut prompt = format!(
            "Document type: {}\nExtract these fields:\n",
            spec.doc_type
        );
        for field in spec.all_fields() {
            let hints = spec
                .field_rules
                .get(field)
                .map(|r| r.hints.join(", "))
                .unwrap_or_default();
            let required = if spec.is_required(field) {
                "required"
            } else {
                "optional"
            };
            prompt.push_str(&format!("- {field} ({required}; near: {hints})\n"));
        }

        if is_short_document(doc, self.config.window) || scan.windows.is_empty() {
            prompt.push_str("\nDocument text:\n");
            for page in &doc.pages {
                prompt.push_str(&format!("--- page {} ---\n{}\n", page.page, page.text));
            }
        } else {
            prompt.push_str("\nRelevant document excerpts:\n");
            for window in &scan.windows {
                prompt.push_str(&format!(
                    "--- page {} (field: {}) ---\n{}\n",
                    window.page, window.field, window.text
                ));
            }
        }
        prompt
    }
}

const EXTRACT_SYSTEM_PROMPT: &str = "You extract typed fields from insurance claim documents. \
Respond with ONLY a JSON object: {\"fields\": [{\"name\": \"...\", \"value\": \"...\", \
\"supporting_quote\": \"...\", \"page\": 1, \"confidence\": 0.9}]}. The supporting_quote must be \
verbatim text from the document and page is the 1-based page it appears on. Use a null value for \
fields that are absent. Never invent values.";

/// A candidate value for one field after provenance binding.
struct BoundCandidate {
    value: String,
    normalized: String,
    confidence: f64,
    provenance: Option<Provenance>,
    /// Hint index matched within [`HINT_PROXIMITY`] of the span, if any.
    near_hint: Option<usize>,
}

/// Resolve model answers into final field results.
fn resolve_fields(doc: &DocText, spec: &DocTypeSpec, answers: &[FieldAnswer]) -> Vec<FieldResult> {
    let mut fields = Vec::new();

    for field in spec.all_fields() {
        let Some(rule) = spec.field_rules.get(field) else {
            continue;
        };

        let mut candidates: Vec<BoundCandidate> = answers
            .iter()
            .filter(|a| &a.name == field)
            .filter_map(|a| bind_candidate(doc, rule, a))
            .collect();

        if candidates.is_empty() {
            fields.push(FieldResult {
                name: field.clone(),
                value: None,
                normalized_value: None,
                confidence: 0.0,
                status: FieldStatus::Missing,
                provenance: Vec::new(),
                reasons: Vec::new(),
            });
            continue;
        }

        // Tie-break: bound-near-a-hint first, then confidence, then earliest
        // page, then earliest offset.
        candidates.sort_by(|a, b| {
            let a_key = (
                a.provenance.is_some() && a.near_hint.is_some(),
                a.confidence,
            );
            let b_key = (
                b.provenance.is_some() && b.near_hint.is_some(),
                b.confidence,
            );
            b_key
                .partial_cmp(&a_key)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let pa = a.provenance.as_ref().map_or((u32::MAX, usize::MAX), |p| {
                        (p.page, p.char_start)
                    });
                    let pb = b.provenance.as_ref().map_or((u32::MAX, usize::MAX), |p| {
                        (p.page, p.char_start)
                    });
                    pa.cmp(&pb)
                })
        });

        let mut reasons = Vec::new();
        let winner = &candidates[0];
        let mut value = winner.value.clone();
        let mut normalized = winner.normalized.clone();
        let mut confidence = winner.confidence;
        let mut provenance: Vec<Provenance> = winner.provenance.clone().into_iter().collect();

        if winner.provenance.is_none() {
            reasons.push(GateReason::ProvenanceWeak);
        }

        // Cross-page conflict: a different normalized value with its own
        // evidence on another page. Stronger hint authority wins outright;
        // equal authority reports ambiguity with both provenances.
        if let Some(conflict) = candidates.iter().skip(1).find(|c| {
            c.normalized != winner.normalized
                && c.provenance.is_some()
                && winner.provenance.is_some()
                && c.provenance.as_ref().map(|p| p.page)
                    != winner.provenance.as_ref().map(|p| p.page)
        }) {
            let winner_authority = winner.near_hint.unwrap_or(usize::MAX);
            let conflict_authority = conflict.near_hint.unwrap_or(usize::MAX);
            if conflict_authority < winner_authority {
                value = conflict.value.clone();
                normalized = conflict.normalized.clone();
                confidence = conflict.confidence;
                provenance = conflict.provenance.clone().into_iter().collect();
            } else if conflict_authority == winner_authority {
                reasons.push(GateReason::AmbiguousValue);
                confidence = confidence.min(conflict.confidence);
                provenance.extend(conflict.provenance.clone());
            }
        }

        let valid = validate_value(&rule.validate, &normalized).unwrap_or(false);
        if valid {
            fields.push(FieldResult {
                name: field.clone(),
                value: Some(value),
                normalized_value: Some(normalized),
                confidence,
                status: FieldStatus::Present,
                provenance,
                reasons,
            });
        } else {
            reasons.push(GateReason::ValidationFailed);
            fields.push(FieldResult {
                name: field.clone(),
                value: Some(value),
                normalized_value: None,
                confidence: 0.0,
                status: FieldStatus::Missing,
                provenance: Vec::new(),
                reasons,
            });
        }
    }

    fields
}

/// Bind one model answer: locate the quote, grade the provenance method,
/// check hint proximity, and normalize the value.
fn bind_candidate(
    doc: &DocText,
    rule: &ctxbuilder_catalog::FieldRule,
    answer: &FieldAnswer,
) -> Option<BoundCandidate> {
    let raw_value = answer.value.as_deref()?;
    if is_missing_value(raw_value) {
        return None;
    }

    let mut confidence = answer.confidence.unwrap_or(DEFAULT_CONFIDENCE).clamp(0.0, 1.0);
    let normalized = normalize_value(&rule.normalize, raw_value).ok()?;

    let mut provenance = None;
    let mut near_hint = None;

    if let Some(quote) = answer.supporting_quote.as_deref().filter(|q| !q.trim().is_empty()) {
        // Try the cited page first, then every page; models misnumber pages
        // more often than they misquote.
        let cited = answer.page.filter(|p| *p >= 1 && *p <= doc.page_count);
        let pages: Vec<u32> = match cited {
            Some(p) => std::iter::once(p)
                .chain((1..=doc.page_count).filter(move |q| *q != p))
                .collect(),
            None => (1..=doc.page_count).collect(),
        };

        for page_no in pages {
            let page = &doc.pages[(page_no - 1) as usize];
            if let Some((char_start, char_end)) = find_quote_in_page(&page.text, quote) {
                near_hint = nearest_hint(&page.text, char_start, &rule.hints);
                provenance = Some(Provenance {
                    page: page_no,
                    method: method_for_source(page.source),
                    text_quote: quote.to_string(),
                    char_start,
                    char_end,
                });
                break;
            }
        }
    }

    if provenance.is_none() {
        confidence = confidence.min(UNBOUND_CONFIDENCE_CAP);
    }

    Some(BoundCandidate {
        value: raw_value.to_string(),
        normalized,
        confidence,
        provenance,
        near_hint,
    })
}

fn method_for_source(source: TextSource) -> ProvenanceMethod {
    match source {
        TextSource::Di | TextSource::Plain => ProvenanceMethod::DiText,
        TextSource::VisionOcr | TextSource::Tesseract => ProvenanceMethod::VisionOcr,
    }
}

/// Lowest hint index occurring within [`HINT_PROXIMITY`] code points before
/// the span start (label text precedes its value).
fn nearest_hint(page_text: &str, char_start: usize, hints: &[String]) -> Option<usize> {
    let chars: Vec<char> = page_text.to_lowercase().chars().collect();
    let window_start = char_start.saturating_sub(HINT_PROXIMITY);
    let slice: String = chars
        .get(window_start..(char_start + HINT_PROXIMITY).min(chars.len()))?
        .iter()
        .collect();

    hints
        .iter()
        .enumerate()
        .filter(|(_, hint)| slice.contains(&hint.to_lowercase()))
        .map(|(idx, _)| idx)
        .min()
}
