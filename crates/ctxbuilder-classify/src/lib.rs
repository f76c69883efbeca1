//! Document classification.
//!
//! Routes a document to exactly one doc type using the canonical text and
//! the catalog's cues. Content decides; the filename is passed to the
//! prompt as informational context only. Unreadable content short-circuits
//! to the low-confidence fallback type without spending a model call.

use ctxbuilder_catalog::{Catalog, FALLBACK_DOC_TYPE};
use ctxbuilder_doctext::DocText;
use ctxbuilder_llm::{AuditedBackend, LlmError, LlmInvocation, Message};
use ctxbuilder_utils::json_text::extract_json_object;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Confidence assigned to fallback classifications.
const FALLBACK_CONFIDENCE: f64 = 0.2;

/// Maximum excerpt fed to the router, in code points.
const EXCERPT_LIMIT: usize = 4000;

/// Maximum number of key hints kept.
const MAX_KEY_HINTS: usize = 3;

/// Routing decision for one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub doc_type: String,
    pub doc_type_confidence: f64,
    pub language: String,
    /// 2 to 5 content signals supporting the routing decision.
    pub signals: Vec<String>,
    pub summary: String,
    /// Obvious identifiers spotted during routing; advisory only, never
    /// treated as extracted truth.
    #[serde(default)]
    pub key_hints: BTreeMap<String, String>,
}

/// Classification plus the audit call that produced it (absent for the
/// no-call fallback path).
#[derive(Debug)]
pub struct ClassifyOutcome {
    pub classification: Classification,
    pub call_id: Option<Uuid>,
}

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("classifier response unusable: {0}")]
    Exception(String),
}

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub model: String,
    pub timeout: Duration,
    pub temperature: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            timeout: Duration::from_secs(60),
            // Routing must be reproducible; anything above 0.1 is a bug.
            temperature: 0.0,
        }
    }
}

pub struct Classifier<'a> {
    backend: &'a AuditedBackend,
    config: ClassifierConfig,
}

/// Wire shape the router prompt asks for.
#[derive(Debug, Deserialize)]
struct RouterResponse {
    doc_type: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    signals: Vec<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    key_hints: BTreeMap<String, String>,
}

impl<'a> Classifier<'a> {
    #[must_use]
    pub fn new(backend: &'a AuditedBackend, config: ClassifierConfig) -> Self {
        Self { backend, config }
    }

    /// Classify one document.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::Exception`] for unusable responses and
    /// [`ClassifyError::Llm`] for terminal provider failures. Unreadable
    /// content is not an error; it produces the fallback classification.
    pub async fn classify(
        &self,
        doc: &DocText,
        catalog: &Catalog,
        filename: &str,
        claim_id: &str,
    ) -> Result<ClassifyOutcome, ClassifyError> {
        if doc.is_unreadable() {
            debug!(doc_id = %doc.doc_id, "content unreadable, routing to fallback type");
            return Ok(ClassifyOutcome {
                classification: fallback_classification("unreadable_content"),
                call_id: None,
            });
        }

        let prompt = build_prompt(doc, catalog, filename);
        let invocation = LlmInvocation::new(
            "classification",
            self.config.model.clone(),
            vec![Message::system(ROUTER_SYSTEM_PROMPT), Message::user(prompt)],
        )
        .with_context(Some(doc.doc_id.clone()), Some(claim_id.to_string()))
        .with_temperature(self.config.temperature)
        .with_timeout(self.config.timeout);

        let (result, call_id) = self.backend.invoke_audited(invocation).await?;

        let parsed = parse_router_response(&result.raw_response)
            .map_err(ClassifyError::Exception)?;

        let classification = sanitize(parsed, doc, catalog);
        debug!(
            doc_id = %doc.doc_id,
            doc_type = %classification.doc_type,
            confidence = classification.doc_type_confidence,
            "document classified"
        );

        Ok(ClassifyOutcome {
            classification,
            call_id: Some(call_id),
        })
    }
}

const ROUTER_SYSTEM_PROMPT: &str = "You route insurance claim documents to exactly one type from \
a catalog. Respond with ONLY a JSON object: {\"doc_type\": \"...\", \"confidence\": 0.9, \
\"language\": \"es\", \"signals\": [\"...\", \"...\"], \"summary\": \"...\", \"key_hints\": {}}. \
Give 2 to 5 signals naming the content evidence for your choice. Only include key_hints entries \
(policy_number, claim_reference) when the exact value is visibly present in the text; never guess. \
Decide from the content; the filename is informational only.";

fn build_prompt(doc: &DocText, catalog: &Catalog, filename: &str) -> String {
    let mut prompt = String::from("Catalog of document types:\n");
    for entry in catalog.entries() {
        prompt.push_str(&format!(
            "- {}: {} (cues: {})\n",
            entry.doc_type,
            entry.description,
            entry.cues.join(", ")
        ));
    }

    prompt.push_str(&format!("\nFilename (informational): {filename}\n"));
    prompt.push_str("\nDocument text:\n");

    let mut budget = EXCERPT_LIMIT;
    for page in &doc.pages {
        if budget == 0 {
            break;
        }
        let excerpt: String = page.text.chars().take(budget).collect();
        budget = budget.saturating_sub(excerpt.chars().count());
        prompt.push_str(&format!("--- page {} ---\n{}\n", page.page, excerpt));
    }
    prompt
}

fn parse_router_response(raw: &str) -> Result<RouterResponse, String> {
    let json = extract_json_object(raw).ok_or_else(|| "no JSON object in response".to_string())?;
    serde_json::from_str(json).map_err(|e| format!("router JSON did not match schema: {e}"))
}

/// Enforce the routing contract on whatever the model returned.
fn sanitize(parsed: RouterResponse, doc: &DocText, catalog: &Catalog) -> Classification {
    let known = catalog.contains(&parsed.doc_type);
    if !known {
        warn!(doc_type = %parsed.doc_type, "router returned unknown doc type, using fallback");
        return fallback_classification("unknown_doc_type");
    }

    let mut confidence = parsed.confidence.unwrap_or(0.0).clamp(0.0, 1.0);
    if parsed.doc_type == FALLBACK_DOC_TYPE {
        confidence = confidence.min(0.3);
    }

    let mut signals = parsed.signals;
    signals.truncate(5);
    while signals.len() < 2 {
        signals.push("router_default".to_string());
    }

    // Hints must be literal substrings of the document; drop anything the
    // model could not have read off the page.
    let key_hints: BTreeMap<String, String> = parsed
        .key_hints
        .into_iter()
        .filter(|(_, value)| {
            !value.trim().is_empty()
                && doc.pages.iter().any(|p| p.text.contains(value.as_str()))
        })
        .take(MAX_KEY_HINTS)
        .collect();

    Classification {
        doc_type: parsed.doc_type,
        doc_type_confidence: confidence,
        language: parsed.language.unwrap_or_else(|| "unknown".to_string()),
        signals,
        summary: parsed.summary.unwrap_or_default(),
        key_hints,
    }
}

fn fallback_classification(signal: &str) -> Classification {
    Classification {
        doc_type: FALLBACK_DOC_TYPE.to_string(),
        doc_type_confidence: FALLBACK_CONFIDENCE,
        language: "unknown".to_string(),
        signals: vec![signal.to_string(), "fallback_default".to_string()],
        summary: String::new(),
        key_hints: BTreeMap::new(),
    }
}
