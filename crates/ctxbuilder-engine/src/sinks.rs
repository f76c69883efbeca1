//! Compliance sinks as the pipeline sees them.
//!
//! The contract: compliance failures never raise into document processing.
//! Every sink error lands in a side log; an unflushable decision ledger
//! flips `ledger_healthy` so the orchestrator withholds `.complete`.

use camino::Utf8PathBuf;
use chrono::Utc;
use ctxbuilder_compliance::{
    DecisionContext, DecisionRecord, DecisionStorage, LlmCallRecord, LlmCallStorage, NewDecision,
    RecordedMessage, RecordedTokenUsage, ResponseOutcome,
};
use ctxbuilder_llm::{AttemptLog, LlmCallObserver, Role};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, warn};

/// Both compliance sinks plus the side log, shared across doc tasks.
pub struct ComplianceSinks {
    decisions: Arc<dyn DecisionStorage>,
    llm_calls: Arc<dyn LlmCallStorage>,
    side_log_path: Utf8PathBuf,
    ledger_healthy: AtomicBool,
}

impl ComplianceSinks {
    #[must_use]
    pub fn new(
        decisions: Arc<dyn DecisionStorage>,
        llm_calls: Arc<dyn LlmCallStorage>,
        side_log_path: Utf8PathBuf,
    ) -> Self {
        Self {
            decisions,
            llm_calls,
            side_log_path,
            ledger_healthy: AtomicBool::new(true),
        }
    }

    /// Record a decision; failures are contained and mark the ledger
    /// unhealthy.
    pub fn record_decision(&self, decision: NewDecision) -> Option<DecisionRecord> {
        match self.decisions.append(decision) {
            Ok(record) => Some(record),
            Err(e) => {
                self.ledger_healthy.store(false, Ordering::SeqCst);
                self.side_log(&format!("decision append failed: {e}"));
                error!(error = %e, "decision ledger append failed; run will not commit");
                None
            }
        }
    }

    /// Whether every ledger append so far has flushed.
    #[must_use]
    pub fn ledger_healthy(&self) -> bool {
        self.ledger_healthy.load(Ordering::SeqCst)
    }

    pub(crate) fn record_llm_call(&self, record: &LlmCallRecord) {
        if let Err(e) = self.llm_calls.append(record) {
            self.side_log(&format!("llm call append failed: {e}"));
            warn!(error = %e, "LLM audit append failed");
        }
    }

    fn side_log(&self, line: &str) {
        if let Some(parent) = self.side_log_path.parent() {
            let _ = std::fs::create_dir_all(parent.as_std_path());
        }
        if let Ok(mut file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.side_log_path.as_std_path())
        {
            let _ = writeln!(file, "{} {line}", Utc::now().to_rfc3339());
        }
    }
}

/// Adapter feeding every LLM attempt into the audit log.
pub struct AuditSink {
    sinks: Arc<ComplianceSinks>,
}

impl AuditSink {
    #[must_use]
    pub fn new(sinks: Arc<ComplianceSinks>) -> Self {
        Self { sinks }
    }
}

impl LlmCallObserver for AuditSink {
    fn record_attempt(&self, log: &AttemptLog) -> Result<(), String> {
        let record = LlmCallRecord {
            call_id: log.call_id,
            timestamp: log.timestamp,
            model: log.model.clone(),
            parameters: [
                (
                    "temperature".to_string(),
                    serde_json::json!(log.temperature),
                ),
                ("max_tokens".to_string(), serde_json::json!(log.max_tokens)),
                ("attempt".to_string(), serde_json::json!(log.attempt)),
            ]
            .into_iter()
            .collect(),
            messages: log
                .messages
                .iter()
                .map(|m| RecordedMessage {
                    role: match m.role {
                        Role::System => "system".to_string(),
                        Role::User => "user".to_string(),
                        Role::Assistant => "assistant".to_string(),
                    },
                    content: m.content.clone(),
                })
                .collect(),
            response: match &log.response {
                Ok(text) => ResponseOutcome::Text(text.clone()),
                Err(err) => ResponseOutcome::Error(err.clone()),
            },
            token_usage: log.token_usage.map(|u| RecordedTokenUsage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
            }),
            latency_ms: log.latency_ms,
            decision_context: DecisionContext {
                doc_id: log.doc_id.clone(),
                claim_id: log.claim_id.clone(),
                purpose: log.purpose.clone(),
            },
        };

        self.sinks.record_llm_call(&record);
        Ok(())
    }
}
