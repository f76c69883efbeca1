//! Audit observation and the retry policy.
//!
//! Every network attempt is one audit record, written before the result is
//! handed back to the caller. The retry loop therefore lives here rather
//! than inside the HTTP client: retrying inside a single invocation would
//! collapse several provider calls into one record and break replay.

use crate::types::{LlmBackend, LlmError, LlmInvocation, LlmResult, Message, TokenUsage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Minimum number of attempts for retryable failures.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Base backoff; attempt n sleeps `base * 2^(n-1)` plus jitter.
const BASE_BACKOFF: Duration = Duration::from_millis(500);

/// Everything the audit sink needs about one attempt.
#[derive(Debug, Clone)]
pub struct AttemptLog {
    pub call_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub messages: Vec<Message>,
    /// Raw response text, or the error display for failed attempts.
    pub response: Result<String, String>,
    pub token_usage: Option<TokenUsage>,
    pub latency_ms: u64,
    pub purpose: String,
    pub doc_id: Option<String>,
    pub claim_id: Option<String>,
    pub attempt: u32,
}

/// Sink observing every LLM attempt.
///
/// Implementations must not raise into the pipeline; the wrapper ignores
/// the return value beyond logging it.
pub trait LlmCallObserver: Send + Sync {
    /// Record one attempt. Called before the attempt's result is returned.
    fn record_attempt(&self, log: &AttemptLog) -> Result<(), String>;
}

/// Observer that drops every record; used in tests and dry runs.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl LlmCallObserver for NoopObserver {
    fn record_attempt(&self, _log: &AttemptLog) -> Result<(), String> {
        Ok(())
    }
}

/// Backend wrapper adding audit records and the retry policy.
pub struct AuditedBackend {
    inner: Arc<dyn LlmBackend>,
    observer: Arc<dyn LlmCallObserver>,
    max_attempts: u32,
}

impl AuditedBackend {
    #[must_use]
    pub fn new(inner: Arc<dyn LlmBackend>, observer: Arc<dyn LlmCallObserver>) -> Self {
        Self {
            inner,
            observer,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Invoke with retries; returns the last result and the call id of the
    /// attempt that produced it, for decision records to reference.
    ///
    /// # Errors
    ///
    /// Returns the final attempt's error once retryable attempts are
    /// exhausted, or immediately for non-retryable failures.
    pub async fn invoke_audited(&self, inv: LlmInvocation) -> Result<(LlmResult, Uuid), LlmError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let call_id = Uuid::new_v4();
            let started = Utc::now();

            let outcome = self.inner.invoke(inv.clone()).await;

            let log = AttemptLog {
                call_id,
                timestamp: started,
                model: inv.model.clone(),
                temperature: inv.temperature,
                max_tokens: inv.max_tokens,
                messages: inv.messages.clone(),
                response: match &outcome {
                    Ok(r) => Ok(r.raw_response.clone()),
                    Err(e) => Err(e.to_string()),
                },
                token_usage: outcome.as_ref().ok().and_then(|r| r.token_usage),
                latency_ms: outcome.as_ref().map(|r| r.latency_ms).unwrap_or_default(),
                purpose: inv.purpose.clone(),
                doc_id: inv.doc_id.clone(),
                claim_id: inv.claim_id.clone(),
                attempt,
            };
            if let Err(sink_err) = self.observer.record_attempt(&log) {
                // Sink failures never fail the call; the orchestrator decides
                // what an unflushable audit trail means for run commitment.
                warn!(error = %sink_err, "LLM audit sink failed to record attempt");
            }

            match outcome {
                Ok(result) => return Ok((result, call_id)),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let backoff = jittered_backoff(attempt);
                    debug!(
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "retrying LLM call"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl LlmBackend for AuditedBackend {
    fn provider(&self) -> &str {
        self.inner.provider()
    }

    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        self.invoke_audited(inv).await.map(|(result, _)| result)
    }
}

/// Exponential backoff with up to 50% random jitter.
fn jittered_backoff(attempt: u32) -> Duration {
    let base = BASE_BACKOFF * 2u32.saturating_pow(attempt.saturating_sub(1));
    let jitter = rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 2);
    base + Duration::from_millis(jitter)
}
