//! Deterministic scripted backend.
//!
//! Returns canned outcomes in order, then repeats the last one. Used by the
//! pipeline's integration tests and by `--dry-run`, where no provider call
//! may leave the process.

use crate::types::{LlmBackend, LlmError, LlmInvocation, LlmResult, TokenUsage};
use async_trait::async_trait;
use std::sync::Mutex;

type ScriptEntry = Result<String, LlmError>;

pub struct ScriptedBackend {
    script: Mutex<Vec<ScriptEntry>>,
    invocations: Mutex<Vec<LlmInvocation>>,
}

impl ScriptedBackend {
    /// Backend that answers with the given responses in order.
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self::with_script(responses.into_iter().map(Ok).collect())
    }

    /// Backend with full control over per-call outcomes.
    #[must_use]
    pub fn with_script(script: Vec<ScriptEntry>) -> Self {
        let mut script = script;
        script.reverse();
        Self {
            script: Mutex::new(script),
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Invocations observed so far, for assertions on prompts.
    #[must_use]
    pub fn recorded_invocations(&self) -> Vec<LlmInvocation> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    fn provider(&self) -> &str {
        "scripted"
    }

    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        self.invocations.lock().unwrap().push(inv.clone());

        let entry = {
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop().unwrap_or_else(|| Ok(String::new()))
            } else if let Some(last) = script.last() {
                // Keep replaying the final entry so long runs stay scripted.
                clone_entry(last)
            } else {
                Err(LlmError::InvalidResponse("script exhausted".to_string()))
            }
        };

        entry.map(|raw_response| LlmResult {
            raw_response,
            provider: "scripted".to_string(),
            model_used: inv.model,
            token_usage: Some(TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            }),
            latency_ms: 1,
        })
    }
}

fn clone_entry(entry: &ScriptEntry) -> ScriptEntry {
    match entry {
        Ok(s) => Ok(s.clone()),
        Err(e) => Err(clone_error(e)),
    }
}

fn clone_error(e: &LlmError) -> LlmError {
    match e {
        LlmError::Misconfiguration(s) => LlmError::Misconfiguration(s.clone()),
        LlmError::Transport(s) => LlmError::Transport(s.clone()),
        LlmError::ProviderAuth(s) => LlmError::ProviderAuth(s.clone()),
        LlmError::ProviderQuota(s) => LlmError::ProviderQuota(s.clone()),
        LlmError::ProviderOutage(s) => LlmError::ProviderOutage(s.clone()),
        LlmError::Timeout { duration } => LlmError::Timeout {
            duration: *duration,
        },
        LlmError::InvalidResponse(s) => LlmError::InvalidResponse(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    #[tokio::test]
    async fn scripted_responses_in_order_then_repeat_last() {
        let backend = ScriptedBackend::with_responses(vec!["a".into(), "b".into()]);
        let inv = LlmInvocation::new("classification", "m", vec![Message::user("x")]);

        assert_eq!(backend.invoke(inv.clone()).await.unwrap().raw_response, "a");
        assert_eq!(backend.invoke(inv.clone()).await.unwrap().raw_response, "b");
        assert_eq!(backend.invoke(inv.clone()).await.unwrap().raw_response, "b");
        assert_eq!(backend.recorded_invocations().len(), 3);
    }
}
