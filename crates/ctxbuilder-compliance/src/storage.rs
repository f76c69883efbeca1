//! Ledger storage backends.
//!
//! Two interchangeable backends sit behind the [`DecisionStorage`] and
//! [`LlmCallStorage`] traits: plaintext JSONL and envelope-encrypted JSONL.
//! The hash chain is computed over plaintext canonical JSON in both, so a
//! chain that verifies on one backend verifies identically on the other.
//!
//! Appends are serialized by an in-process mutex plus an OS-level exclusive
//! file lock around append+fsync, so `previous_hash` linkage stays
//! well-defined even with several processes targeting one workspace.

use crate::chain::{compute_record_hash, verify_chain, LedgerVerifyReport};
use crate::crypto::LineCodec;
use crate::error::ComplianceError;
use crate::records::{DecisionRecord, DecisionType, LlmCallRecord, NewDecision, GENESIS_HASH};
use crate::records::DECISION_SCHEMA_VERSION;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use fd_lock::RwLock as FdRwLock;
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Mutex;
use tracing::trace;
use uuid::Uuid;

/// Query filter for decision lookups.
#[derive(Debug, Clone, Default)]
pub struct DecisionFilter {
    pub decision_type: Option<DecisionType>,
    pub claim_id: Option<String>,
    pub doc_id: Option<String>,
    pub limit: Option<usize>,
}

/// Append-only, hash-chained decision persistence.
pub trait DecisionStorage: Send + Sync {
    /// Append a decision, assigning its chain fields. Returns the stored
    /// record including `record_hash`/`previous_hash`.
    fn append(&self, decision: NewDecision) -> Result<DecisionRecord, ComplianceError>;

    /// Query decisions, newest last, honoring the filter's limit.
    fn query(&self, filter: &DecisionFilter) -> Result<Vec<DecisionRecord>, ComplianceError>;

    fn count(&self) -> Result<usize, ComplianceError>;

    fn get_by_id(&self, decision_id: Uuid) -> Result<Option<DecisionRecord>, ComplianceError>;

    /// Walk the whole ledger and verify the hash chain.
    fn verify(&self) -> Result<LedgerVerifyReport, ComplianceError>;
}

/// Append-only LLM call audit persistence.
pub trait LlmCallStorage: Send + Sync {
    fn append(&self, record: &LlmCallRecord) -> Result<(), ComplianceError>;

    fn count(&self) -> Result<usize, ComplianceError>;

    fn get_by_id(&self, call_id: Uuid) -> Result<Option<LlmCallRecord>, ComplianceError>;
}

/// Shared JSONL mechanics for both backends.
pub(crate) struct JsonlLedger {
    path: Utf8PathBuf,
    codec: Box<dyn LineCodec>,
    append_lock: Mutex<()>,
}

impl JsonlLedger {
    pub(crate) fn new(path: Utf8PathBuf, codec: Box<dyn LineCodec>) -> Self {
        Self {
            path,
            codec,
            append_lock: Mutex::new(()),
        }
    }

    /// Append one record value; `link` receives the last record's hash (or
    /// `GENESIS`) and returns the fully-hashed value to store.
    pub(crate) fn append_linked<F>(&self, link: F) -> Result<Value, ComplianceError>
    where
        F: FnOnce(&str) -> Result<Value, ComplianceError>,
    {
        let _guard = self
            .append_lock
            .lock()
            .map_err(|_| ComplianceError::Lock("append mutex poisoned".to_string()))?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent.as_std_path())?;
        }

        let file = OpenOptions::new()
            .read(true)
            .create(true)
            .append(true)
            .open(self.path.as_std_path())?;
        let mut os_lock = FdRwLock::new(file);
        let mut guard = os_lock
            .write()
            .map_err(|e| ComplianceError::Lock(format!("file lock failed: {e}")))?;

        // Pick up appends made by other processes since our last write.
        let previous_hash = {
            let mut content = String::new();
            guard.seek(SeekFrom::Start(0))?;
            guard.read_to_string(&mut content)?;
            match content.lines().filter(|l| !l.trim().is_empty()).last() {
                Some(line) => {
                    let decoded = self.codec.decode(line)?;
                    let value: Value = serde_json::from_str(&decoded)?;
                    value
                        .get("record_hash")
                        .and_then(Value::as_str)
                        .unwrap_or(GENESIS_HASH)
                        .to_string()
                }
                None => GENESIS_HASH.to_string(),
            }
        };

        let record = link(&previous_hash)?;
        let plaintext = serde_json::to_string(&record)?;
        let line = self.codec.encode(&plaintext)?;

        guard.write_all(line.as_bytes())?;
        guard.write_all(b"\n")?;
        guard.flush()?;
        guard.sync_all()?;
        trace!(path = %self.path, "ledger append flushed");

        Ok(record)
    }

    /// Append without chain linkage (LLM call log).
    pub(crate) fn append_plain(&self, value: &Value) -> Result<(), ComplianceError> {
        self.append_linked(|_| Ok(value.clone())).map(|_| ())
    }

    /// Read and decode every record.
    pub(crate) fn read_all(&self) -> Result<Vec<Value>, ComplianceError> {
        let Ok(mut file) = File::open(self.path.as_std_path()) else {
            return Ok(Vec::new());
        };
        let mut content = String::new();
        file.read_to_string(&mut content)?;

        let mut values = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            let decoded = self.codec.decode(line)?;
            values.push(serde_json::from_str(&decoded)?);
        }
        Ok(values)
    }

    /// Verify the chain, reporting the first undecodable or unparseable
    /// line as the break point.
    pub(crate) fn verify(&self) -> Result<LedgerVerifyReport, ComplianceError> {
        let Ok(mut file) = File::open(self.path.as_std_path()) else {
            return Ok(LedgerVerifyReport::valid(0));
        };
        let mut content = String::new();
        file.read_to_string(&mut content)?;

        let lines: Vec<&str> = content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .collect();

        let mut values = Vec::new();
        for (idx, line) in lines.iter().enumerate() {
            let decoded = match self.codec.decode(line) {
                Ok(d) => d,
                Err(ComplianceError::Crypto(_)) => {
                    return Ok(LedgerVerifyReport::broken(lines.len(), idx, "decrypt_failed"));
                }
                Err(e) => return Err(e),
            };
            match serde_json::from_str::<Value>(&decoded) {
                Ok(v) => values.push(v),
                Err(_) => {
                    return Ok(LedgerVerifyReport::broken(lines.len(), idx, "parse_failed"));
                }
            }
        }

        verify_chain(&values)
    }
}

/// Decision ledger over a [`JsonlLedger`].
pub struct DecisionLedger {
    ledger: JsonlLedger,
}

impl DecisionLedger {
    /// Plaintext JSONL backend (`file`).
    #[must_use]
    pub fn open(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            ledger: JsonlLedger::new(path.into(), Box::new(crate::crypto::PlainCodec)),
        }
    }

    /// Envelope-encrypted backend (`encrypted_file`).
    ///
    /// # Errors
    ///
    /// Fails when the key file is missing or malformed.
    pub fn open_encrypted(
        path: impl Into<Utf8PathBuf>,
        key_path: &Utf8Path,
    ) -> Result<Self, ComplianceError> {
        let codec = crate::crypto::EnvelopeCodec::from_key_file(key_path)?;
        Ok(Self {
            ledger: JsonlLedger::new(path.into(), Box::new(codec)),
        })
    }
}

impl DecisionStorage for DecisionLedger {
    fn append(&self, decision: NewDecision) -> Result<DecisionRecord, ComplianceError> {
        let value = self.ledger.append_linked(|previous_hash| {
            let mut record = DecisionRecord {
                schema_version: DECISION_SCHEMA_VERSION.to_string(),
                decision_id: Uuid::new_v4(),
                decision_type: decision.decision_type,
                timestamp: Utc::now(),
                claim_id: decision.claim_id.clone(),
                doc_id: decision.doc_id.clone(),
                actor_type: decision.actor_type,
                actor_id: decision.actor_id.clone(),
                rationale: decision.rationale.clone(),
                outcome: decision.outcome.clone(),
                version_bundle_id: decision.version_bundle_id.clone(),
                call_id: decision.call_id,
                pii_refs: decision.pii_refs.clone(),
                record_hash: String::new(),
                previous_hash: previous_hash.to_string(),
            };
            record.record_hash = compute_record_hash(&record)?;
            Ok(serde_json::to_value(&record)?)
        })?;

        Ok(serde_json::from_value(value)?)
    }

    fn query(&self, filter: &DecisionFilter) -> Result<Vec<DecisionRecord>, ComplianceError> {
        let mut records: Vec<DecisionRecord> = self
            .ledger
            .read_all()?
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .filter(|r: &DecisionRecord| {
                filter
                    .decision_type
                    .map_or(true, |t| r.decision_type == t)
                    && filter
                        .claim_id
                        .as_deref()
                        .map_or(true, |c| r.claim_id.as_deref() == Some(c))
                    && filter
                        .doc_id
                        .as_deref()
                        .map_or(true, |d| r.doc_id.as_deref() == Some(d))
            })
            .collect();

        if let Some(limit) = filter.limit {
            let start = records.len().saturating_sub(limit);
            records = records.split_off(start);
        }
        Ok(records)
    }

    fn count(&self) -> Result<usize, ComplianceError> {
        Ok(self.ledger.read_all()?.len())
    }

    fn get_by_id(&self, decision_id: Uuid) -> Result<Option<DecisionRecord>, ComplianceError> {
        Ok(self
            .ledger
            .read_all()?
            .into_iter()
            .filter_map(|v| serde_json::from_value::<DecisionRecord>(v).ok())
            .find(|r| r.decision_id == decision_id))
    }

    fn verify(&self) -> Result<LedgerVerifyReport, ComplianceError> {
        self.ledger.verify()
    }
}

/// LLM call audit log over a [`JsonlLedger`]. Not hash-chained; the
/// decision ledger's `call_id` references provide the linkage.
pub struct LlmCallLog {
    ledger: JsonlLedger,
}

impl LlmCallLog {
    #[must_use]
    pub fn open(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            ledger: JsonlLedger::new(path.into(), Box::new(crate::crypto::PlainCodec)),
        }
    }

    /// # Errors
    ///
    /// Fails when the key file is missing or malformed.
    pub fn open_encrypted(
        path: impl Into<Utf8PathBuf>,
        key_path: &Utf8Path,
    ) -> Result<Self, ComplianceError> {
        let codec = crate::crypto::EnvelopeCodec::from_key_file(key_path)?;
        Ok(Self {
            ledger: JsonlLedger::new(path.into(), Box::new(codec)),
        })
    }
}

impl LlmCallStorage for LlmCallLog {
    fn append(&self, record: &LlmCallRecord) -> Result<(), ComplianceError> {
        self.ledger.append_plain(&serde_json::to_value(record)?)
    }

    fn count(&self) -> Result<usize, ComplianceError> {
        Ok(self.ledger.read_all()?.len())
    }

    fn get_by_id(&self, call_id: Uuid) -> Result<Option<LlmCallRecord>, ComplianceError> {
        Ok(self
            .ledger
            .read_all()?
            .into_iter()
            .filter_map(|v| serde_json::from_value::<LlmCallRecord>(v).ok())
            .find(|r| r.call_id == call_id))
    }
}
