//! Hash-chain computation and verification.
//!
//! `record_hash = SHA-256(canonical_json(record without hash fields))`, and
//! each record's `previous_hash` must equal the prior record's
//! `record_hash` (`"GENESIS"` for the first). The hash is always computed
//! over plaintext canonical JSON, so verification gives the same answer on
//! the plaintext and encrypted backends.

use crate::error::ComplianceError;
use crate::records::GENESIS_HASH;
use serde::Serialize;
use serde_json::Value;

/// Verification outcome, shaped for the reviewer API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerVerifyReport {
    pub valid: bool,
    pub record_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub break_at: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl LedgerVerifyReport {
    #[must_use]
    pub fn valid(record_count: usize) -> Self {
        Self {
            valid: true,
            record_count,
            break_at: None,
            reason: None,
        }
    }

    #[must_use]
    pub fn broken(record_count: usize, break_at: usize, reason: &str) -> Self {
        Self {
            valid: false,
            record_count,
            break_at: Some(break_at),
            reason: Some(reason.to_string()),
        }
    }
}

/// Compute the content hash of a record, excluding both hash fields.
pub fn compute_record_hash<T: Serialize>(record: &T) -> Result<String, ComplianceError> {
    let mut value = serde_json::to_value(record)?;
    strip_hash_fields(&mut value);
    ctxbuilder_utils::canonical::sha256_canonical_json(&value)
        .map_err(|e| ComplianceError::Canonicalization(e.to_string()))
}

fn strip_hash_fields(value: &mut Value) {
    if let Value::Object(map) = value {
        map.remove("record_hash");
        map.remove("previous_hash");
    }
}

/// Walk already-decrypted record values and verify the chain.
///
/// Fails at the first record whose linkage or content hash does not hold,
/// reporting the 0-based index. An empty sequence is valid.
pub fn verify_chain(records: &[Value]) -> Result<LedgerVerifyReport, ComplianceError> {
    let mut expected_previous = GENESIS_HASH.to_string();

    for (idx, record) in records.iter().enumerate() {
        let Some(obj) = record.as_object() else {
            return Ok(LedgerVerifyReport::broken(records.len(), idx, "parse_failed"));
        };

        let previous_hash = obj.get("previous_hash").and_then(Value::as_str);
        let record_hash = obj.get("record_hash").and_then(Value::as_str);
        let (Some(previous_hash), Some(record_hash)) = (previous_hash, record_hash) else {
            return Ok(LedgerVerifyReport::broken(records.len(), idx, "parse_failed"));
        };

        if previous_hash != expected_previous {
            return Ok(LedgerVerifyReport::broken(records.len(), idx, "chain_broken"));
        }

        let computed = compute_record_hash(record)?;
        if computed != record_hash {
            return Ok(LedgerVerifyReport::broken(records.len(), idx, "hash_mismatch"));
        }

        expected_previous = record_hash.to_string();
    }

    Ok(LedgerVerifyReport::valid(records.len()))
}
