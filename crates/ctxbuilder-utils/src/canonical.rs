//! Canonical JSON and content hashing.
//!
//! Hashes must be computed over canonical bytes, never pretty-printed JSON.
//! JCS (RFC 8785) gives deterministic output regardless of struct field
//! ordering, which is what makes the decision-ledger chain and the
//! spec/prompt hashes reproducible across processes.

use crate::error::UtilError;
use md5::Md5;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Emit a value as JCS-canonical JSON (RFC 8785).
pub fn emit_jcs<T: Serialize>(value: &T) -> Result<String, UtilError> {
    let json_value = serde_json::to_value(value)?;
    let bytes = serde_json_canonicalizer::to_vec(&json_value).map_err(|e| {
        UtilError::Canonicalization {
            reason: e.to_string(),
        }
    })?;
    String::from_utf8(bytes).map_err(|e| UtilError::Canonicalization {
        reason: format!("JCS output contained invalid UTF-8: {e}"),
    })
}

/// SHA-256 hex digest of the JCS-canonical JSON of a value.
pub fn sha256_canonical_json<T: Serialize>(value: &T) -> Result<String, UtilError> {
    Ok(sha256_hex(emit_jcs(value)?.as_bytes()))
}

/// SHA-256 hex digest of raw bytes.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// MD5 hex digest of raw bytes.
///
/// Used only as a stable content identifier (`doc_id`, `text_md5`), never
/// for integrity; the ledger chain uses SHA-256.
#[must_use]
pub fn md5_hex(bytes: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Ordered {
        b: u32,
        a: u32,
    }

    #[derive(Serialize)]
    struct Reordered {
        a: u32,
        b: u32,
    }

    #[test]
    fn canonical_hash_ignores_field_order() {
        let x = sha256_canonical_json(&Ordered { b: 2, a: 1 }).unwrap();
        let y = sha256_canonical_json(&Reordered { a: 1, b: 2 }).unwrap();
        assert_eq!(x, y);
    }

    #[test]
    fn jcs_sorts_keys_and_strips_whitespace() {
        let json = emit_jcs(&Ordered { b: 2, a: 1 }).unwrap();
        assert_eq!(json, r#"{"a":1,"b":2}"#);
    }

    #[test]
    fn md5_matches_known_vector() {
        // RFC 1321 test vector.
        assert_eq!(md5_hex(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn sha256_matches_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
