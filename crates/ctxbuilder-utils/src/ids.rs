//! Identifier generation and validation.
//!
//! `doc_id` is the md5 of the raw source bytes, stable across reruns and
//! claims. Run ids are `YYYYMMDDThhmmssZ_<suffix>` where the suffix is a
//! short git sha when available, otherwise a random hex tag.

use crate::canonical::md5_hex;
use crate::error::UtilError;
use chrono::{DateTime, Utc};
use rand::Rng;

/// Length of the random run-id suffix when no git sha is supplied.
const RANDOM_SUFFIX_LEN: usize = 7;

/// Compute the document identifier for raw source bytes.
#[must_use]
pub fn doc_id_from_bytes(raw: &[u8]) -> String {
    md5_hex(raw)
}

/// Generate a run id for the given instant.
///
/// `suffix` is typically a short git sha; pass `None` to get a random tag.
#[must_use]
pub fn new_run_id(now: DateTime<Utc>, suffix: Option<&str>) -> String {
    let stamp = now.format("%Y%m%dT%H%M%SZ");
    match suffix {
        Some(s) if !s.is_empty() => format!("{stamp}_{s}"),
        _ => {
            let mut rng = rand::thread_rng();
            let tag: String = (0..RANDOM_SUFFIX_LEN)
                .map(|_| char::from_digit(rng.gen_range(0..16), 16).unwrap_or('0'))
                .collect();
            format!("{stamp}_{tag}")
        }
    }
}

/// Validate a caller-supplied run id.
///
/// Accepts the `YYYYMMDDThhmmssZ_<suffix>` shape with a non-empty suffix of
/// filesystem-safe characters.
pub fn validate_run_id(value: &str) -> Result<(), UtilError> {
    let Some((stamp, suffix)) = value.split_once('_') else {
        return Err(UtilError::InvalidRunId {
            value: value.to_string(),
            reason: "missing '_' separator".to_string(),
        });
    };

    if chrono::NaiveDateTime::parse_from_str(stamp, "%Y%m%dT%H%M%SZ").is_err() {
        return Err(UtilError::InvalidRunId {
            value: value.to_string(),
            reason: "timestamp must be YYYYMMDDThhmmssZ".to_string(),
        });
    }

    if suffix.is_empty()
        || !suffix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
    {
        return Err(UtilError::InvalidRunId {
            value: value.to_string(),
            reason: "suffix must be non-empty and filesystem-safe".to_string(),
        });
    }

    Ok(())
}
