//! Stable error-code taxonomy shared across the pipeline.
//!
//! Every per-document failure recorded in artifacts carries one of these
//! codes. The string forms are part of the on-disk contract: they appear in
//! `summary.json`, extraction results, and the decision ledger, and metrics
//! aggregate over them. Do not rename variants.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

/// Stable error codes for per-document and per-run failures.
///
/// `VISION_RECOMMENDED` is deliberately absent: recommending a vision
/// fallback is a flag on the extraction result, not an error.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Source file type is not handled by any ingestion provider.
    DocNotSupported,
    /// No canonical text exists for the document.
    TextMissing,
    /// Canonical text exists but is unusable (garbled, empty pages).
    TextUnreadable,
    /// Classifier produced a result below the confidence threshold.
    ClassifyLowConf,
    /// Classifier raised or returned an unparseable response.
    ClassifyException,
    /// Extractor response failed schema validation after one repair attempt.
    ExtractSchemaInvalid,
    /// Extractor raised for a reason other than schema validity.
    ExtractException,
    /// An artifact could not be written to the run folder.
    OutputWriteFailed,
    /// A stage exceeded its hard timeout.
    Timeout,
    /// Provider rate limit exhausted after retries.
    RateLimited,
    /// Required configuration (keys, endpoints, spec files) is absent.
    ConfigMissing,
    /// Anything not captured by a more specific code.
    UnknownException,
}

impl ErrorCode {
    /// Whether a failure with this code is worth retrying locally.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::RateLimited | Self::Timeout)
    }
}

/// Errors raised by the shared utility layer itself.
#[derive(Debug, Error)]
pub enum UtilError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("canonicalization failed: {reason}")]
    Canonicalization { reason: String },

    #[error("invalid run id '{value}': {reason}")]
    InvalidRunId { value: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn error_codes_serialize_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::ExtractSchemaInvalid).unwrap();
        assert_eq!(json, "\"EXTRACT_SCHEMA_INVALID\"");
        let json = serde_json::to_string(&ErrorCode::ClassifyLowConf).unwrap();
        assert_eq!(json, "\"CLASSIFY_LOW_CONF\"");
    }

    #[test]
    fn error_codes_round_trip_through_strings() {
        for code in [
            ErrorCode::DocNotSupported,
            ErrorCode::TextMissing,
            ErrorCode::TextUnreadable,
            ErrorCode::ClassifyLowConf,
            ErrorCode::ClassifyException,
            ErrorCode::ExtractSchemaInvalid,
            ErrorCode::ExtractException,
            ErrorCode::OutputWriteFailed,
            ErrorCode::Timeout,
            ErrorCode::RateLimited,
            ErrorCode::ConfigMissing,
            ErrorCode::UnknownException,
        ] {
            let s = code.to_string();
            assert_eq!(ErrorCode::from_str(&s).unwrap(), code);
        }
    }

    #[test]
    fn transient_codes() {
        assert!(ErrorCode::RateLimited.is_transient());
        assert!(ErrorCode::Timeout.is_transient());
        assert!(!ErrorCode::ExtractSchemaInvalid.is_transient());
    }
}
