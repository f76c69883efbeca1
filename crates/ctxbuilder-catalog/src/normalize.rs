//! Field normalizers and validators.
//!
//! Normalization is applied once, here, and the normalized value is what
//! both the reviewer UI comparison and the metrics aggregator consume. A
//! divergence between those two surfaces is a bug in this module, nowhere
//! else.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Names accepted in a spec's `field_rules.*.normalize`.
pub const NORMALIZER_NAMES: &[&str] = &[
    "date_to_iso",
    "uppercase_trim",
    "trim",
    "plate_normalize",
    "amount_normalize",
];

/// Names accepted in a spec's `field_rules.*.validate`.
pub const VALIDATOR_NAMES: &[&str] = &["is_iso_date", "non_empty", "is_amount", "is_plate"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("unknown normalizer '{0}'")]
    UnknownNormalizer(String),

    #[error("unknown validator '{0}'")]
    UnknownValidator(String),
}

/// Values an extractor may emit that all mean "nothing was found".
#[must_use]
pub fn is_missing_value(raw: &str) -> bool {
    let t = raw.trim();
    t.is_empty() || t.eq_ignore_ascii_case("n/a") || t.eq_ignore_ascii_case("null")
}

/// Apply a named normalizer to a raw extracted value.
///
/// Normalizers are total: input that cannot be normalized comes back
/// trimmed rather than erroring, and the paired validator decides whether
/// the field survives.
pub fn normalize_value(normalizer: &str, raw: &str) -> Result<String, NormalizeError> {
    match normalizer {
        "date_to_iso" => Ok(date_to_iso(raw)),
        "uppercase_trim" => Ok(raw.trim().to_uppercase()),
        "trim" => Ok(collapse_inner_whitespace(raw.trim())),
        "plate_normalize" => Ok(plate_normalize(raw)),
        "amount_normalize" => Ok(amount_normalize(raw)),
        other => Err(NormalizeError::UnknownNormalizer(other.to_string())),
    }
}

/// Apply a named validator to a normalized value.
pub fn validate_value(validator: &str, normalized: &str) -> Result<bool, NormalizeError> {
    match validator {
        "is_iso_date" => Ok(ISO_DATE.is_match(normalized)),
        "non_empty" => Ok(!normalized.trim().is_empty()),
        "is_amount" => Ok(AMOUNT.is_match(normalized)),
        "is_plate" => Ok(PLATE.is_match(normalized)),
        other => Err(NormalizeError::UnknownValidator(other.to_string())),
    }
}

static ISO_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());
static AMOUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+(\.\d{1,2})?$").unwrap());
static PLATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z0-9]{4,10}$").unwrap());

static DMY_SLASH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})[/.\-](\d{1,2})[/.\-](\d{4})$").unwrap());
static YMD_DASH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})[/.\-](\d{1,2})[/.\-](\d{1,2})$").unwrap());
// "8 de febrero de 2024" / "8 febrero 2024"
static SPANISH_LONG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i)(\d{1,2})\s+(?:de\s+)?([a-zñ]+)\s+(?:de(?:l)?\s+)?(\d{4})$").unwrap()
});
// "February 8, 2024"
static ENGLISH_LONG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?i)([a-z]+)\s+(\d{1,2}),?\s+(\d{4})$").unwrap());

/// Normalize the date formats seen in claim documents to `YYYY-MM-DD`.
///
/// Handles numeric day-first (`13/01/2024`), ISO-ish year-first, and written
/// month names in Spanish and English. Anything unrecognized is returned
/// trimmed so the validator can reject it.
fn date_to_iso(raw: &str) -> String {
    let t = raw.trim();

    if let Some(c) = YMD_DASH.captures(t) {
        return format_iso(&c[1], &c[2], &c[3]);
    }
    if let Some(c) = DMY_SLASH.captures(t) {
        return format_iso(&c[3], &c[2], &c[1]);
    }
    if let Some(c) = SPANISH_LONG.captures(t) {
        if let Some(month) = month_number(&c[2]) {
            return format_iso(&c[3], &month.to_string(), &c[1]);
        }
    }
    if let Some(c) = ENGLISH_LONG.captures(t) {
        if let Some(month) = month_number(&c[1]) {
            return format_iso(&c[3], &month.to_string(), &c[2]);
        }
    }

    t.to_string()
}

fn format_iso(year: &str, month: &str, day: &str) -> String {
    format!(
        "{year}-{:02}-{:02}",
        month.parse::<u32>().unwrap_or(0),
        day.parse::<u32>().unwrap_or(0)
    )
}

/// Month name to number, Spanish and English, full names and common
/// three-letter abbreviations.
fn month_number(name: &str) -> Option<u32> {
    let n = name.to_lowercase();
    let table: &[(&str, u32)] = &[
        ("enero", 1),
        ("febrero", 2),
        ("marzo", 3),
        ("abril", 4),
        ("mayo", 5),
        ("junio", 6),
        ("julio", 7),
        ("agosto", 8),
        ("septiembre", 9),
        ("setiembre", 9),
        ("octubre", 10),
        ("noviembre", 11),
        ("diciembre", 12),
        ("january", 1),
        ("february", 2),
        ("march", 3),
        ("april", 4),
        ("may", 5),
        ("june", 6),
        ("july", 7),
        ("august", 8),
        ("september", 9),
        ("october", 10),
        ("november", 11),
        ("december", 12),
    ];

    for (candidate, num) in table {
        if n == *candidate {
            return Some(*num);
        }
    }
    // Three-letter abbreviations ("ene", "feb", "jan", ...).
    if n.len() == 3 {
        for (candidate, num) in table {
            if candidate.starts_with(&n) {
                return Some(*num);
            }
        }
    }
    None
}

fn plate_normalize(raw: &str) -> String {
    raw.trim()
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Strip currency symbols and thousands separators; emit a dot-decimal
/// number. `1.250,00 EUR` and `$1,250.00` both become `1250.00`.
fn amount_normalize(raw: &str) -> String {
    let digits: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    if digits.is_empty() {
        return raw.trim().to_string();
    }

    let last_dot = digits.rfind('.');
    let last_comma = digits.rfind(',');
    let decimal_sep = match (last_dot, last_comma) {
        (Some(d), Some(c)) => Some(if d > c { '.' } else { ',' }),
        (Some(_), None) => Some('.'),
        (None, Some(_)) => Some(','),
        (None, None) => None,
    };

    match decimal_sep {
        Some(sep) => {
            let idx = digits.rfind(sep).unwrap_or(digits.len());
            let (int_part, frac_part) = digits.split_at(idx);
            let frac_digits: String = frac_part.chars().filter(char::is_ascii_digit).collect();
            let int_digits: String = int_part.chars().filter(char::is_ascii_digit).collect();
            // A trailing group of exactly three digits after the separator is
            // a thousands group, not a decimal fraction.
            if frac_digits.len() == 3 {
                format!("{int_digits}{frac_digits}")
            } else {
                format!("{int_digits}.{frac_digits}")
            }
        }
        None => digits,
    }
}

fn collapse_inner_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_day_first_slash() {
        assert_eq!(normalize_value("date_to_iso", "13/01/2024").unwrap(), "2024-01-13");
        assert_eq!(normalize_value("date_to_iso", "5-2-2024").unwrap(), "2024-02-05");
    }

    #[test]
    fn date_year_first() {
        assert_eq!(normalize_value("date_to_iso", "2024-01-13").unwrap(), "2024-01-13");
        assert_eq!(normalize_value("date_to_iso", "2024/1/3").unwrap(), "2024-01-03");
    }

    #[test]
    fn date_spanish_month_names() {
        assert_eq!(
            normalize_value("date_to_iso", "8 de febrero de 2024").unwrap(),
            "2024-02-08"
        );
        assert_eq!(
            normalize_value("date_to_iso", "13 enero 2024").unwrap(),
            "2024-01-13"
        );
    }

    #[test]
    fn date_english_month_names() {
        assert_eq!(
            normalize_value("date_to_iso", "February 8, 2024").unwrap(),
            "2024-02-08"
        );
        assert_eq!(
            normalize_value("date_to_iso", "8 March 2024").unwrap(),
            "2024-03-08"
        );
    }

    #[test]
    fn unparseable_date_fails_validation() {
        let normalized = normalize_value("date_to_iso", "next tuesday").unwrap();
        assert!(!validate_value("is_iso_date", &normalized).unwrap());
    }

    #[test]
    fn plate_strips_separators() {
        assert_eq!(
            normalize_value("plate_normalize", " ab-123 cd ").unwrap(),
            "AB123CD"
        );
        assert!(validate_value("is_plate", "AB123CD").unwrap());
    }

    #[test]
    fn amount_european_format() {
        assert_eq!(
            normalize_value("amount_normalize", "1.250,00 EUR").unwrap(),
            "1250.00"
        );
    }

    #[test]
    fn amount_us_format() {
        assert_eq!(
            normalize_value("amount_normalize", "$1,250.00").unwrap(),
            "1250.00"
        );
        assert_eq!(normalize_value("amount_normalize", "1,250").unwrap(), "1250");
    }

    #[test]
    fn missing_values() {
        assert!(is_missing_value(""));
        assert!(is_missing_value("  "));
        assert!(is_missing_value("N/A"));
        assert!(is_missing_value("n/a"));
        assert!(is_missing_value("null"));
        assert!(!is_missing_value("AB-123"));
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert_eq!(
            normalize_value("bogus", "x").unwrap_err(),
            NormalizeError::UnknownNormalizer("bogus".to_string())
        );
        assert_eq!(
            validate_value("bogus", "x").unwrap_err(),
            NormalizeError::UnknownValidator("bogus".to_string())
        );
    }

    #[test]
    fn uppercase_trim_and_trim() {
        assert_eq!(
            normalize_value("uppercase_trim", " pol-99x ").unwrap(),
            "POL-99X"
        );
        assert_eq!(normalize_value("trim", "  a   b  ").unwrap(), "a b");
    }
}
