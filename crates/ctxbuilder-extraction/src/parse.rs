//! Lenient parsing of structured extraction responses.
//!
//! Models wrap JSON in fences, prepend prose, or append commentary. The
//! parser finds the first balanced JSON object in the text and validates it
//! against the expected shape. A response that survives neither direct
//! parsing nor fence-stripping is schema-invalid; the engine gives the
//! model exactly one repair attempt before giving up.

use ctxbuilder_utils::json_text::extract_json_object;
use serde::Deserialize;
use thiserror::Error;

/// One field answer from the model.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldAnswer {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub supporting_quote: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// The response envelope the prompt asks for.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldsResponse {
    pub fields: Vec<FieldAnswer>,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("response contained no JSON object")]
    NoJson,

    #[error("response JSON did not match the expected schema: {0}")]
    SchemaMismatch(String),
}

/// Parse a model response into field answers.
pub fn parse_fields_response(raw: &str) -> Result<FieldsResponse, ParseError> {
    let candidate = extract_json_object(raw).ok_or(ParseError::NoJson)?;
    serde_json::from_str(candidate).map_err(|e| ParseError::SchemaMismatch(e.to_string()))
}

/// The follow-up prompt used for the single repair attempt.
#[must_use]
pub fn repair_prompt(previous_response: &str, error: &ParseError) -> String {
    format!(
        "Your previous response could not be used: {error}.\n\
         Respond again with ONLY a JSON object of the form \
         {{\"fields\": [{{\"name\": \"...\", \"value\": \"...\", \
         \"supporting_quote\": \"...\", \"page\": 1, \"confidence\": 0.9}}]}} \
         and no other text.\n\nPrevious response:\n{previous_response}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clean_json() {
        let raw = r#"{"fields":[{"name":"incident_date","value":"13/01/2024","supporting_quote":"Fecha del incidente: 13/01/2024","page":1,"confidence":0.92}]}"#;
        let parsed = parse_fields_response(raw).unwrap();
        assert_eq!(parsed.fields.len(), 1);
        assert_eq!(parsed.fields[0].name, "incident_date");
        assert_eq!(parsed.fields[0].page, Some(1));
    }

    #[test]
    fn parses_fenced_json_with_prose() {
        let raw = "Here is the extraction:\n```json\n{\"fields\": []}\n```\nDone.";
        let parsed = parse_fields_response(raw).unwrap();
        assert!(parsed.fields.is_empty());
    }

    #[test]
    fn braces_inside_strings_do_not_break_balancing() {
        let raw = r#"note {"fields":[{"name":"x","value":"a{b}c"}]} trailing"#;
        let parsed = parse_fields_response(raw).unwrap();
        assert_eq!(parsed.fields[0].value.as_deref(), Some("a{b}c"));
    }

    #[test]
    fn missing_json_is_no_json() {
        assert!(matches!(
            parse_fields_response("no structure here"),
            Err(ParseError::NoJson)
        ));
    }

    #[test]
    fn wrong_shape_is_schema_mismatch() {
        assert!(matches!(
            parse_fields_response(r#"{"rows": []}"#),
            Err(ParseError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn repair_prompt_names_the_failure() {
        let prompt = repair_prompt("garbage", &ParseError::NoJson);
        assert!(prompt.contains("no JSON object"));
        assert!(prompt.contains("garbage"));
    }
}
