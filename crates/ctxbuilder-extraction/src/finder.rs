//! Deterministic candidate-span finder.
//!
//! Pass one of the extractor: scan every page for each field's hints and
//! cut a window of ±W code points around each hit. The windows, not the
//! whole document, are what the structured extraction call sees (short
//! documents go whole). No LLM involvement; identical inputs produce
//! identical windows.

use ctxbuilder_catalog::DocTypeSpec;
use ctxbuilder_doctext::{DocText, Readability};
use serde::Serialize;

/// Default window radius in code points.
pub const DEFAULT_WINDOW: usize = 800;

/// One candidate window for a field.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateWindow {
    pub field: String,
    pub page: u32,
    pub char_start: usize,
    pub char_end: usize,
    /// The hint that produced the window.
    pub hint: String,
    /// Index of the hint in the field's hint list; lower = more
    /// authoritative when candidates conflict.
    pub hint_rank: usize,
    pub text: String,
}

/// Result of the candidate scan.
#[derive(Debug, Clone)]
pub struct CandidateScan {
    pub windows: Vec<CandidateWindow>,
    /// Required fields with no candidate anywhere.
    pub uncovered_required: Vec<String>,
    /// True when a required field has no candidates and the text quality is
    /// not uniformly good; the caller surfaces this as
    /// `needs_vision_fallback`.
    pub needs_vision_fallback: bool,
}

/// Scan a document for candidate windows per the spec's field hints.
#[must_use]
pub fn find_candidates(doc: &DocText, spec: &DocTypeSpec, window: usize) -> CandidateScan {
    let mut windows = Vec::new();
    let mut uncovered_required = Vec::new();

    for field in spec.all_fields() {
        let Some(rule) = spec.field_rules.get(field) else {
            continue;
        };

        let mut found_any = false;
        for page in &doc.pages {
            let lowered: Vec<char> = page.text.to_lowercase().chars().collect();
            let page_chars: Vec<char> = page.text.chars().collect();

            for (hint_rank, hint) in rule.hints.iter().enumerate() {
                let needle: Vec<char> = hint.to_lowercase().chars().collect();
                if needle.is_empty() {
                    continue;
                }

                for hit in find_all(&lowered, &needle) {
                    found_any = true;
                    let char_start = hit.saturating_sub(window);
                    let char_end = (hit + needle.len() + window).min(page_chars.len());
                    windows.push(CandidateWindow {
                        field: field.clone(),
                        page: page.page,
                        char_start,
                        char_end,
                        hint: hint.clone(),
                        hint_rank,
                        text: page_chars[char_start..char_end].iter().collect(),
                    });
                }
            }
        }

        if !found_any && spec.is_required(field) {
            uncovered_required.push(field.clone());
        }
    }

    merge_overlapping(&mut windows);

    let good_quality = doc
        .pages
        .iter()
        .all(|p| p.quality.readability == Readability::Good);
    let needs_vision_fallback = !uncovered_required.is_empty() && !good_quality;

    CandidateScan {
        windows,
        uncovered_required,
        needs_vision_fallback,
    }
}

/// All start offsets of `needle` in `haystack` (code points).
fn find_all(haystack: &[char], needle: &[char]) -> Vec<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return Vec::new();
    }
    let mut hits = Vec::new();
    for start in 0..=(haystack.len() - needle.len()) {
        if &haystack[start..start + needle.len()] == needle {
            hits.push(start);
        }
    }
    hits
}

/// Collapse windows for the same field and page that overlap, keeping the
/// most authoritative hint. Windows stay sorted by (field, page, start).
fn merge_overlapping(windows: &mut Vec<CandidateWindow>) {
    windows.sort_by(|a, b| {
        (a.field.as_str(), a.page, a.char_start).cmp(&(b.field.as_str(), b.page, b.char_start))
    });

    let mut merged: Vec<CandidateWindow> = Vec::with_capacity(windows.len());
    for win in windows.drain(..) {
        match merged.last_mut() {
            Some(prev)
                if prev.field == win.field
                    && prev.page == win.page
                    && win.char_start <= prev.char_end =>
            {
                if win.char_end > prev.char_end {
                    // Extend the merged window text from the later one.
                    let extension: String = win
                        .text
                        .chars()
                        .skip(prev.char_end - win.char_start)
                        .collect();
                    prev.text.push_str(&extension);
                    prev.char_end = win.char_end;
                }
                prev.hint_rank = prev.hint_rank.min(win.hint_rank);
            }
            _ => merged.push(win),
        }
    }
    *windows = merged;
}

/// Whether the document is short enough to send whole instead of windowed.
#[must_use]
pub fn is_short_document(doc: &DocText, window: usize) -> bool {
    let total: usize = doc.pages.iter().map(|p| p.text.chars().count()).sum();
    total <= window * 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxbuilder_catalog::{DocTypeSpec, FailCondition, FieldRule, GateCondition, GateRule};
    use ctxbuilder_doctext::{Page, PageQuality, TextSource};
    use std::collections::BTreeMap;

    fn spec_with_hints(hints: Vec<&str>) -> DocTypeSpec {
        let mut field_rules = BTreeMap::new();
        field_rules.insert(
            "incident_date".to_string(),
            FieldRule {
                normalize: "date_to_iso".to_string(),
                validate: "is_iso_date".to_string(),
                hints: hints.into_iter().map(String::from).collect(),
                authority_rank: 0,
            },
        );
        DocTypeSpec {
            doc_type: "loss_notice".to_string(),
            version: "1".to_string(),
            required_fields: vec!["incident_date".to_string()],
            optional_fields: vec![],
            field_rules,
            quality_gate: GateRule {
                pass_if: GateCondition {
                    min_required_present_ratio: 1.0,
                    min_evidence_rate: 0.8,
                },
                warn_if: GateCondition {
                    min_required_present_ratio: 1.0,
                    min_evidence_rate: 0.0,
                },
                fail_if: FailCondition { otherwise: true },
            },
        }
    }

    fn doc(texts: &[&str], readability: Readability) -> DocText {
        DocText::new(
            "d1",
            texts
                .iter()
                .map(|t| Page {
                    page: 0,
                    text: (*t).to_string(),
                    source: TextSource::Plain,
                    quality: PageQuality { readability },
                })
                .collect(),
        )
    }

    #[test]
    fn hint_hit_produces_window_with_offsets() {
        let doc = doc(&["Parte. Fecha del incidente: 13/01/2024. Fin."], Readability::Good);
        let scan = find_candidates(&doc, &spec_with_hints(vec!["fecha"]), 10);

        assert_eq!(scan.windows.len(), 1);
        let w = &scan.windows[0];
        assert_eq!(w.field, "incident_date");
        assert_eq!(w.page, 1);
        assert!(w.text.to_lowercase().contains("fecha"));
        assert!(scan.uncovered_required.is_empty());
        assert!(!scan.needs_vision_fallback);
    }

    #[test]
    fn overlapping_windows_merge() {
        let doc = doc(
            &["Fecha de registro y fecha del incidente: 13/01/2024"],
            Readability::Good,
        );
        let scan = find_candidates(&doc, &spec_with_hints(vec!["fecha"]), 800);
        assert_eq!(scan.windows.len(), 1);
        assert!(scan.windows[0].text.contains("13/01/2024"));
    }

    #[test]
    fn no_candidates_with_poor_quality_flags_vision() {
        let doc = doc(&["garbled noise without the keyword"], Readability::Warn);
        let scan = find_candidates(&doc, &spec_with_hints(vec!["fecha"]), 800);
        assert_eq!(scan.uncovered_required, vec!["incident_date"]);
        assert!(scan.needs_vision_fallback);
    }

    #[test]
    fn no_candidates_with_good_quality_does_not_flag_vision() {
        let doc = doc(&["clean text without the keyword"], Readability::Good);
        let scan = find_candidates(&doc, &spec_with_hints(vec!["fecha"]), 800);
        assert_eq!(scan.uncovered_required, vec!["incident_date"]);
        assert!(!scan.needs_vision_fallback);
    }

    #[test]
    fn short_document_detection() {
        let short = doc(&["tiny"], Readability::Good);
        assert!(is_short_document(&short, 800));

        let long_text = "x".repeat(2000);
        let long = doc(&[long_text.as_str()], Readability::Good);
        assert!(!is_short_document(&long, 800));
    }

    #[test]
    fn deterministic_across_calls() {
        let doc = doc(
            &["Fecha del incidente: 13/01/2024", "Fecha de pago: 01/02/2024"],
            Readability::Good,
        );
        let spec = spec_with_hints(vec!["fecha", "date"]);
        let a = find_candidates(&doc, &spec, 50);
        let b = find_candidates(&doc, &spec, 50);
        assert_eq!(a.windows.len(), b.windows.len());
        for (x, y) in a.windows.iter().zip(b.windows.iter()) {
            assert_eq!((x.page, x.char_start, x.char_end), (y.page, y.char_start, y.char_end));
        }
    }
}
