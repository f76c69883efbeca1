//! The `doc_text_v1` data model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Schema version written into every `pages.json`.
pub const DOC_TEXT_SCHEMA_VERSION: &str = "doc_text_v1";

/// Which producer generated a page's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextSource {
    /// Document-intelligence style layout service.
    Di,
    /// Vision LLM reading a rasterized page.
    VisionOcr,
    /// Local tesseract OCR.
    Tesseract,
    /// Text extracted directly from the source file.
    Plain,
}

/// Readability grade assigned by the producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Readability {
    Good,
    Warn,
    Bad,
}

/// Per-page quality block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageQuality {
    pub readability: Readability,
}

/// One page of canonical text. `page` is 1-based.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub page: u32,
    pub text: String,
    pub source: TextSource,
    pub quality: PageQuality,
}

/// Canonical per-document text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocText {
    pub schema_version: String,
    pub doc_id: String,
    pub page_count: u32,
    pub pages: Vec<Page>,
}

/// Errors addressing text by `(page, char_start, char_end)`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SliceError {
    #[error("page {page} out of range (document has {page_count} pages)")]
    PageOutOfRange { page: u32, page_count: u32 },

    #[error("offset range {char_start}..{char_end} invalid for page {page} ({len} code points)")]
    OffsetOutOfRange {
        page: u32,
        char_start: usize,
        char_end: usize,
        len: usize,
    },
}

impl DocText {
    /// Build a `DocText`, normalizing page numbering to 1-based order and
    /// stripping form-feed characters the way providers are required to.
    #[must_use]
    pub fn new(doc_id: impl Into<String>, pages: Vec<Page>) -> Self {
        let mut pages = pages;
        for (idx, page) in pages.iter_mut().enumerate() {
            page.page = idx as u32 + 1;
            if page.text.contains('\u{c}') {
                page.text = page.text.replace('\u{c}', "");
            }
        }
        Self {
            schema_version: DOC_TEXT_SCHEMA_VERSION.to_string(),
            doc_id: doc_id.into(),
            page_count: pages.len() as u32,
            pages,
        }
    }

    /// Fetch a page by its 1-based number.
    pub fn page(&self, page: u32) -> Result<&Page, SliceError> {
        if page == 0 || page > self.page_count {
            return Err(SliceError::PageOutOfRange {
                page,
                page_count: self.page_count,
            });
        }
        Ok(&self.pages[(page - 1) as usize])
    }

    /// Slice a page's text by code-point offsets.
    ///
    /// Offsets are Unicode code points into the stored text, never bytes, so
    /// provenance survives non-ASCII content.
    pub fn slice(&self, page: u32, char_start: usize, char_end: usize) -> Result<&str, SliceError> {
        let text = &self.page(page)?.text;
        let len = text.chars().count();
        if char_start > char_end || char_end > len {
            return Err(SliceError::OffsetOutOfRange {
                page,
                char_start,
                char_end,
                len,
            });
        }

        let byte_start = char_to_byte(text, char_start);
        let byte_end = char_to_byte(text, char_end);
        Ok(&text[byte_start..byte_end])
    }

    /// MD5 of the concatenated page texts, used for reuse detection.
    #[must_use]
    pub fn text_md5(&self) -> String {
        let mut joined = String::new();
        for page in &self.pages {
            joined.push_str(&page.text);
            joined.push('\n');
        }
        ctxbuilder_utils::canonical::md5_hex(joined.as_bytes())
    }

    /// Whether every page graded `bad` or the document has no usable text.
    #[must_use]
    pub fn is_unreadable(&self) -> bool {
        self.pages.is_empty()
            || self
                .pages
                .iter()
                .all(|p| p.quality.readability == Readability::Bad || p.text.trim().is_empty())
    }
}

fn char_to_byte(text: &str, char_idx: usize) -> usize {
    text.char_indices()
        .nth(char_idx)
        .map_or(text.len(), |(b, _)| b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(text: &str) -> Page {
        Page {
            page: 0,
            text: text.to_string(),
            source: TextSource::Plain,
            quality: PageQuality {
                readability: Readability::Good,
            },
        }
    }

    #[test]
    fn new_renumbers_pages_and_strips_form_feeds() {
        let doc = DocText::new("d1", vec![page("uno\u{c}"), page("dos")]);
        assert_eq!(doc.page_count, 2);
        assert_eq!(doc.pages[0].page, 1);
        assert_eq!(doc.pages[1].page, 2);
        assert_eq!(doc.pages[0].text, "uno");
    }

    #[test]
    fn slice_uses_code_points_not_bytes() {
        let doc = DocText::new("d1", vec![page("Fecha: año 2024")]);
        // "año" spans code points 7..10 even though 'ñ' is two bytes.
        assert_eq!(doc.slice(1, 7, 10).unwrap(), "año");
    }

    #[test]
    fn slice_rejects_out_of_range() {
        let doc = DocText::new("d1", vec![page("abc")]);
        assert!(matches!(
            doc.slice(2, 0, 1),
            Err(SliceError::PageOutOfRange { .. })
        ));
        assert!(matches!(
            doc.slice(1, 2, 9),
            Err(SliceError::OffsetOutOfRange { .. })
        ));
        assert!(matches!(
            doc.slice(1, 2, 1),
            Err(SliceError::OffsetOutOfRange { .. })
        ));
    }

    #[test]
    fn text_md5_is_stable_across_clones() {
        let doc = DocText::new("d1", vec![page("hello"), page("world")]);
        assert_eq!(doc.text_md5(), doc.clone().text_md5());
    }

    #[test]
    fn unreadable_detection() {
        let blank = DocText::new("d1", vec![page("   ")]);
        assert!(blank.is_unreadable());

        let ok = DocText::new("d2", vec![page("content")]);
        assert!(!ok.is_unreadable());

        let mut bad = DocText::new("d3", vec![page("garble")]);
        bad.pages[0].quality.readability = Readability::Bad;
        assert!(bad.is_unreadable());
    }
}
