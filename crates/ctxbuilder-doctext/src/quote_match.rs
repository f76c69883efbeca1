//! Whitespace- and case-tolerant quote location.
//!
//! Provenance binding maps an LLM-cited `supporting_quote` back to exact
//! `(char_start, char_end)` offsets in the cited page. Models routinely
//! collapse runs of whitespace or change case when quoting, so the match is
//! tolerant of both; offsets always refer to the stored text as-is.

/// Locate `quote` within `page_text`, returning code-point offsets.
///
/// Matching ignores case and treats any run of whitespace in either string
/// as a single separator. Returns the span of the first match in the
/// original text, or `None` when the quote does not occur.
#[must_use]
pub fn find_quote_in_page(page_text: &str, quote: &str) -> Option<(usize, usize)> {
    let needle: Vec<char> = fold(quote).chars().collect();
    if needle.is_empty() {
        return None;
    }

    let hay = FoldedText::build(page_text);
    let n = needle.len();
    if hay.chars.len() < n {
        return None;
    }

    for start in 0..=(hay.chars.len() - n) {
        if hay.chars[start..start + n] == needle[..] {
            let orig_start = hay.origin[start];
            let orig_last = hay.origin[start + n - 1];
            return Some((orig_start, orig_last + 1));
        }
    }
    None
}

/// Fold a string for comparison: lowercase, whitespace runs become one
/// space, leading/trailing whitespace dropped.
fn fold(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_space = false;
    for c in s.trim().chars() {
        if c.is_whitespace() {
            pending_space = true;
        } else {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            for lc in c.to_lowercase() {
                out.push(lc);
            }
        }
    }
    out
}

/// Folded text plus, for each folded char, the code-point index of the
/// original char it came from.
struct FoldedText {
    chars: Vec<char>,
    origin: Vec<usize>,
}

impl FoldedText {
    fn build(text: &str) -> Self {
        let mut chars = Vec::new();
        let mut origin = Vec::new();
        let mut pending_space = false;

        for (idx, c) in text.chars().enumerate() {
            if c.is_whitespace() {
                pending_space = true;
            } else {
                if pending_space && !chars.is_empty() {
                    chars.push(' ');
                    origin.push(idx);
                }
                pending_space = false;
                for lc in c.to_lowercase() {
                    chars.push(lc);
                    origin.push(idx);
                }
            }
        }

        Self { chars, origin }
    }
}
