//! Mime sniffing for source files.
//!
//! Magic bytes decide first; the extension is a fallback for formats
//! without a useful signature. Filenames never decide classification, only
//! which provider gets the bytes.

use camino::Utf8Path;

/// Sniff the mime type of a source file from its content and name.
#[must_use]
pub fn sniff_mime(path: &Utf8Path, raw: &[u8]) -> String {
    if raw.starts_with(b"%PDF") {
        return "application/pdf".to_string();
    }
    if raw.starts_with(&[0x89, b'P', b'N', b'G']) {
        return "image/png".to_string();
    }
    if raw.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return "image/jpeg".to_string();
    }
    if raw.starts_with(b"II*\x00") || raw.starts_with(b"MM\x00*") {
        return "image/tiff".to_string();
    }

    match path.extension().map(str::to_ascii_lowercase).as_deref() {
        Some("pdf") => "application/pdf".to_string(),
        Some("png") => "image/png".to_string(),
        Some("jpg" | "jpeg") => "image/jpeg".to_string(),
        Some("tif" | "tiff") => "image/tiff".to_string(),
        Some("txt" | "text" | "md") => "text/plain".to_string(),
        _ => {
            if std::str::from_utf8(raw).is_ok() {
                "text/plain".to_string()
            } else {
                "application/octet-stream".to_string()
            }
        }
    }
}
