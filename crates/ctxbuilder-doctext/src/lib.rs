//! Canonical document text (`doc_text_v1`).
//!
//! Every ingestion provider produces the same shape: one `DocText` per
//! document with 1-based pages, each carrying its producing source and a
//! readability grade. Offsets used anywhere else in the system are indices
//! into `pages[page-1].text`, counted in Unicode code points.
//!
//! The store is write-once per `doc_id`: a refresh from a better source is a
//! new file published under a new run, with the default pointer swapped by
//! atomic rename.

mod model;
mod quote_match;
mod store;

pub use model::{
    DocText, Page, PageQuality, Readability, SliceError, TextSource, DOC_TEXT_SCHEMA_VERSION,
};
pub use quote_match::find_quote_in_page;
pub use store::{DocTextStore, DocTextStoreError};
