//! Doc-type catalog and extraction specs.
//!
//! The catalog is the router's view of the world: every supported doc type
//! with a description and content cues. Each doc type also has a
//! `DocTypeSpec` describing the fields to extract, how to normalize and
//! validate them, and the quality-gate thresholds. Spec loading fails fast;
//! a workspace with a bad spec never starts a run.
//!
//! Normalizers here are the single source of truth: extraction, reviewer
//! comparison, and metrics all call the same functions.

mod catalog;
mod normalize;
mod spec;

pub use catalog::{Catalog, CatalogEntry, CatalogError, FALLBACK_DOC_TYPE};
pub use normalize::{
    is_missing_value, normalize_value, validate_value, NormalizeError, NORMALIZER_NAMES,
    VALIDATOR_NAMES,
};
pub use spec::{DocTypeSpec, FailCondition, FieldRule, GateCondition, GateRule, SpecError};
