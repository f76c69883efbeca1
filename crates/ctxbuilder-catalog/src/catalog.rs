//! Catalog loading and the spec directory.
//!
//! Layout under a workspace's `config/` directory:
//!
//! ```text
//! config/doc_type_catalog.yaml    router catalog (types + cues)
//! config/specs/<doc_type>.yaml    one DocTypeSpec per type
//! ```
//!
//! Loading is fail-fast: any invalid spec aborts the load, and a run never
//! starts against a half-valid catalog. Loaded specs are cached with their
//! content hash; the cache is read-mostly for the life of the process.

use crate::spec::{DocTypeSpec, SpecError};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

/// One router-visible doc type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub doc_type: String,
    pub description: String,
    /// Content cues the classifier feeds to the router prompt.
    #[serde(default)]
    pub cues: Vec<String>,
}

/// The doc-type catalog plus every loaded spec.
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    specs: BTreeMap<String, LoadedSpec>,
}

#[derive(Debug, Clone)]
struct LoadedSpec {
    spec: DocTypeSpec,
    hash: String,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog file not found: {path}")]
    NotFound { path: Utf8PathBuf },

    #[error("failed to read {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: Utf8PathBuf, reason: String },

    #[error("catalog lists '{doc_type}' but config/specs has no spec for it")]
    MissingSpec { doc_type: String },

    #[error("duplicate catalog entry for '{doc_type}'")]
    DuplicateEntry { doc_type: String },

    #[error(transparent)]
    Spec(#[from] SpecError),
}

/// Fallback type for documents the router cannot place.
pub const FALLBACK_DOC_TYPE: &str = "supporting_document";

impl Catalog {
    /// Load the catalog and all referenced specs from a `config/` directory.
    pub fn load(config_dir: &Utf8Path) -> Result<Self, CatalogError> {
        let catalog_path = config_dir.join("doc_type_catalog.yaml");
        if !catalog_path.exists() {
            return Err(CatalogError::NotFound { path: catalog_path });
        }

        let raw = std::fs::read_to_string(catalog_path.as_std_path()).map_err(|source| {
            CatalogError::Io {
                path: catalog_path.clone(),
                source,
            }
        })?;
        let entries: Vec<CatalogEntry> =
            serde_yaml::from_str(&raw).map_err(|e| CatalogError::Parse {
                path: catalog_path.clone(),
                reason: e.to_string(),
            })?;

        let mut seen = std::collections::HashSet::new();
        for entry in &entries {
            if !seen.insert(entry.doc_type.clone()) {
                return Err(CatalogError::DuplicateEntry {
                    doc_type: entry.doc_type.clone(),
                });
            }
        }

        let specs_dir = config_dir.join("specs");
        let mut specs = BTreeMap::new();
        for entry in &entries {
            // The fallback type intentionally has no extraction spec.
            if entry.doc_type == FALLBACK_DOC_TYPE {
                continue;
            }
            let spec_path = specs_dir.join(format!("{}.yaml", entry.doc_type));
            if !spec_path.exists() {
                return Err(CatalogError::MissingSpec {
                    doc_type: entry.doc_type.clone(),
                });
            }
            let spec = load_spec_file(&spec_path)?;
            let hash = spec.extraction_spec_hash()?;
            debug!(doc_type = %entry.doc_type, hash = %hash, "loaded extraction spec");
            specs.insert(entry.doc_type.clone(), LoadedSpec { spec, hash });
        }

        info!(
            doc_types = entries.len(),
            specs = specs.len(),
            "doc-type catalog loaded"
        );
        Ok(Self { entries, specs })
    }

    /// Router-visible entries, in catalog order.
    #[must_use]
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Whether the catalog lists a doc type.
    #[must_use]
    pub fn contains(&self, doc_type: &str) -> bool {
        self.entries.iter().any(|e| e.doc_type == doc_type)
    }

    /// The extraction spec for a doc type, if it has one.
    #[must_use]
    pub fn spec(&self, doc_type: &str) -> Option<&DocTypeSpec> {
        self.specs.get(doc_type).map(|l| &l.spec)
    }

    /// Content hash of a doc type's spec.
    #[must_use]
    pub fn spec_hash(&self, doc_type: &str) -> Option<&str> {
        self.specs.get(doc_type).map(|l| l.hash.as_str())
    }

    /// Combined hash over every loaded spec, used for classification reuse.
    #[must_use]
    pub fn catalog_hash(&self) -> String {
        let hashes: Vec<&str> = self.specs.values().map(|l| l.hash.as_str()).collect();
        ctxbuilder_utils::canonical::sha256_hex(hashes.join("\n").as_bytes())
    }
}

fn load_spec_file(path: &Utf8Path) -> Result<DocTypeSpec, CatalogError> {
    let raw = std::fs::read_to_string(path.as_std_path()).map_err(|source| CatalogError::Io {
        path: path.to_owned(),
        source,
    })?;
    let spec: DocTypeSpec = serde_yaml::from_str(&raw).map_err(|e| CatalogError::Parse {
        path: path.to_owned(),
        reason: e.to_string(),
    })?;
    spec.validate()?;
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const CATALOG_YAML: &str = r#"
- doc_type: loss_notice
  description: First notice of loss from the insured
  cues: ["fecha del incidente", "parte de siniestro", "loss notice"]
- doc_type: supporting_document
  description: Anything that supports a claim but is not itself typed
  cues: []
"#;

    const LOSS_NOTICE_SPEC: &str = r#"
doc_type: loss_notice
version: "1"
required_fields: [incident_date]
optional_fields: [policy_number]
field_rules:
  incident_date:
    normalize: date_to_iso
    validate: is_iso_date
    hints: ["fecha", "date"]
  policy_number:
    normalize: uppercase_trim
    validate: non_empty
    hints: ["póliza", "policy"]
quality_gate:
  pass_if: { min_required_present_ratio: 1.0, min_evidence_rate: 0.8 }
  warn_if: { min_required_present_ratio: 1.0, min_evidence_rate: 0.0 }
  fail_if: { otherwise: true }
"#;

    fn write_config(dir: &TempDir, spec_yaml: &str) -> Utf8PathBuf {
        let config = Utf8PathBuf::from_path_buf(dir.path().join("config")).unwrap();
        fs::create_dir_all(config.join("specs").as_std_path()).unwrap();
        fs::write(
            config.join("doc_type_catalog.yaml").as_std_path(),
            CATALOG_YAML,
        )
        .unwrap();
        fs::write(
            config.join("specs/loss_notice.yaml").as_std_path(),
            spec_yaml,
        )
        .unwrap();
        config
    }

    #[test]
    fn loads_catalog_and_specs() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir, LOSS_NOTICE_SPEC);

        let catalog = Catalog::load(&config).unwrap();
        assert_eq!(catalog.entries().len(), 2);
        assert!(catalog.contains("loss_notice"));
        assert!(catalog.spec("loss_notice").is_some());
        assert!(catalog.spec("supporting_document").is_none());
        assert!(catalog.spec_hash("loss_notice").is_some());
    }

    #[test]
    fn missing_gate_thresholds_fail_load() {
        let dir = TempDir::new().unwrap();
        let without_gate = LOSS_NOTICE_SPEC
            .split("quality_gate:")
            .next()
            .unwrap()
            .to_string();
        let config = write_config(&dir, &without_gate);

        let err = Catalog::load(&config).unwrap_err();
        assert!(matches!(err, CatalogError::Parse { .. }));
    }

    #[test]
    fn missing_spec_file_fails_load() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir, LOSS_NOTICE_SPEC);
        fs::remove_file(config.join("specs/loss_notice.yaml").as_std_path()).unwrap();

        let err = Catalog::load(&config).unwrap_err();
        assert!(matches!(err, CatalogError::MissingSpec { .. }));
    }

    #[test]
    fn catalog_hash_tracks_spec_content() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir, LOSS_NOTICE_SPEC);
        let h1 = Catalog::load(&config).unwrap().catalog_hash();

        fs::write(
            config.join("specs/loss_notice.yaml").as_std_path(),
            LOSS_NOTICE_SPEC.replace("version: \"1\"", "version: \"2\""),
        )
        .unwrap();
        let h2 = Catalog::load(&config).unwrap().catalog_hash();
        assert_ne!(h1, h2);
    }
}
