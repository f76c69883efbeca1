//! Run orchestration.
//!
//! Claims are processed in deterministic (sorted) order; documents within a
//! claim run concurrently up to the configured cap, each as its own task.
//! One document failing never halts the run. The run folder is committed
//! with `.complete` only after manifest, summary, metrics, and logs are all
//! flushed, and only when the decision ledger is healthy and the run was
//! not cancelled.

use crate::config::PipelineConfig;
use crate::doc_pipeline::{process_doc, DiscoveredDoc, DocTaskDeps};
use crate::phase_metrics::PhaseMetrics;
use crate::sinks::ComplianceSinks;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use ctxbuilder_catalog::Catalog;
use ctxbuilder_compliance::{BundleInputs, BundleStore};
use ctxbuilder_extraction::ExtractionResult;
use ctxbuilder_ingest::ProviderRegistry;
use ctxbuilder_llm::AuditedBackend;
use ctxbuilder_metrics::ScopedDoc;
use ctxbuilder_truth::TruthRegistry;
use ctxbuilder_utils::atomic_write::write_json_atomic;
use ctxbuilder_utils::ids::{new_run_id, validate_run_id};
use ctxbuilder_workspace::{
    ClaimRunRef, DocState, RunManifest, RunStatus, RunStore, RunStoreError, RunSummary,
    WorkspacePaths, SUMMARY_SCHEMA_VERSION,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    /// User-correctable problems (bad run id, run folder exists).
    #[error("{0}")]
    User(String),

    /// The run aborted before any artifacts were committed.
    #[error("fatal: {0}")]
    Fatal(String),
}

/// What the caller asked for.
#[derive(Debug, Clone)]
pub struct RunInputs {
    pub input_dir: Utf8PathBuf,
    /// Restrict to these claim ids; `None` processes every claim found.
    pub claims: Option<Vec<String>>,
    pub run_id: Option<String>,
    pub force: bool,
}

/// Final report handed to the CLI.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: String,
    pub status: RunStatus,
    pub summary: RunSummary,
    pub phases: PhaseMetrics,
    pub committed: bool,
}

/// The pipeline orchestrator. One instance runs one workspace.
pub struct PipelineOrchestrator {
    paths: WorkspacePaths,
    run_store: RunStore,
    catalog: Arc<Catalog>,
    providers: Arc<ProviderRegistry>,
    backend: Arc<AuditedBackend>,
    sinks: Arc<ComplianceSinks>,
    bundles: BundleStore,
    truth: TruthRegistry,
    config: PipelineConfig,
    cancelled: Arc<AtomicBool>,
}

impl PipelineOrchestrator {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        paths: WorkspacePaths,
        catalog: Arc<Catalog>,
        providers: Arc<ProviderRegistry>,
        backend: Arc<AuditedBackend>,
        sinks: Arc<ComplianceSinks>,
        config: PipelineConfig,
    ) -> Self {
        let run_store = RunStore::new(paths.clone());
        let bundles = BundleStore::new(paths.version_bundles_dir());
        let truth = TruthRegistry::new(paths.clone());
        Self {
            paths,
            run_store,
            catalog,
            providers,
            backend,
            sinks,
            bundles,
            truth,
            config,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for external cancellation (Ctrl-C). In-flight documents
    /// finish; no new ones start; the run is summarized as cancelled and
    /// `.complete` is withheld.
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Walk the input directory: one subdirectory per claim, documents
    /// inside. Deterministic order: claims sorted, then filenames sorted.
    pub fn discover(&self, inputs: &RunInputs) -> Result<Vec<DiscoveredDoc>, PipelineError> {
        let mut docs = Vec::new();

        let entries = std::fs::read_dir(inputs.input_dir.as_std_path())
            .map_err(|e| PipelineError::User(format!("cannot read input dir: {e}")))?;

        let mut claim_dirs: Vec<(String, std::path::PathBuf)> = entries
            .flatten()
            .filter(|e| e.path().is_dir())
            .filter_map(|e| {
                e.file_name()
                    .to_str()
                    .map(|name| (name.to_string(), e.path()))
            })
            .collect();
        claim_dirs.sort();

        for (claim_id, dir) in claim_dirs {
            if let Some(filter) = &inputs.claims {
                if !filter.contains(&claim_id) {
                    continue;
                }
            }

            let mut files: Vec<(String, std::path::PathBuf)> = std::fs::read_dir(&dir)
                .map_err(|e| PipelineError::User(format!("cannot read claim dir: {e}")))?
                .flatten()
                .filter(|e| e.path().is_file())
                .filter_map(|e| {
                    e.file_name()
                        .to_str()
                        .map(|name| (name.to_string(), e.path()))
                })
                .collect();
            files.sort();

            for (filename, path) in files {
                let Some(source_path) = Utf8PathBuf::from_path_buf(path).ok() else {
                    warn!(claim_id = %claim_id, "skipping non-UTF-8 path");
                    continue;
                };
                docs.push(DiscoveredDoc {
                    claim_id: claim_id.clone(),
                    source_path,
                    filename,
                });
            }
        }

        Ok(docs)
    }

    /// Execute a full run.
    pub async fn run(&self, inputs: RunInputs) -> Result<RunReport, PipelineError> {
        let started_at = Utc::now();

        let run_id = match &inputs.run_id {
            Some(id) => {
                validate_run_id(id).map_err(|e| PipelineError::User(e.to_string()))?;
                id.clone()
            }
            None => new_run_id(started_at, None),
        };

        self.paths
            .ensure_layout()
            .map_err(|e| PipelineError::Fatal(format!("cannot create workspace layout: {e}")))?;

        let docs = self.discover(&inputs)?;
        if docs.is_empty() {
            return Err(PipelineError::User(format!(
                "no documents found under {}",
                inputs.input_dir
            )));
        }

        self.run_store
            .create_run_dir(&run_id, inputs.force)
            .map_err(|e| match e {
                RunStoreError::RunExists { .. } => PipelineError::User(e.to_string()),
                other => PipelineError::Fatal(other.to_string()),
            })?;

        let bundle_id = self.create_version_bundle(&run_id);
        self.append_config_history(&run_id, bundle_id.as_deref());
        let _ = self.run_store.append_log(&run_id, "run started");

        // Group by claim, preserving discovery order.
        let mut by_claim: BTreeMap<String, Vec<DiscoveredDoc>> = BTreeMap::new();
        for doc in docs {
            by_claim.entry(doc.claim_id.clone()).or_default().push(doc);
        }
        let claim_ids: Vec<String> = by_claim.keys().cloned().collect();

        let deps = Arc::new(DocTaskDeps {
            paths: self.paths.clone(),
            catalog: Arc::clone(&self.catalog),
            providers: Arc::clone(&self.providers),
            backend: Arc::clone(&self.backend),
            sinks: Arc::clone(&self.sinks),
            config: self.config.clone(),
            run_id: run_id.clone(),
            bundle_id: bundle_id.clone(),
        });

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut outcomes = Vec::new();
        let mut phases = PhaseMetrics::default();
        let mut extractions: Vec<ExtractionResult> = Vec::new();
        let mut was_cancelled = false;

        'claims: for claim_id in &claim_ids {
            let claim_docs = by_claim.remove(claim_id).unwrap_or_default();
            let mut tasks = JoinSet::new();

            for doc in claim_docs {
                if self.cancelled.load(Ordering::SeqCst) {
                    was_cancelled = true;
                    // In-flight tasks drain below; nothing new starts.
                    break;
                }
                let permit = Arc::clone(&semaphore)
                    .acquire_owned()
                    .await
                    .map_err(|_| PipelineError::Fatal("semaphore closed".to_string()))?;
                let deps = Arc::clone(&deps);
                tasks.spawn(async move {
                    let result = process_doc(&deps, doc).await;
                    drop(permit);
                    result
                });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(result) => {
                        let _ = self.run_store.append_log(
                            &run_id,
                            &format!(
                                "doc {} ({}) -> {:?}",
                                result.outcome.doc_id, result.outcome.filename, result.outcome.state
                            ),
                        );
                        phases.absorb(&result.metrics);
                        if let Some(extraction) = result.extraction {
                            extractions.push(extraction);
                        }
                        outcomes.push(result.outcome);
                    }
                    Err(join_err) => {
                        // A panicking doc task is still per-doc isolation:
                        // record and continue with its siblings.
                        error!(error = %join_err, "document task panicked");
                    }
                }
            }

            if was_cancelled {
                break 'claims;
            }
        }

        let failed_docs = outcomes
            .iter()
            .filter(|o| o.state == DocState::Failed)
            .count();

        let status = if was_cancelled {
            RunStatus::Cancelled
        } else if failed_docs == outcomes.len() && !outcomes.is_empty() {
            RunStatus::Failed
        } else if failed_docs > 0 {
            RunStatus::Partial
        } else {
            RunStatus::Completed
        };

        let summary = RunSummary {
            schema_version: SUMMARY_SCHEMA_VERSION.to_string(),
            run_id: run_id.clone(),
            status,
            started_at,
            finished_at: Utc::now(),
            docs: outcomes,
        };
        self.run_store
            .write_summary(&summary)
            .map_err(|e| PipelineError::Fatal(e.to_string()))?;

        let manifest = RunManifest {
            run_id: run_id.clone(),
            created_at: started_at,
            claims: claim_ids.clone(),
            claim_runs: claim_ids
                .iter()
                .map(|claim_id| ClaimRunRef {
                    claim_id: claim_id.clone(),
                    claim_run_id: run_id.clone(),
                })
                .collect(),
            classifier_model: self.config.classifier_model.clone(),
            extractor_model: self.config.extractor_model.clone(),
            stages: self
                .config
                .stages
                .iter()
                .map(|s| format!("{s:?}").to_lowercase())
                .collect(),
            version_bundle_id: bundle_id.clone(),
        };
        self.run_store
            .write_manifest(&manifest)
            .map_err(|e| PipelineError::Fatal(e.to_string()))?;

        self.write_metrics(&run_id, &phases, &extractions)?;
        self.commit_claim_runs(&claim_ids, &run_id, &manifest);

        let _ = ctxbuilder_workspace::rebuild_indexes(&self.paths);
        let _ = self.run_store.append_log(&run_id, "run finished");

        // Commit only a healthy, uncancelled run.
        let mut committed = false;
        if was_cancelled {
            info!(run_id = %run_id, "run cancelled; .complete withheld");
        } else if !self.sinks.ledger_healthy() {
            warn!(run_id = %run_id, "decision ledger unhealthy; .complete withheld");
        } else {
            self.run_store
                .commit(&run_id)
                .map_err(|e| PipelineError::Fatal(e.to_string()))?;
            committed = true;
        }

        Ok(RunReport {
            run_id,
            status,
            summary,
            phases,
            committed,
        })
    }

    fn create_version_bundle(&self, run_id: &str) -> Option<String> {
        let spec_files = self.spec_snapshot_files();
        let prompt_hash = self.prompt_template_hash();
        let inputs = BundleInputs {
            run_id: run_id.to_string(),
            extractor_version: env!("CARGO_PKG_VERSION").to_string(),
            model_name: self.config.extractor_model.clone(),
            prompt_template_hash: prompt_hash,
            extraction_spec_hash: self.catalog.catalog_hash(),
            snapshot_files: spec_files,
        };
        match self.bundles.create(&inputs) {
            Ok(bundle) => Some(bundle.bundle_id),
            Err(e) => {
                warn!(error = %e, "version bundle creation failed");
                None
            }
        }
    }

    /// Append the active prompt/spec configuration to the append-only
    /// config history. Each line is a full snapshot; nothing is rewritten.
    fn append_config_history(&self, run_id: &str, bundle_id: Option<&str>) {
        let history_path = self.paths.config_history_path();
        let version_number = std::fs::read_to_string(history_path.as_std_path())
            .map(|c| c.lines().filter(|l| !l.trim().is_empty()).count() as u64 + 1)
            .unwrap_or(1);
        let snapshot = serde_json::json!({
            "run_id": run_id,
            "version_bundle_id": bundle_id,
            "prompt_template_hash": self.prompt_template_hash(),
            "catalog_hash": self.catalog.catalog_hash(),
            "classifier_model": self.config.classifier_model,
            "extractor_model": self.config.extractor_model,
        });
        if let Err(e) =
            ctxbuilder_workspace::append_config_snapshot(&history_path, &snapshot, version_number)
        {
            warn!(error = %e, "config history append failed");
        }
    }

    fn spec_snapshot_files(&self) -> Vec<Utf8PathBuf> {
        let mut files = Vec::new();
        for dir in [self.paths.config_dir().join("specs"), self.paths.prompts_dir()] {
            if let Ok(entries) = std::fs::read_dir(dir.as_std_path()) {
                for entry in entries.flatten() {
                    if let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) {
                        if path.is_file() {
                            files.push(path);
                        }
                    }
                }
            }
        }
        files.sort();
        files
    }

    fn prompt_template_hash(&self) -> String {
        let mut content = String::new();
        for path in self.spec_snapshot_files() {
            if let Ok(text) = std::fs::read_to_string(path.as_std_path()) {
                content.push_str(&text);
            }
        }
        ctxbuilder_utils::canonical::sha256_hex(content.as_bytes())
    }

    fn write_metrics(
        &self,
        run_id: &str,
        phases: &PhaseMetrics,
        extractions: &[ExtractionResult],
    ) -> Result<(), PipelineError> {
        let mut metrics = serde_json::json!({ "phases": phases });

        if self.config.compute_metrics {
            let truths: Vec<_> = extractions
                .iter()
                .map(|e| self.truth.latest(&e.doc.doc_id).ok().flatten())
                .collect();
            let scoped: Vec<ScopedDoc<'_>> = extractions
                .iter()
                .zip(truths.iter())
                .map(|(extraction, truth)| ScopedDoc {
                    doc_id: extraction.doc.doc_id.clone(),
                    truth: truth.as_ref(),
                    extraction: Some(extraction),
                })
                .collect();
            let report = ctxbuilder_metrics::compute(&scoped, &self.catalog);
            metrics["comparative"] = serde_json::to_value(&report)
                .map_err(|e| PipelineError::Fatal(e.to_string()))?;
        }

        self.run_store
            .write_metrics(run_id, &metrics)
            .map_err(|e| PipelineError::Fatal(e.to_string()))
    }

    /// Write each claim run's manifest and sentinel. Claim run folders are
    /// owned by the global run that created them.
    fn commit_claim_runs(&self, claim_ids: &[String], run_id: &str, manifest: &RunManifest) {
        for claim_id in claim_ids {
            let claim_run_dir = self.paths.claim_run_dir(claim_id, run_id);
            let claim_manifest = serde_json::json!({
                "claim_id": claim_id,
                "claim_run_id": run_id,
                "global_run_id": manifest.run_id,
                "created_at": manifest.created_at,
            });
            if write_json_atomic(&claim_run_dir.join("manifest.json"), &claim_manifest).is_ok() {
                let _ = ctxbuilder_utils::atomic_write::publish_complete_marker(&claim_run_dir);
            }
        }
    }
}

/// Load the catalog for a workspace, the fatal-on-failure path the CLI
/// uses before constructing the orchestrator.
pub fn load_catalog(config_dir: &Utf8Path) -> Result<Catalog, PipelineError> {
    Catalog::load(config_dir).map_err(|e| PipelineError::Fatal(format!("catalog unusable: {e}")))
}
