//! Command implementations: thin glue over the pipeline crates.

use crate::cli::args::{RunArgs, RunsCommands, WorkspaceCommands};
use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use ctxbuilder_compliance::{DecisionLedger, LlmCallLog};
use ctxbuilder_engine::{
    load_catalog, AuditSink, ComplianceSinks, PipelineConfig, PipelineError, PipelineOrchestrator,
    RunInputs, Stage,
};
use ctxbuilder_ingest::{
    DiLikeProvider, IngestionProvider, OcrProvider, PlainTextProvider, ProviderRegistry,
    VisionLlmProvider,
};
use ctxbuilder_llm::{backend_from_config, AuditedBackend, LlmConfig};
use ctxbuilder_utils::ExitCode;
use ctxbuilder_workspace::{reset_workspace, ResetError, RunStatus, RunStore, WorkspacePaths};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

/// Resolve a workspace argument: an existing directory path is used as-is,
/// anything else is a workspace id under the workspaces root.
fn resolve_workspace(workspaces_root: Option<&str>, workspace: &str) -> Utf8PathBuf {
    let as_path = Utf8PathBuf::from(workspace);
    if as_path.is_dir() || workspace.contains('/') {
        return as_path;
    }
    let root = workspaces_root.unwrap_or("workspaces");
    Utf8PathBuf::from(root).join(workspace)
}

pub async fn pipeline_run(workspaces_root: Option<&str>, args: RunArgs) -> ExitCode {
    let workspace_root = resolve_workspace(workspaces_root, &args.workspace);
    let paths = WorkspacePaths::new(workspace_root.clone());

    let inputs = RunInputs {
        input_dir: Utf8PathBuf::from(&args.input),
        claims: args
            .claims
            .as_deref()
            .map(|c| c.split(',').map(|s| s.trim().to_string()).collect()),
        run_id: args.run_id.clone(),
        force: args.force,
    };

    let mut config = PipelineConfig {
        classifier_model: args.classifier_model.clone().unwrap_or_default(),
        extractor_model: args.extractor_model.clone().unwrap_or_default(),
        compute_metrics: !args.no_metrics,
        ..PipelineConfig::default()
    };
    if let Some(stages) = &args.stages {
        match Stage::parse_list(stages) {
            Ok(parsed) => config.stages = parsed,
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::USER_ERROR;
            }
        }
    }

    // Specs must load before anything touches the run folder.
    let catalog = match load_catalog(&paths.config_dir()) {
        Ok(catalog) => Arc::new(catalog),
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FATAL;
        }
    };

    if args.dry_run {
        return dry_run(&paths, &catalog, &inputs, &config);
    }

    let llm_config = LlmConfig::from_env();
    let backend = match backend_from_config(&llm_config) {
        Ok(backend) => backend,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::USER_ERROR;
        }
    };

    let sinks = match build_sinks(&paths) {
        Ok(sinks) => sinks,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::USER_ERROR;
        }
    };
    let audited = Arc::new(AuditedBackend::new(
        backend,
        Arc::new(AuditSink::new(Arc::clone(&sinks))),
    ));

    let providers = build_providers(&audited, &config);

    let orchestrator = PipelineOrchestrator::new(
        paths,
        catalog,
        providers,
        Arc::clone(&audited),
        sinks,
        config,
    );

    // Ctrl-C finishes in-flight documents, then summarizes as cancelled.
    let cancel = orchestrator.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("cancellation requested; finishing in-flight documents");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    match orchestrator.run(inputs).await {
        Ok(report) => {
            print_run_digest(&report);
            match report.status {
                RunStatus::Completed => ExitCode::SUCCESS,
                RunStatus::Partial | RunStatus::Failed => ExitCode::PARTIAL,
                RunStatus::Cancelled => ExitCode::CANCELLED,
            }
        }
        Err(PipelineError::User(msg)) => {
            eprintln!("error: {msg}");
            ExitCode::USER_ERROR
        }
        Err(PipelineError::Fatal(msg)) => {
            eprintln!("fatal: {msg}");
            ExitCode::FATAL
        }
    }
}

fn dry_run(
    paths: &WorkspacePaths,
    catalog: &Arc<ctxbuilder_catalog::Catalog>,
    inputs: &RunInputs,
    config: &PipelineConfig,
) -> ExitCode {
    // Discovery needs no backend; build a plan-only orchestrator.
    let providers = Arc::new(ProviderRegistry::new(vec![Arc::new(
        PlainTextProvider::new(),
    )]));
    let sinks = Arc::new(ComplianceSinks::new(
        Arc::new(DecisionLedger::open(paths.decisions_log_path())),
        Arc::new(LlmCallLog::open(paths.llm_calls_log_path())),
        paths.compliance_errors_log_path(),
    ));
    let backend = Arc::new(AuditedBackend::new(
        Arc::new(ctxbuilder_llm::ScriptedBackend::with_responses(Vec::new())),
        Arc::new(ctxbuilder_llm::NoopObserver),
    ));
    let orchestrator = PipelineOrchestrator::new(
        paths.clone(),
        Arc::clone(catalog),
        providers,
        backend,
        sinks,
        config.clone(),
    );

    match orchestrator.discover(inputs) {
        Ok(docs) => {
            println!("dry run: {} document(s) would be processed", docs.len());
            for doc in docs {
                println!("  {} <- {}", doc.claim_id, doc.filename);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::USER_ERROR
        }
    }
}

/// Plaintext ledgers by default; `CTXBUILDER_COMPLIANCE_KEY` switches both
/// sinks to the envelope-encrypted backend.
fn build_sinks(paths: &WorkspacePaths) -> anyhow::Result<Arc<ComplianceSinks>> {
    let sinks = match std::env::var("CTXBUILDER_COMPLIANCE_KEY") {
        Ok(key_path) => {
            let key_path = Utf8PathBuf::from(key_path);
            info!(key = %key_path, "using encrypted compliance backend");
            ComplianceSinks::new(
                Arc::new(
                    DecisionLedger::open_encrypted(paths.decisions_log_path(), &key_path)
                        .context("opening encrypted decision ledger")?,
                ),
                Arc::new(
                    LlmCallLog::open_encrypted(paths.llm_calls_log_path(), &key_path)
                        .context("opening encrypted LLM call log")?,
                ),
                paths.compliance_errors_log_path(),
            )
        }
        Err(_) => ComplianceSinks::new(
            Arc::new(DecisionLedger::open(paths.decisions_log_path())),
            Arc::new(LlmCallLog::open(paths.llm_calls_log_path())),
            paths.compliance_errors_log_path(),
        ),
    };
    Ok(Arc::new(sinks))
}

/// Provider order: layout service when configured, plain text, vision
/// fallback for images, local OCR last.
fn build_providers(
    backend: &Arc<AuditedBackend>,
    config: &PipelineConfig,
) -> Arc<ProviderRegistry> {
    let mut providers: Vec<Arc<dyn IngestionProvider>> = Vec::new();
    if let Ok(di) = DiLikeProvider::new_from_env() {
        providers.push(Arc::new(di));
    }
    providers.push(Arc::new(PlainTextProvider::new()));
    providers.push(Arc::new(VisionLlmProvider::new(
        Arc::clone(backend) as Arc<dyn ctxbuilder_llm::LlmBackend>,
        config.extractor_model.clone(),
    )));
    providers.push(Arc::new(OcrProvider::new()));
    Arc::new(ProviderRegistry::new(providers))
}

fn print_run_digest(report: &ctxbuilder_engine::RunReport) {
    println!("run {} -> {:?}", report.run_id, report.status);
    println!(
        "  ingestion: {} ingested, {} reused, {} failed",
        report.phases.ingestion.ingested,
        report.phases.ingestion.skipped,
        report.phases.ingestion.failed
    );
    println!(
        "  classification: {} classified ({} low-confidence)",
        report.phases.classification.classified, report.phases.classification.low_confidence
    );
    println!(
        "  extraction: {} attempted, {} succeeded, {} failed, {} unsupported",
        report.phases.extraction.attempted,
        report.phases.extraction.succeeded,
        report.phases.extraction.failed,
        report.phases.extraction.skipped_unsupported
    );
    println!(
        "  gate: {} pass / {} warn / {} fail",
        report.phases.quality_gate.pass,
        report.phases.quality_gate.warn,
        report.phases.quality_gate.fail
    );

    let failed: Vec<_> = report
        .summary
        .docs
        .iter()
        .filter(|d| d.state == ctxbuilder_workspace::DocState::Failed)
        .collect();
    if !failed.is_empty() {
        println!("  failed documents:");
        for doc in failed {
            println!(
                "    {} ({}): {} at {}",
                doc.doc_id,
                doc.filename,
                doc.error_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
                doc.failed_phase.as_deref().unwrap_or("?")
            );
        }
    }
    if !report.committed {
        println!("  note: run not committed (.complete withheld)");
    }
}

pub fn runs_command(workspaces_root: Option<&str>, command: RunsCommands) -> ExitCode {
    match command {
        RunsCommands::List { workspace } => {
            let paths = WorkspacePaths::new(resolve_workspace(workspaces_root, &workspace));
            let store = RunStore::new(paths);
            match store.list_runs() {
                Ok(runs) if runs.is_empty() => {
                    println!("no runs");
                    ExitCode::SUCCESS
                }
                Ok(runs) => {
                    for run in runs {
                        let status = run
                            .status
                            .map(|s| format!("{s:?}").to_lowercase())
                            .unwrap_or_else(|| "uncommitted".to_string());
                        println!("{}  {}", run.run_id, status);
                    }
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("error: {e}");
                    ExitCode::USER_ERROR
                }
            }
        }
        RunsCommands::Show { run_id, workspace } => {
            let paths = WorkspacePaths::new(resolve_workspace(workspaces_root, &workspace));
            let store = RunStore::new(paths);
            match (store.load_summary(&run_id), store.load_metrics(&run_id)) {
                (Ok(summary), metrics) => {
                    println!("run {} -> {:?}", summary.run_id, summary.status);
                    println!(
                        "  {} document(s), started {}, finished {}",
                        summary.docs.len(),
                        summary.started_at,
                        summary.finished_at
                    );
                    for doc in &summary.docs {
                        println!(
                            "  {} {} [{}] {:?}{}",
                            doc.doc_id,
                            doc.filename,
                            doc.doc_type.as_deref().unwrap_or("-"),
                            doc.state,
                            doc.error_code
                                .map(|c| format!(" ({c})"))
                                .unwrap_or_default()
                        );
                    }
                    if let Ok(metrics) = metrics {
                        println!("metrics:");
                        println!(
                            "{}",
                            serde_json::to_string_pretty(&metrics).unwrap_or_default()
                        );
                    }
                    ExitCode::SUCCESS
                }
                (Err(e), _) => {
                    eprintln!("error: {e}");
                    ExitCode::USER_ERROR
                }
            }
        }
    }
}

pub fn workspace_command(workspaces_root: Option<&str>, command: WorkspaceCommands) -> ExitCode {
    match command {
        WorkspaceCommands::Reset {
            workspace_id,
            dry_run,
            force,
        } => {
            let paths = WorkspacePaths::new(resolve_workspace(workspaces_root, &workspace_id));
            match reset_workspace(&paths, dry_run, force) {
                Ok(report) => {
                    let verb = if report.dry_run { "would remove" } else { "removed" };
                    if report.removed.is_empty() {
                        println!("nothing to remove");
                    }
                    for path in &report.removed {
                        println!("{verb} {path}");
                    }
                    ExitCode::SUCCESS
                }
                Err(e @ ResetError::ForceRequired { .. }) => {
                    eprintln!("error: {e}");
                    ExitCode::USER_ERROR
                }
                Err(e) => {
                    eprintln!("error: {e}");
                    ExitCode::FATAL
                }
            }
        }
    }
}
