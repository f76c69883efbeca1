//! End-to-end pipeline scenarios over a scripted LLM backend.
//!
//! No network, no real models: the scripted backend returns canned router
//! and extraction responses, everything else is the production path from
//! source file to committed run folder.

use camino::Utf8PathBuf;
use ctxbuilder_doctext::DocTextStore;
use ctxbuilder_engine::{
    AuditSink, ComplianceSinks, PipelineConfig, PipelineOrchestrator, RunInputs,
};
use ctxbuilder_extraction::{ExtractionResult, FieldStatus, GateStatus};
use ctxbuilder_ingest::{PlainTextProvider, ProviderRegistry};
use ctxbuilder_llm::{AuditedBackend, ScriptedBackend};
use ctxbuilder_workspace::{RunStatus, WorkspacePaths};
use ctxbuilder_compliance::{DecisionLedger, DecisionStorage, LlmCallLog, LlmCallStorage};
use std::sync::Arc;
use tempfile::TempDir;

const CATALOG_YAML: &str = r#"
- doc_type: loss_notice
  description: First notice of loss from the insured
  cues: ["fecha del incidente", "parte de siniestro"]
- doc_type: police_report
  description: Police report describing an incident
  cues: ["atestado", "police report"]
- doc_type: supporting_document
  description: Untyped supporting material
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

const POLICE_REPORT_SPEC: &str = r#"
doc_type: police_report
version: "1"
required_fields: [incident_date]
field_rules:
  incident_date:
    normalize: date_to_iso
    validate: is_iso_date
    hints: ["fecha", "date"]
quality_gate:
  pass_if: { min_required_present_ratio: 1.0, min_evidence_rate: 0.8 }
  warn_if: { min_required_present_ratio: 1.0, min_evidence_rate: 0.0 }
  fail_if: { otherwise: true }
"#;

struct Harness {
    _dir: TempDir,
    workspace: Utf8PathBuf,
    input: Utf8PathBuf,
}

impl Harness {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let workspace = root.join("workspace");
        let input = root.join("input");

        let config = workspace.join("config");
        std::fs::create_dir_all(config.join("specs").as_std_path()).unwrap();
        std::fs::write(config.join("doc_type_catalog.yaml").as_std_path(), CATALOG_YAML).unwrap();
        std::fs::write(
            config.join("specs/loss_notice.yaml").as_std_path(),
            LOSS_NOTICE_SPEC,
        )
        .unwrap();
        std::fs::write(
            config.join("specs/police_report.yaml").as_std_path(),
            POLICE_REPORT_SPEC,
        )
        .unwrap();

        Self {
            _dir: dir,
            workspace,
            input,
        }
    }

    fn add_doc(&self, claim_id: &str, filename: &str, content: &str) {
        let claim_dir = self.input.join(claim_id);
        std::fs::create_dir_all(claim_dir.as_std_path()).unwrap();
        std::fs::write(claim_dir.join(filename).as_std_path(), content).unwrap();
    }

    fn orchestrator(&self, responses: Vec<String>) -> PipelineOrchestrator {
        let paths = WorkspacePaths::new(self.workspace.clone());
        paths.ensure_layout().unwrap();

        let catalog = Arc::new(
            ctxbuilder_catalog::Catalog::load(&self.workspace.join("config")).unwrap(),
        );
        let providers = Arc::new(ProviderRegistry::new(vec![Arc::new(
            PlainTextProvider::new(),
        )]));

        let sinks = Arc::new(ComplianceSinks::new(
            Arc::new(DecisionLedger::open(paths.decisions_log_path())),
            Arc::new(LlmCallLog::open(paths.llm_calls_log_path())),
            paths.compliance_errors_log_path(),
        ));
        let backend = Arc::new(AuditedBackend::new(
            Arc::new(ScriptedBackend::with_responses(responses)),
            Arc::new(AuditSink::new(Arc::clone(&sinks))),
        ));

        let config = PipelineConfig {
            classifier_model: "scripted-router".to_string(),
            extractor_model: "scripted-extractor".to_string(),
            ..PipelineConfig::default()
        };

        PipelineOrchestrator::new(paths, catalog, providers, backend, sinks, config)
    }

    fn run_inputs(&self, run_id: &str) -> RunInputs {
        RunInputs {
            input_dir: self.input.clone(),
            claims: None,
            run_id: Some(run_id.to_string()),
            force: false,
        }
    }

    fn load_extraction(&self, claim_id: &str, run_id: &str, doc_id: &str) -> ExtractionResult {
        let path = self
            .workspace
            .join(format!("claims/{claim_id}/runs/{run_id}/outputs/extraction/{doc_id}.json"));
        serde_json::from_str(&std::fs::read_to_string(path.as_std_path()).unwrap()).unwrap()
    }
}

fn classify_response(doc_type: &str, confidence: f64) -> String {
    format!(
        r#"{{"doc_type":"{doc_type}","confidence":{confidence},"language":"es","signals":["content cue match","claim form layout"],"summary":"routed by content","key_hints":{{}}}}"#
    )
}

fn extract_response(value: &str, quote: &str) -> String {
    format!(
        r#"{{"fields":[{{"name":"incident_date","value":"{value}","supporting_quote":"{quote}","page":1,"confidence":0.92}}]}}"#
    )
}

fn doc_id_for(content: &str) -> String {
    ctxbuilder_utils::ids::doc_id_from_bytes(content.as_bytes())
}

/// Golden path: one-page Spanish loss notice extracts a normalized date
/// with exact provenance and passes the gate.
#[tokio::test]
async fn golden_loss_notice() {
    let harness = Harness::new();
    let content = "Parte de siniestro. Fecha del incidente: 13/01/2024";
    harness.add_doc("claim-1", "aviso.txt", content);

    let orchestrator = harness.orchestrator(vec![
        classify_response("loss_notice", 0.92),
        extract_response("13/01/2024", "13/01/2024"),
    ]);
    let report = orchestrator
        .run(harness.run_inputs("20240113T100000Z_test1"))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert!(report.committed);
    assert_eq!(report.phases.extraction.succeeded, 1);
    assert_eq!(report.phases.quality_gate.pass, 1);
    assert_eq!(report.phases.classification.distribution["loss_notice"], 1);

    let doc_id = doc_id_for(content);
    let result = harness.load_extraction("claim-1", "20240113T100000Z_test1", &doc_id);
    assert_eq!(result.doc.doc_type, "loss_notice");
    assert!(result.doc.doc_type_confidence >= 0.8);
    assert_eq!(result.quality_gate.status, GateStatus::Pass);

    let field = result
        .fields
        .iter()
        .find(|f| f.name == "incident_date")
        .unwrap();
    assert_eq!(field.status, FieldStatus::Present);
    assert_eq!(field.value.as_deref(), Some("13/01/2024"));
    assert_eq!(field.normalized_value.as_deref(), Some("2024-01-13"));

    // Provenance binds to the canonical text exactly.
    let prov = &field.provenance[0];
    assert_eq!(prov.page, 1);
    let store = DocTextStore::new(
        harness
            .workspace
            .join(format!("claims/claim-1/docs/{doc_id}/text")),
    );
    let doc_text = store.load().unwrap();
    assert_eq!(
        doc_text.slice(prov.page, prov.char_start, prov.char_end).unwrap(),
        prov.text_quote
    );

    // The run folder is committed with all artifacts present.
    let run_dir = harness.workspace.join("runs/20240113T100000Z_test1");
    for artifact in ["manifest.json", "summary.json", "metrics.json", ".complete"] {
        assert!(run_dir.join(artifact).exists(), "missing {artifact}");
    }

    // Compliance observed the run: decisions chain verifies, calls logged.
    let ledger = DecisionLedger::open(
        harness.workspace.join("logs/decisions.jsonl"),
    );
    assert!(ledger.count().unwrap() >= 3);
    assert!(ledger.verify().unwrap().valid);
    let calls = LlmCallLog::open(harness.workspace.join("logs/llm_calls.jsonl"));
    assert_eq!(calls.count().unwrap(), 2);
}

/// A police report without its required date: field missing, gate fail,
/// run still completes and commits.
#[tokio::test]
async fn missing_required_field_fails_gate() {
    let harness = Harness::new();
    let content = "Atestado policial sin fecha registrada en el texto.";
    harness.add_doc("claim-2", "atestado.txt", content);

    let orchestrator = harness.orchestrator(vec![
        classify_response("police_report", 0.85),
        r#"{"fields":[{"name":"incident_date","value":null,"supporting_quote":null,"page":null}]}"#
            .to_string(),
    ]);
    let report = orchestrator
        .run(harness.run_inputs("20240113T110000Z_test2"))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.phases.quality_gate.fail, 1);

    let doc_id = doc_id_for(content);
    let result = harness.load_extraction("claim-2", "20240113T110000Z_test2", &doc_id);
    assert_eq!(result.quality_gate.status, GateStatus::Fail);
    assert_eq!(
        result.quality_gate.missing_required_fields,
        vec!["incident_date"]
    );
    let field = result
        .fields
        .iter()
        .find(|f| f.name == "incident_date")
        .unwrap();
    assert_eq!(field.status, FieldStatus::Missing);
}

/// Rerunning identical inputs reuses ingestion and classification but
/// re-executes extraction; both runs appear with distinct ids.
#[tokio::test]
async fn rerun_reuses_text_and_classification() {
    let harness = Harness::new();
    let content = "Parte de siniestro. Fecha del incidente: 13/01/2024";
    harness.add_doc("claim-1", "aviso.txt", content);

    let first = harness.orchestrator(vec![
        classify_response("loss_notice", 0.92),
        extract_response("13/01/2024", "13/01/2024"),
    ]);
    let report1 = first
        .run(harness.run_inputs("20240113T100000Z_first"))
        .await
        .unwrap();
    assert_eq!(report1.phases.ingestion.ingested, 1);
    assert_eq!(report1.phases.ingestion.skipped, 0);

    // Second run: only the extraction response is needed.
    let second = harness.orchestrator(vec![extract_response("13/01/2024", "13/01/2024")]);
    let report2 = second
        .run(harness.run_inputs("20240113T120000Z_second"))
        .await
        .unwrap();

    assert_eq!(report2.phases.ingestion.skipped, 1);
    assert_eq!(report2.phases.ingestion.ingested, 0);
    assert_eq!(report2.phases.extraction.attempted, 1);
    assert_eq!(report2.phases.extraction.succeeded, 1);

    let doc = &report2.summary.docs[0];
    assert!(doc.reused_text);
    assert!(doc.reused_classification);

    // Both runs are committed under distinct ids.
    for run_id in ["20240113T100000Z_first", "20240113T120000Z_second"] {
        assert!(harness
            .workspace
            .join(format!("runs/{run_id}/.complete"))
            .exists());
    }
}

/// An existing run folder requires --force.
#[tokio::test]
async fn run_folder_overwrite_requires_force() {
    let harness = Harness::new();
    let content = "Parte de siniestro. Fecha del incidente: 13/01/2024";
    harness.add_doc("claim-1", "aviso.txt", content);

    let orchestrator = harness.orchestrator(vec![
        classify_response("loss_notice", 0.92),
        extract_response("13/01/2024", "13/01/2024"),
    ]);
    orchestrator
        .run(harness.run_inputs("20240113T100000Z_dup"))
        .await
        .unwrap();

    let again = harness.orchestrator(vec![
        classify_response("loss_notice", 0.92),
        extract_response("13/01/2024", "13/01/2024"),
    ]);
    let err = again
        .run(harness.run_inputs("20240113T100000Z_dup"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("--force"));

    let mut forced = harness.run_inputs("20240113T100000Z_dup");
    forced.force = true;
    let forced_runner = harness.orchestrator(vec![extract_response("13/01/2024", "13/01/2024")]);
    forced_runner.run(forced).await.unwrap();
}

/// A doc routed to the fallback type is counted as skipped_unsupported,
/// not failed.
#[tokio::test]
async fn unsupported_doc_type_is_skipped_not_failed() {
    let harness = Harness::new();
    harness.add_doc("claim-3", "misc.txt", "A receipt for office supplies and a coffee.");

    let orchestrator =
        harness.orchestrator(vec![classify_response("supporting_document", 0.3)]);
    let report = orchestrator
        .run(harness.run_inputs("20240113T130000Z_test4"))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.phases.extraction.skipped_unsupported, 1);
    assert_eq!(report.phases.extraction.attempted, 0);
    assert_eq!(report.phases.classification.low_confidence, 1);
}
