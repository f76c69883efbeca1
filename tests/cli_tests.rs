//! CLI surface tests: argument parsing, exit codes, and the offline paths
//! (dry run, runs listing, workspace reset). Anything needing a live LLM
//! provider is covered by the engine's scripted end-to-end tests.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn bin() -> Command {
    Command::cargo_bin("ctxbuilder").unwrap()
}

fn seed_workspace(root: &std::path::Path, name: &str) {
    let config = root.join("workspaces").join(name).join("config");
    std::fs::create_dir_all(config.join("specs")).unwrap();
    std::fs::write(
        config.join("doc_type_catalog.yaml"),
        r#"
- doc_type: loss_notice
  description: First notice of loss
  cues: ["fecha del incidente"]
- doc_type: supporting_document
  description: Untyped supporting material
  cues: []
"#,
    )
    .unwrap();
    std::fs::write(
        config.join("specs/loss_notice.yaml"),
        r#"
doc_type: loss_notice
version: "1"
required_fields: [incident_date]
field_rules:
  incident_date:
    normalize: date_to_iso
    validate: is_iso_date
    hints: ["fecha"]
quality_gate:
  pass_if: { min_required_present_ratio: 1.0, min_evidence_rate: 0.8 }
  warn_if: { min_required_present_ratio: 1.0, min_evidence_rate: 0.0 }
  fail_if: { otherwise: true }
"#,
    )
    .unwrap();
}

#[test]
fn help_shows_subcommands_and_exit_codes() {
    bin()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("pipeline"))
        .stdout(predicate::str::contains("workspace"));
}

#[test]
fn missing_subcommand_is_usage_error() {
    bin().assert().failure().code(2);
}

#[test]
fn dry_run_lists_plan_without_credentials() {
    let dir = TempDir::new().unwrap();
    seed_workspace(dir.path(), "ws1");

    let input = dir.path().join("inbox/claim-1");
    std::fs::create_dir_all(&input).unwrap();
    std::fs::write(input.join("aviso.txt"), "Fecha del incidente: 13/01/2024").unwrap();

    bin()
        .current_dir(dir.path())
        .env_remove("OPENAI_API_KEY")
        .args([
            "pipeline",
            "run",
            "--input",
            "inbox",
            "--workspace",
            "ws1",
            "--dry-run",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 document(s) would be processed"))
        .stdout(predicate::str::contains("claim-1"));
}

#[test]
fn run_without_credentials_is_user_error() {
    let dir = TempDir::new().unwrap();
    seed_workspace(dir.path(), "ws1");

    let input = dir.path().join("inbox/claim-1");
    std::fs::create_dir_all(&input).unwrap();
    std::fs::write(input.join("aviso.txt"), "texto").unwrap();

    bin()
        .current_dir(dir.path())
        .env_remove("OPENAI_API_KEY")
        .env_remove("AZURE_OPENAI_ENDPOINT")
        .args(["pipeline", "run", "--input", "inbox", "--workspace", "ws1"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("API key"));
}

#[test]
fn missing_catalog_is_fatal() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("inbox/claim-1");
    std::fs::create_dir_all(&input).unwrap();
    std::fs::write(input.join("doc.txt"), "texto").unwrap();

    bin()
        .current_dir(dir.path())
        .args(["pipeline", "run", "--input", "inbox", "--workspace", "empty"])
        .assert()
        .failure()
        .code(4)
        .stderr(predicate::str::contains("catalog"));
}

#[test]
fn runs_list_on_fresh_workspace_is_empty() {
    let dir = TempDir::new().unwrap();
    seed_workspace(dir.path(), "ws1");

    bin()
        .current_dir(dir.path())
        .args(["pipeline", "runs", "list", "--workspace", "ws1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no runs"));
}

#[test]
fn workspace_reset_dry_run_then_force() {
    let dir = TempDir::new().unwrap();
    seed_workspace(dir.path(), "ws1");
    let runs = dir.path().join("workspaces/ws1/runs/20240101T000000Z_x");
    std::fs::create_dir_all(&runs).unwrap();

    bin()
        .current_dir(dir.path())
        .args(["workspace", "reset", "--workspace-id", "ws1", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("would remove"));
    assert!(runs.exists());

    bin()
        .current_dir(dir.path())
        .args(["workspace", "reset", "--workspace-id", "ws1"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("--force"));

    bin()
        .current_dir(dir.path())
        .args(["workspace", "reset", "--workspace-id", "ws1", "--force"])
        .assert()
        .success();
    assert!(!runs.exists());
}

#[test]
fn invalid_stage_list_is_user_error() {
    let dir = TempDir::new().unwrap();
    seed_workspace(dir.path(), "ws1");
    let input = dir.path().join("inbox/claim-1");
    std::fs::create_dir_all(&input).unwrap();
    std::fs::write(input.join("doc.txt"), "texto").unwrap();

    bin()
        .current_dir(dir.path())
        .args([
            "pipeline",
            "run",
            "--input",
            "inbox",
            "--workspace",
            "ws1",
            "--stages",
            "ingest,transmogrify",
        ])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("unknown stage"));
}
