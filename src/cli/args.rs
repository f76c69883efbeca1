//! CLI argument definitions.

use clap::{Args, Parser, Subcommand};

/// ctxbuilder - claim document pipeline
#[derive(Parser)]
#[command(name = "ctxbuilder")]
#[command(about = "Ingest, classify, and extract insurance claim documents with an audit trail")]
#[command(long_about = r#"
ctxbuilder processes insurance claim documents: canonical text extraction,
doc-type classification, typed field extraction with page/offset provenance,
quality gating, and a tamper-evident compliance ledger.

EXAMPLES:
  # Process every claim folder under ./inbox into workspace "prod"
  ctxbuilder pipeline run --input ./inbox --workspace prod

  # Restrict to two claims and skip extraction
  ctxbuilder pipeline run --input ./inbox --workspace prod \
      --claims claim-104,claim-107 --stages ingest,classify

  # Inspect runs
  ctxbuilder pipeline runs list --workspace prod
  ctxbuilder pipeline runs show 20240113T100000Z_9f2c1aa --workspace prod

  # Clear run outputs (claims and labels survive)
  ctxbuilder workspace reset --workspace-id prod --dry-run

EXIT CODES:
  0  success
  2  user error (arguments, configuration)
  3  partial (run committed, some documents failed)
  4  fatal (no artifacts written)
  5  cancelled

ENVIRONMENT:
  OPENAI_API_KEY, or AZURE_OPENAI_ENDPOINT / AZURE_OPENAI_DEPLOYMENT /
  AZURE_OPENAI_API_VERSION / AZURE_OPENAI_API_KEY for Azure OpenAI.
  AZURE_DI_ENDPOINT / AZURE_DI_API_KEY enable the layout-analysis provider.
  TESSERACT_CMD overrides the OCR binary path.
  CTXBUILDER_COMPLIANCE_KEY selects the encrypted ledger backend.
"#)]
#[command(version)]
pub struct Cli {
    /// Base directory containing workspaces (default: ./workspaces)
    #[arg(long, global = true, env = "CTXBUILDER_WORKSPACES_ROOT")]
    pub workspaces_root: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run and inspect pipeline executions
    Pipeline {
        #[command(subcommand)]
        command: PipelineCommands,
    },

    /// Workspace maintenance
    Workspace {
        #[command(subcommand)]
        command: WorkspaceCommands,
    },
}

#[derive(Subcommand)]
pub enum PipelineCommands {
    /// Process claim documents end to end
    Run(RunArgs),

    /// List or inspect runs
    Runs {
        #[command(subcommand)]
        command: RunsCommands,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// Input directory: one subdirectory per claim
    #[arg(long)]
    pub input: String,

    /// Workspace id (or path to a workspace directory)
    #[arg(long)]
    pub workspace: String,

    /// Comma-separated claim ids to process (default: all)
    #[arg(long)]
    pub claims: Option<String>,

    /// Stages to run: ingest,classify,extract (default: all)
    #[arg(long)]
    pub stages: Option<String>,

    /// Model for the classification router
    #[arg(long)]
    pub classifier_model: Option<String>,

    /// Model for structured extraction
    #[arg(long)]
    pub extractor_model: Option<String>,

    /// Explicit run id (default: generated from the clock)
    #[arg(long)]
    pub run_id: Option<String>,

    /// Overwrite an existing run folder
    #[arg(long)]
    pub force: bool,

    /// Compute comparative metrics against ground truth (default)
    #[arg(long, overrides_with = "no_metrics")]
    pub metrics: bool,

    /// Skip comparative metrics
    #[arg(long, overrides_with = "metrics")]
    pub no_metrics: bool,

    /// Show the processing plan without executing
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Subcommand)]
pub enum RunsCommands {
    /// List run folders, committed or not
    List {
        /// Workspace id
        #[arg(long)]
        workspace: String,
    },

    /// Show one run's summary and metrics
    Show {
        /// Run id
        run_id: String,

        /// Workspace id
        #[arg(long)]
        workspace: String,
    },
}

#[derive(Subcommand)]
pub enum WorkspaceCommands {
    /// Remove run outputs, registry caches, and logs
    Reset {
        /// Workspace id
        #[arg(long)]
        workspace_id: String,

        /// List what would be removed without removing it
        #[arg(long)]
        dry_run: bool,

        /// Actually delete
        #[arg(long)]
        force: bool,
    },
}
