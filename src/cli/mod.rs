//! Command-line interface: a thin façade over the pipeline crates.

mod args;
mod commands;

pub use args::{Cli, Commands, PipelineCommands, RunArgs, RunsCommands, WorkspaceCommands};

use ctxbuilder_utils::ExitCode;

/// Dispatch a parsed CLI invocation.
pub async fn dispatch(cli: Cli) -> ExitCode {
    let workspaces_root = cli.workspaces_root.as_deref();
    match cli.command {
        Commands::Pipeline { command } => match command {
            PipelineCommands::Run(args) => commands::pipeline_run(workspaces_root, args).await,
            PipelineCommands::Runs { command } => commands::runs_command(workspaces_root, command),
        },
        Commands::Workspace { command } => commands::workspace_command(workspaces_root, command),
    }
}
