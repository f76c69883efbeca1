//! Workspace reset.

use crate::paths::WorkspacePaths;
use camino::Utf8PathBuf;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ResetError {
    #[error("workspace reset requires --force (would delete {target_count} directories)")]
    ForceRequired { target_count: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What a reset would (or did) remove.
#[derive(Debug, Clone)]
pub struct ResetReport {
    pub removed: Vec<Utf8PathBuf>,
    pub dry_run: bool,
}

/// Clear run outputs, registry caches, and logs. Claim documents and their
/// labels survive; those are reviewer work, not run state.
pub fn reset_workspace(
    paths: &WorkspacePaths,
    dry_run: bool,
    force: bool,
) -> Result<ResetReport, ResetError> {
    let targets: Vec<Utf8PathBuf> = [
        paths.runs_dir(),
        paths.doc_index_path(),
        paths.claim_index_path(),
        paths.logs_dir(),
        paths.version_bundles_dir(),
    ]
    .into_iter()
    .filter(|p| p.exists())
    .collect();

    if dry_run {
        return Ok(ResetReport {
            removed: targets,
            dry_run: true,
        });
    }

    if !force {
        return Err(ResetError::ForceRequired {
            target_count: targets.len(),
        });
    }

    for target in &targets {
        if target.is_dir() {
            std::fs::remove_dir_all(target.as_std_path())?;
        } else {
            std::fs::remove_file(target.as_std_path())?;
        }
        info!(path = %target, "workspace reset removed");
    }

    Ok(ResetReport {
        removed: targets,
        dry_run: false,
    })
}
