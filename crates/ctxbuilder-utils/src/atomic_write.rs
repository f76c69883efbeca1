//! Atomic file operations.
//!
//! Every JSON artifact in a workspace is published with temp-file + fsync +
//! rename so readers never observe a partial file. Run commitment is a
//! separate step: the `.complete` sentinel is written only after everything
//! else in the run folder has been flushed, and its parent directory is
//! fsynced before the marker appears.

use anyhow::{Context, Result};
use camino::Utf8Path;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use tempfile::NamedTempFile;

/// Name of the sentinel file that marks a run folder as committed.
pub const COMPLETE_MARKER: &str = ".complete";

/// Atomically write string content to a file using temp + fsync + rename.
pub fn write_file_atomic(path: &Utf8Path, content: &str) -> Result<()> {
    write_bytes_atomic(path, content.as_bytes())
}

/// Atomically write raw bytes to a file using temp + fsync + rename.
pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create parent directory: {parent}"))?;

    let mut temp_file = NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temporary file in: {parent}"))?;

    temp_file
        .write_all(content)
        .with_context(|| format!("Failed to write temporary file for: {path}"))?;

    temp_file
        .as_file()
        .sync_all()
        .with_context(|| format!("Failed to fsync temporary file for: {path}"))?;

    temp_file
        .persist(path.as_std_path())
        .map_err(|e| anyhow::anyhow!(e.error))
        .with_context(|| format!("Failed to atomically rename into place: {path}"))?;

    Ok(())
}

/// Serialize a value as pretty JSON and atomically write it.
pub fn write_json_atomic<T: Serialize>(path: &Utf8Path, value: &T) -> Result<()> {
    let mut content = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize JSON for: {path}"))?;
    content.push('\n');
    write_file_atomic(path, &content)
}

/// Append a single JSONL line to a history file, creating it if needed.
///
/// The line is flushed and fsynced before returning so a crash never leaves
/// a torn tail visible to a subsequent append.
pub fn append_jsonl_line<T: Serialize>(path: &Utf8Path, value: &T) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create parent directory: {parent}"))?;

    let line = serde_json::to_string(value)
        .with_context(|| format!("Failed to serialize JSONL line for: {path}"))?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path.as_std_path())
        .with_context(|| format!("Failed to open history file: {path}"))?;

    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    file.sync_all()
        .with_context(|| format!("Failed to fsync history file: {path}"))?;

    Ok(())
}

/// Publish the `.complete` sentinel for a committed run folder.
///
/// Fsyncs the run directory first so the sentinel can only be observed
/// after every previously written artifact is durable.
pub fn publish_complete_marker(run_dir: &Utf8Path) -> Result<()> {
    fsync_dir(run_dir)?;

    let marker = run_dir.join(COMPLETE_MARKER);
    let file = File::create(marker.as_std_path())
        .with_context(|| format!("Failed to create complete marker in: {run_dir}"))?;
    file.sync_all()
        .with_context(|| format!("Failed to fsync complete marker in: {run_dir}"))?;

    fsync_dir(run_dir)?;
    Ok(())
}

/// Whether a run folder carries the `.complete` sentinel.
#[must_use]
pub fn is_committed(run_dir: &Utf8Path) -> bool {
    run_dir.join(COMPLETE_MARKER).exists()
}

#[cfg(unix)]
fn fsync_dir(dir: &Utf8Path) -> Result<()> {
    let handle = File::open(dir.as_std_path())
        .with_context(|| format!("Failed to open directory for fsync: {dir}"))?;
    handle
        .sync_all()
        .with_context(|| format!("Failed to fsync directory: {dir}"))?;
    Ok(())
}

#[cfg(not(unix))]
fn fsync_dir(_dir: &Utf8Path) -> Result<()> {
    // Directory fsync is not available on this platform; the file-level
    // fsyncs above still bound the data loss window.
    Ok(())
}
