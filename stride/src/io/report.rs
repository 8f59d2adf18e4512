//! Per-task review reports (`review_NN.md`).

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::types::{ReviewVerdict, TaskDescriptor};

/// `<dir>/review_NN.md` for the task at `cursor`.
pub fn report_path(dir: &Path, cursor: usize) -> PathBuf {
    dir.join(format!("review_{cursor:02}.md"))
}

pub fn render_report(task: &TaskDescriptor, verdict: &ReviewVerdict, revision_count: u32) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Review: {}", task.description);
    out.push('\n');
    let _ = writeln!(out, "- Result: {}", verdict.result.as_str());
    let _ = writeln!(out, "- Needs revision: {}", verdict.needs_revision);
    let _ = writeln!(out, "- Revision count: {revision_count}");
    if !task.write_paths.is_empty() {
        let _ = writeln!(out, "- Files: {}", task.write_paths.join(", "));
    }
    out.push_str("\n## Comment\n\n");
    out.push_str(verdict.comment.trim());
    out.push('\n');
    out
}

/// Write (or overwrite) the report for `cursor`.
pub fn write_report(
    dir: &Path,
    cursor: usize,
    task: &TaskDescriptor,
    verdict: &ReviewVerdict,
    revision_count: u32,
) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("create reports dir {}", dir.display()))?;
    let path = report_path(dir, cursor);
    fs::write(&path, render_report(task, verdict, revision_count))
        .with_context(|| format!("write report {}", path.display()))?;
    debug!(path = %path.display(), "review report written");
    Ok(path)
}
