//! Workspace layout and `.stride/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

use super::config::{StrideConfig, load_config, write_config};

/// Canonical paths for a workspace root.
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    pub stride_dir: PathBuf,
    pub config_path: PathBuf,
    pub gitignore_path: PathBuf,
}

impl WorkspacePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let stride_dir = root.join(".stride");
        Self {
            root: root.clone(),
            config_path: stride_dir.join("config.toml"),
            gitignore_path: stride_dir.join(".gitignore"),
            stride_dir,
        }
    }

    /// Resolve a configured path against the root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn plan_path(&self, cfg: &StrideConfig) -> PathBuf {
        self.resolve(&cfg.plan_path)
    }

    pub fn reports_dir(&self, cfg: &StrideConfig) -> PathBuf {
        self.resolve(&cfg.reports_dir)
    }

    /// Short identifier passed to the planner.
    pub fn workspace_id(&self) -> String {
        self.root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.root.display().to_string())
    }

    pub fn load_config(&self) -> Result<StrideConfig> {
        load_config(&self.config_path)
    }
}

/// Options for [`init_workspace`].
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// Overwrite existing stride-owned files.
    pub force: bool,
}

/// Create `.stride/` scaffolding and a plan skeleton in `root`.
///
/// Fails if `.stride/` already exists unless `options.force` is set. An
/// existing plan is never overwritten.
#[instrument(skip_all, fields(root = %root.display(), force = options.force))]
pub fn init_workspace(root: &Path, options: &InitOptions) -> Result<WorkspacePaths> {
    let paths = WorkspacePaths::new(root);
    if paths.stride_dir.exists() && !paths.stride_dir.is_dir() {
        return Err(anyhow!("stride init: .stride exists but is not a directory"));
    }
    if paths.stride_dir.exists() && !options.force {
        return Err(anyhow!(
            "stride init: .stride already exists (use --force to overwrite)"
        ));
    }

    fs::create_dir_all(&paths.stride_dir)
        .with_context(|| format!("create directory {}", paths.stride_dir.display()))?;
    write_file(&paths.gitignore_path, STRIDE_GITIGNORE)?;

    let cfg = StrideConfig::default();
    write_config(&paths.config_path, &cfg)?;

    let plan_path = paths.plan_path(&cfg);
    if plan_path.exists() {
        debug!(plan = %plan_path.display(), "keeping existing plan");
    } else {
        write_file(&plan_path, PLAN_PLACEHOLDER)?;
    }
    Ok(paths)
}

/// Read the plan text.
pub fn read_plan(path: &Path) -> Result<String> {
    let plan = fs::read_to_string(path).with_context(|| format!("read plan {}", path.display()))?;
    if plan.trim().is_empty() {
        return Err(anyhow!("plan {} is empty", path.display()));
    }
    Ok(plan)
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write file {}", path.display()))
}

const PLAN_PLACEHOLDER: &str = "# Plan\n\nDescribe what should be built. The planner splits this into tasks.\n";
const STRIDE_GITIGNORE: &str = "*.tmp\n";
