use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;
use time::OffsetDateTime;

pub mod backup;
pub mod cache;
pub mod config;
pub mod document;
pub mod export;
pub mod format;
pub mod policy;
pub mod reconcile;
pub mod store;

pub use backup::BackupManager;
pub use cache::{
    CacheInvalidator, NoopInvalidator, TrackerCache, DERIVED_NAMESPACES, GRID_DECODE,
    GRID_DEPENDENCIES, GRID_VALIDATION, TRACKER_DATA,
};
pub use config::{ProjectScope, TrackerConfig, DEFAULT_CONFIG_FILE};
pub use document::{Layout, ManagedDocument, Markers};
pub use export::{export, ExportFormat};
pub use format::{parse_tracker, render_tracker};
pub use policy::{
    layout_for_path, policy_for, DocPolicy, GlobalPolicy, ModulePolicy, TrackerKind, TrackerPolicy,
};
pub use reconcile::{MergeReport, ReconcileReport, Reconciler, RemovalReport};
pub use store::TrackerStore;

/// Removal or merge was requested against a tracker file that does not exist.
#[derive(Debug, thiserror::Error)]
#[error("tracker file not found: {}", path.display())]
pub struct TrackerNotFound {
    pub path: PathBuf,
}

/// A write was refused because the grid is not square over the key set.
#[derive(Debug, thiserror::Error)]
#[error("grid validation failed for {}: {reason}", path.display())]
pub struct GridValidationFailed {
    pub path: PathBuf,
    pub reason: String,
}

pub(crate) fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .context("failed to format RFC3339 timestamp")
}

/// Replace `path` with `contents` through a temp file in the same directory.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create directory {}", parent.display()))?;

    let mut temp = NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
    temp.write_all(contents)
        .with_context(|| format!("failed to write temp file for {}", path.display()))?;
    temp.as_file()
        .sync_all()
        .with_context(|| format!("failed to sync temp file for {}", path.display()))?;
    temp.persist(path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

pub(crate) fn display_path(path: &Path) -> String {
    depgrid_core::normalize_path(&path.to_string_lossy())
}
