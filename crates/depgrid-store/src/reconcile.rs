//! Create-or-update cycles, key removal, and tracker merges.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use depgrid_core::{
    normalize_path, order_keys, Grid, KeyRegistry, Suggestion, SuggestionReport, Tracker,
};
use serde::Serialize;

use crate::backup::BackupManager;
use crate::config::ProjectScope;
use crate::document::Layout;
use crate::policy::{layout_for_path, TrackerKind, TrackerPolicy};
use crate::store::TrackerStore;
use crate::{now_rfc3339, TrackerNotFound};

const INITIAL_CREATION: &str = "Initial creation";

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub tracker_path: PathBuf,
    pub kind: TrackerKind,
    pub created: bool,
    pub key_count: usize,
    pub added_keys: Vec<String>,
    pub removed_keys: Vec<String>,
    pub suggestions: SuggestionReport,
    pub backup_path: Option<PathBuf>,
    pub last_key_edit: String,
    pub last_grid_edit: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemovalReport {
    pub tracker_path: PathBuf,
    pub key: String,
    pub removed: bool,
    pub keys_before: usize,
    pub keys_after: usize,
    pub backup_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    pub output_path: PathBuf,
    pub primary_keys: usize,
    pub secondary_keys: usize,
    pub merged_keys: usize,
    pub backup_path: Option<PathBuf>,
    pub last_grid_edit: String,
}

/// Runs tracker operations against one project scope.
#[derive(Debug, Clone)]
pub struct Reconciler {
    scope: ProjectScope,
    store: TrackerStore,
    backups: BackupManager,
}

impl Reconciler {
    #[must_use]
    pub fn new(scope: ProjectScope, store: TrackerStore) -> Self {
        let backups = BackupManager::from_scope(&scope);
        Self { scope, store, backups }
    }

    #[must_use]
    pub fn scope(&self) -> &ProjectScope {
        &self.scope
    }

    #[must_use]
    pub fn store(&self) -> &TrackerStore {
        &self.store
    }

    #[must_use]
    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    /// Bring one tracker in line with its policy's key set and suggestions.
    ///
    /// A missing tracker is first written as an all-placeholder grid and then
    /// reconciled like any existing one. `new_keys` names keys the caller has
    /// just assigned; they are reported in the key audit string.
    ///
    /// # Errors
    /// Returns an error when the audit timestamp cannot be formatted or the
    /// tracker cannot be written.
    pub fn update(
        &self,
        policy: &dyn TrackerPolicy,
        registry: &KeyRegistry,
        suggestions: &[Suggestion],
        new_keys: &[String],
    ) -> Result<ReconcileReport> {
        let path = policy.tracker_path();
        let layout = policy.layout();
        let target = policy.select_keys(registry, suggestions);
        let order = order_keys(target.keys());
        let candidates = policy.suggestions(registry, &target, suggestions);
        tracing::debug!(
            path = %path.display(),
            kind = %policy.kind(),
            keys = order.len(),
            suggestions = candidates.len(),
            "reconciling tracker"
        );

        let created = !path.exists();
        if created {
            let initial = Tracker {
                last_key_edit: INITIAL_CREATION.to_string(),
                last_grid_edit: INITIAL_CREATION.to_string(),
                ..Tracker::from_grid(target.clone(), &Grid::initial(&order))
            };
            self.store.write_layout(&path, &initial, &layout)?;
            tracing::info!(path = %path.display(), keys = order.len(), "created tracker");
        }

        let existing = match self.store.read_layout(&path, &layout) {
            Ok(tracker) => tracker,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "unreadable tracker; rebuilding from scratch");
                Tracker::default()
            }
        };
        let (old_grid, issues) = existing.decode_grid();
        for issue in &issues {
            tracing::warn!(path = %path.display(), issue = %issue.describe(), "repaired grid row on read");
        }

        let (added_keys, removed_keys) = old_grid.key_changes(&order);
        let mut grid = old_grid.rebuild(&order);
        let applied = grid.apply_suggestions(&candidates);

        let now = now_rfc3339()?;
        let assigned = order.iter().filter(|key| new_keys.contains(*key)).cloned().collect::<Vec<_>>();
        let keys_changed = !added_keys.is_empty() || !removed_keys.is_empty();
        let last_key_edit = if !assigned.is_empty() {
            format!("Assigned keys: {}", assigned.join(", "))
        } else if keys_changed {
            format!(
                "Keys updated: Added {} keys; Removed {} keys",
                added_keys.len(),
                removed_keys.len()
            )
        } else {
            existing.last_key_edit.clone()
        };
        let last_grid_edit = if keys_changed {
            format!("Grid structure updated ({now})")
        } else if applied.mutated() {
            format!("Applied suggestions ({now})")
        } else {
            existing.last_grid_edit.clone()
        };

        let next = Tracker {
            last_key_edit,
            last_grid_edit,
            ..Tracker::from_grid(target, &grid)
        };
        let backup_path = if created { None } else { self.backup(&path) };
        let written = self.store.write_layout(&path, &next, &layout)?;
        self.store.invalidate_derived(&path);
        tracing::info!(
            path = %path.display(),
            added = added_keys.len(),
            removed = removed_keys.len(),
            applied = applied.applied,
            conflicts = applied.conflicts.len(),
            "reconciled tracker"
        );

        Ok(ReconcileReport {
            tracker_path: path,
            kind: policy.kind(),
            created,
            key_count: written.keys.len(),
            added_keys,
            removed_keys,
            suggestions: applied,
            backup_path,
            last_key_edit: written.last_key_edit,
            last_grid_edit: written.last_grid_edit,
        })
    }

    /// Remove one key's definition, row and column from the tracker at `path`.
    /// An absent key is a logged no-op.
    ///
    /// # Errors
    /// Returns [`TrackerNotFound`] when `path` does not exist, or an error when the
    /// tracker cannot be read or written.
    pub fn remove_key(&self, path: &Path, key: &str) -> Result<RemovalReport> {
        let layout = layout_for_path(path);
        let tracker = self.read_existing(path, &layout)?;
        self.remove_from(path, &layout, tracker, key)
    }

    /// Remove the key registered for `file_path`, falling back to the tracker's
    /// own key definitions when the registry does not know the path.
    ///
    /// # Errors
    /// Same as [`Reconciler::remove_key`].
    pub fn remove_path(
        &self,
        path: &Path,
        file_path: &str,
        registry: &KeyRegistry,
    ) -> Result<RemovalReport> {
        let layout = layout_for_path(path);
        let tracker = self.read_existing(path, &layout)?;
        let normalized = normalize_path(file_path);
        let key = registry.key_for_path(&normalized).map(str::to_string).or_else(|| {
            tracker
                .keys
                .iter()
                .find(|(_, key_path)| **key_path == normalized)
                .map(|(key, _)| key.clone())
        });

        match key {
            Some(key) => self.remove_from(path, &layout, tracker, &key),
            None => {
                tracing::warn!(path = %path.display(), file = %normalized, "no key found for path; nothing removed");
                Ok(RemovalReport {
                    tracker_path: path.to_path_buf(),
                    key: String::new(),
                    removed: false,
                    keys_before: tracker.keys.len(),
                    keys_after: tracker.keys.len(),
                    backup_path: None,
                })
            }
        }
    }

    fn remove_from(
        &self,
        path: &Path,
        layout: &Layout,
        tracker: Tracker,
        key: &str,
    ) -> Result<RemovalReport> {
        let keys_before = tracker.keys.len();
        let Some(removed_path) = tracker.keys.get(key).cloned() else {
            tracing::warn!(path = %path.display(), key, "key not present in tracker; nothing removed");
            return Ok(RemovalReport {
                tracker_path: path.to_path_buf(),
                key: key.to_string(),
                removed: false,
                keys_before,
                keys_after: keys_before,
                backup_path: None,
            });
        };

        let (grid, issues) = tracker.decode_grid();
        for issue in &issues {
            tracing::warn!(path = %path.display(), issue = %issue.describe(), "repaired grid row before removal");
        }
        let reduced = grid
            .without_key(key)
            .ok_or_else(|| anyhow!("key {key} has no grid row in {}", path.display()))?;

        let mut keys = tracker.keys;
        keys.remove(key);
        let next = Tracker {
            last_key_edit: format!("Removed key: {key} (Path: {removed_path})"),
            last_grid_edit: format!("Grid adjusted for removal of key: {key}"),
            ..Tracker::from_grid(keys, &reduced)
        };

        let backup_path = self.backup(path);
        let written = self.store.write_layout(path, &next, layout)?;
        self.store.invalidate_derived(path);
        tracing::info!(path = %path.display(), key, "removed key from tracker");

        Ok(RemovalReport {
            tracker_path: path.to_path_buf(),
            key: key.to_string(),
            removed: true,
            keys_before,
            keys_after: written.keys.len(),
            backup_path,
        })
    }

    /// Merge two trackers into `output` (defaults to `primary`).
    ///
    /// # Errors
    /// Returns [`TrackerNotFound`] when either input is missing, a validation
    /// error when both inputs are empty, or an error when writing fails.
    pub fn merge(
        &self,
        primary: &Path,
        secondary: &Path,
        output: Option<&Path>,
    ) -> Result<MergeReport> {
        let primary_tracker = self.read_existing(primary, &layout_for_path(primary))?;
        let secondary_tracker = self.read_existing(secondary, &layout_for_path(secondary))?;

        let merged = Tracker::merge(&primary_tracker, &secondary_tracker)
            .with_context(|| {
                format!("nothing to merge: {} and {}", primary.display(), secondary.display())
            })?;
        let merged = if primary_tracker.is_empty() || secondary_tracker.is_empty() {
            merged
        } else {
            let last_grid_edit = format!(
                "Merged from {} and {} on {}",
                file_label(primary),
                file_label(secondary),
                now_rfc3339()?
            );
            Tracker { last_grid_edit, ..merged }
        };

        let output = output.unwrap_or(primary);
        let backup_path = if output == primary || output == secondary {
            self.backup(output)
        } else {
            None
        };
        let written = self.store.write_layout(output, &merged, &layout_for_path(output))?;
        self.store.invalidate_derived(output);
        tracing::info!(
            primary = %primary.display(),
            secondary = %secondary.display(),
            output = %output.display(),
            keys = written.keys.len(),
            "merged trackers"
        );

        Ok(MergeReport {
            output_path: output.to_path_buf(),
            primary_keys: primary_tracker.keys.len(),
            secondary_keys: secondary_tracker.keys.len(),
            merged_keys: written.keys.len(),
            backup_path,
            last_grid_edit: written.last_grid_edit,
        })
    }

    fn read_existing(&self, path: &Path, layout: &Layout) -> Result<Tracker> {
        if !path.is_file() {
            return Err(TrackerNotFound { path: path.to_path_buf() }.into());
        }
        self.store.read_layout(path, layout)
    }

    fn backup(&self, path: &Path) -> Option<PathBuf> {
        match self.backups.backup(path) {
            Ok(backup) => backup,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "backup failed; continuing without one");
                None
            }
        }
    }
}

fn file_label(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |name| name.to_string_lossy().to_string(),
    )
}
