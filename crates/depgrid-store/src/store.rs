use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use depgrid_core::{normalize_path, order_keys, Grid, Tracker};

use crate::cache::{derived_pattern, tracker_data_pattern, DERIVED_NAMESPACES, TRACKER_DATA};
use crate::document::{Layout, ManagedDocument};
use crate::format::{parse_tracker, render_tracker};
use crate::{write_atomic, CacheInvalidator, GridValidationFailed, NoopInvalidator, TrackerCache};

/// Reads and writes whole tracker files.
#[derive(Clone)]
pub struct TrackerStore {
    invalidator: Arc<dyn CacheInvalidator>,
    cache: Option<Arc<TrackerCache>>,
}

impl Default for TrackerStore {
    fn default() -> Self {
        Self::new(Arc::new(NoopInvalidator))
    }
}

impl std::fmt::Debug for TrackerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerStore").field("cached", &self.cache.is_some()).finish()
    }
}

impl TrackerStore {
    #[must_use]
    pub fn new(invalidator: Arc<dyn CacheInvalidator>) -> Self {
        Self { invalidator, cache: None }
    }

    /// A store that serves [`TrackerStore::read_cached`] from `cache` and
    /// invalidates it on write.
    #[must_use]
    pub fn with_cache(cache: Arc<TrackerCache>) -> Self {
        Self { invalidator: cache.clone(), cache: Some(cache) }
    }

    /// Read a standalone tracker file. A missing file is an empty tracker.
    ///
    /// # Errors
    /// Returns an error when the file exists but cannot be read as UTF-8 text.
    pub fn read(&self, path: &Path) -> Result<Tracker> {
        self.read_layout(path, &Layout::Standalone)
    }

    /// Read a tracker, parsing only the managed region of embedded layouts.
    ///
    /// # Errors
    /// Returns an error when the file exists but cannot be read as UTF-8 text.
    pub fn read_layout(&self, path: &Path, layout: &Layout) -> Result<Tracker> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "tracker file not found; using empty tracker");
                return Ok(Tracker::default());
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read tracker file {}", path.display()))
            }
        };

        let tracker = match layout {
            Layout::Standalone => parse_tracker(&text),
            Layout::Embedded { markers, .. } => match ManagedDocument::parse(&text, markers) {
                Some(document) => parse_tracker(&document.region),
                None => {
                    tracing::warn!(path = %path.display(), "managed region markers not found; parsing whole document");
                    parse_tracker(&text)
                }
            },
        };
        Ok(tracker)
    }

    /// Like [`TrackerStore::read_layout`], keyed on path and modification time.
    ///
    /// # Errors
    /// Returns an error when the file exists but cannot be read.
    pub fn read_cached(&self, path: &Path, layout: &Layout) -> Result<Tracker> {
        let (Some(cache), Some(key)) = (&self.cache, TrackerCache::key_for(path)) else {
            return self.read_layout(path, layout);
        };
        if let Some(hit) = cache.get(&key) {
            tracing::debug!(path = %path.display(), "tracker cache hit");
            return Ok(hit);
        }
        let tracker = self.read_layout(path, layout)?;
        cache.insert(key, tracker.clone());
        Ok(tracker)
    }

    /// Validate, repair and write `tracker` as a standalone file.
    ///
    /// # Errors
    /// See [`TrackerStore::write_layout`].
    pub fn write(&self, path: &Path, tracker: &Tracker) -> Result<Tracker> {
        self.write_layout(path, tracker, &Layout::Standalone)
    }

    /// Validate, repair and write `tracker`, returning what was written.
    ///
    /// Rows that fail to decode, have the wrong width or lack their diagonal are
    /// reinitialized. Content outside an embedded region is preserved.
    ///
    /// # Errors
    /// Returns [`GridValidationFailed`] when the row set does not match the key set
    /// (the file is left untouched), or an I/O error when writing fails.
    pub fn write_layout(&self, path: &Path, tracker: &Tracker, layout: &Layout) -> Result<Tracker> {
        let keys = tracker
            .keys
            .iter()
            .map(|(key, key_path)| (key.clone(), normalize_path(key_path)))
            .collect();
        let order = order_keys(tracker.keys.keys());

        let issues = Grid::check(&order, &tracker.grid);
        if let Some(issue) = issues.iter().find(|issue| issue.is_structural()) {
            tracing::error!(path = %path.display(), issue = %issue.describe(), "refusing to write tracker");
            return Err(GridValidationFailed {
                path: path.to_path_buf(),
                reason: issue.describe(),
            }
            .into());
        }
        for issue in &issues {
            tracing::warn!(path = %path.display(), issue = %issue.describe(), "repairing grid row before write");
        }

        let (grid, _) = Grid::decode(&order, &tracker.grid);
        let written = Tracker {
            keys,
            grid: grid.encode(),
            last_key_edit: tracker.last_key_edit.clone(),
            last_grid_edit: tracker.last_grid_edit.clone(),
        };
        let body = render_tracker(&written, &order);

        let contents = match layout {
            Layout::Standalone => body,
            Layout::Embedded { markers, template } => {
                let existing = match fs::read_to_string(path) {
                    Ok(text) => Some(text),
                    Err(err) if err.kind() == ErrorKind::NotFound => None,
                    Err(err) => {
                        return Err(err).with_context(|| {
                            format!("failed to read tracker document {}", path.display())
                        })
                    }
                };
                let document = match existing.as_deref().map(|text| ManagedDocument::parse(text, markers)) {
                    Some(Some(document)) => document,
                    Some(None) => {
                        tracing::warn!(path = %path.display(), "managed region markers not found; regenerating document from template");
                        ManagedDocument::from_template(template, markers)
                    }
                    None => ManagedDocument::from_template(template, markers),
                };
                document.with_region(&body).render()
            }
        };

        write_atomic(path, contents.as_bytes())?;
        tracing::info!(path = %path.display(), keys = order.len(), "wrote tracker");
        self.invalidator.invalidate(TRACKER_DATA, &tracker_data_pattern(path));
        Ok(written)
    }

    /// Drop derived computations for `path` in every derived namespace.
    pub fn invalidate_derived(&self, path: &Path) {
        let pattern = derived_pattern(path);
        for namespace in DERIVED_NAMESPACES {
            self.invalidator.invalidate(namespace, &pattern);
        }
    }
}
