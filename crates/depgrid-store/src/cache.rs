use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use depgrid_core::Tracker;
use regex_lite::Regex;

pub const TRACKER_DATA: &str = "tracker_data";
pub const GRID_DECODE: &str = "grid_decode";
pub const GRID_VALIDATION: &str = "grid_validation";
pub const GRID_DEPENDENCIES: &str = "grid_dependencies";

/// Namespaces holding computations derived from a tracker's grid.
pub const DERIVED_NAMESPACES: [&str; 3] = [GRID_DECODE, GRID_VALIDATION, GRID_DEPENDENCIES];

/// Receives a notification after every successful tracker write.
pub trait CacheInvalidator: Send + Sync {
    /// Drop every entry in `namespace` whose key matches the `key_pattern` regex.
    fn invalidate(&self, namespace: &str, key_pattern: &str);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInvalidator;

impl CacheInvalidator for NoopInvalidator {
    fn invalidate(&self, _namespace: &str, _key_pattern: &str) {}
}

/// In-memory cache of parsed trackers keyed by path and modification time.
///
/// Entries live under `<namespace>:<path>:<mtime nanos>`; a file touched after
/// caching simply misses.
#[derive(Debug, Default)]
pub struct TrackerCache {
    entries: Mutex<BTreeMap<String, Tracker>>,
}

impl TrackerCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Tracker>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Cache key for `path` at its current modification time, if it has one.
    #[must_use]
    pub fn key_for(path: &Path) -> Option<String> {
        let modified = path.metadata().and_then(|metadata| metadata.modified()).ok()?;
        Some(format!("{TRACKER_DATA}:{}:{}", crate::display_path(path), mtime_nanos(modified)))
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Tracker> {
        self.lock().get(key).cloned()
    }

    pub fn insert(&self, key: String, tracker: Tracker) {
        self.lock().insert(key, tracker);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

fn mtime_nanos(modified: SystemTime) -> u128 {
    modified.duration_since(UNIX_EPOCH).map_or(0, |elapsed| elapsed.as_nanos())
}

impl CacheInvalidator for TrackerCache {
    fn invalidate(&self, namespace: &str, key_pattern: &str) {
        let pattern = match Regex::new(key_pattern) {
            Ok(pattern) => pattern,
            Err(err) => {
                tracing::warn!(namespace, key_pattern, error = %err, "ignoring invalid cache key pattern");
                return;
            }
        };
        let prefix = format!("{namespace}:");
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|key, _| {
            !matches!(key.strip_prefix(&prefix), Some(rest) if pattern.is_match(rest))
        });
        let dropped = before - entries.len();
        if dropped > 0 {
            tracing::debug!(namespace, key_pattern, dropped, "invalidated cache entries");
        }
    }
}

/// Pattern matching every cache key for `path` in the tracker-data namespace.
#[must_use]
pub fn tracker_data_pattern(path: &Path) -> String {
    format!("^{}:", regex_lite::escape(&crate::display_path(path)))
}

/// Pattern matching any derived-cache key that mentions `path`.
#[must_use]
pub fn derived_pattern(path: &Path) -> String {
    regex_lite::escape(&crate::display_path(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalidation_is_scoped_to_namespace_and_pattern() {
        let cache = TrackerCache::new();
        cache.insert("tracker_data:/p/a.md:1".to_string(), Tracker::default());
        cache.insert("tracker_data:/p/b.md:1".to_string(), Tracker::default());
        cache.insert("grid_decode:/p/a.md:1".to_string(), Tracker::default());

        cache.invalidate(TRACKER_DATA, &tracker_data_pattern(Path::new("/p/a.md")));
        assert!(cache.get("tracker_data:/p/a.md:1").is_none());
        assert!(cache.get("tracker_data:/p/b.md:1").is_some());
        assert!(cache.get("grid_decode:/p/a.md:1").is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn path_metacharacters_are_escaped() {
        let cache = TrackerCache::new();
        cache.insert("tracker_data:/p/a+b.md:1".to_string(), Tracker::default());
        cache.insert("tracker_data:/p/aab.md:1".to_string(), Tracker::default());
        cache.invalidate(TRACKER_DATA, &tracker_data_pattern(Path::new("/p/a+b.md")));
        assert!(cache.get("tracker_data:/p/aab.md:1").is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn invalid_pattern_leaves_entries_alone() {
        let cache = TrackerCache::new();
        cache.insert("tracker_data:/p/a.md:1".to_string(), Tracker::default());
        cache.invalidate(TRACKER_DATA, "(unclosed");
        assert!(!cache.is_empty());
    }
}
