use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use depgrid_core::{is_within, normalize_path, Relation};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = ".depgrid.yaml";

/// Project-level settings. Relative paths resolve against the project root.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    pub memory_dir: String,
    pub doc_dirs: Vec<String>,
    pub backup_dir: String,
    pub backup_retention: usize,
    pub excluded_dirs: Vec<String>,
    pub excluded_paths: Vec<String>,
    pub char_priority: BTreeMap<Relation, u8>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            memory_dir: "cline_docs".to_string(),
            doc_dirs: vec!["docs".to_string()],
            backup_dir: "cline_docs/backups".to_string(),
            backup_retention: 2,
            excluded_dirs: Vec::new(),
            excluded_paths: Vec::new(),
            char_priority: default_char_priority(),
        }
    }
}

fn default_char_priority() -> BTreeMap<Relation, u8> {
    BTreeMap::from([
        (Relation::Mutual, 5),
        (Relation::DependsOn, 4),
        (Relation::DependedOnBy, 4),
        (Relation::Documentation, 3),
        (Relation::SemanticStrong, 2),
        (Relation::SemanticWeak, 1),
        (Relation::VerifiedNone, 1),
        (Relation::Empty, 0),
        (Relation::Placeholder, 0),
        (Relation::Diagonal, 0),
    ])
}

impl TrackerConfig {
    /// Load a YAML config file. A missing file yields the defaults.
    ///
    /// # Errors
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found; using defaults");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Resolve every configured path against `root`.
    #[must_use]
    pub fn scope(&self, root: &Path) -> ProjectScope {
        let resolve = |entry: &String| normalize_path(&root.join(entry).to_string_lossy());
        let mut excluded = self.excluded_dirs.iter().map(resolve).collect::<Vec<_>>();
        excluded.extend(self.excluded_paths.iter().map(resolve));

        let mut char_priority = default_char_priority();
        char_priority.extend(self.char_priority.iter().map(|(relation, rank)| (*relation, *rank)));

        ProjectScope {
            root: root.to_path_buf(),
            memory_dir: root.join(&self.memory_dir),
            backup_dir: root.join(&self.backup_dir),
            backup_retention: self.backup_retention,
            doc_roots: self.doc_dirs.iter().map(resolve).collect(),
            excluded,
            char_priority,
        }
    }
}

/// A [`TrackerConfig`] resolved against one project root.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ProjectScope {
    pub root: PathBuf,
    pub memory_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub backup_retention: usize,
    pub doc_roots: Vec<String>,
    pub excluded: Vec<String>,
    pub char_priority: BTreeMap<Relation, u8>,
}

impl ProjectScope {
    #[must_use]
    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded.iter().any(|root| is_within(path, root))
    }

    #[must_use]
    pub fn in_doc_root(&self, path: &str) -> bool {
        self.doc_roots.iter().any(|root| is_within(path, root))
    }

    #[must_use]
    pub fn priority(&self, relation: Relation) -> u8 {
        self.char_priority.get(&relation).copied().unwrap_or(0)
    }
}
