use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use depgrid_core::{normalize_path, parent_path, KeyInfo, KeyRegistry, Relation, Suggestion};
use serde::{Deserialize, Serialize};

use crate::config::ProjectScope;
use crate::document::{Layout, Markers};

pub const GLOBAL_TRACKER_FILE: &str = "module_relationship_tracker.md";
pub const DOC_TRACKER_FILE: &str = "doc_tracker.md";
pub const MODULE_TRACKER_SUFFIX: &str = "_module.md";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TrackerKind {
    Global,
    Doc,
    Module,
}

impl TrackerKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Doc => "doc",
            Self::Module => "module",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "global" => Some(Self::Global),
            "doc" => Some(Self::Doc),
            "module" => Some(Self::Module),
            _ => None,
        }
    }
}

impl Display for TrackerKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scope rules for one tracker type: where it lives, which keys it holds, and
/// which candidate edges it accepts.
pub trait TrackerPolicy {
    fn kind(&self) -> TrackerKind;

    fn tracker_path(&self) -> PathBuf;

    /// Key string to path for every key this tracker should hold.
    fn select_keys(
        &self,
        registry: &KeyRegistry,
        suggestions: &[Suggestion],
    ) -> BTreeMap<String, String>;

    /// Candidate edges expressed over the selected keys.
    fn suggestions(
        &self,
        registry: &KeyRegistry,
        selected: &BTreeMap<String, String>,
        suggestions: &[Suggestion],
    ) -> Vec<Suggestion>;

    fn layout(&self) -> Layout {
        Layout::Standalone
    }
}

/// Build the policy for `kind`. Module trackers need the module directory.
///
/// # Errors
/// Returns an error when a module tracker is requested without a module path.
pub fn policy_for(
    kind: TrackerKind,
    scope: &ProjectScope,
    module: Option<&Path>,
) -> Result<Box<dyn TrackerPolicy>> {
    Ok(match kind {
        TrackerKind::Global => Box::new(GlobalPolicy::new(scope.clone())),
        TrackerKind::Doc => Box::new(DocPolicy::new(scope.clone())),
        TrackerKind::Module => {
            let module = module.ok_or_else(|| anyhow!("module trackers need a module path"))?;
            Box::new(ModulePolicy::new(scope.clone(), module))
        }
    })
}

/// Layout implied by a tracker's file name.
#[must_use]
pub fn layout_for_path(path: &Path) -> Layout {
    let name = path.file_name().map(|name| name.to_string_lossy().to_string()).unwrap_or_default();
    match name.strip_suffix(MODULE_TRACKER_SUFFIX) {
        Some(module) => Layout::Embedded { markers: Markers::default(), template: module_template(module) },
        None => Layout::Standalone,
    }
}

fn module_template(module: &str) -> String {
    format!(
        "# Module: {module}\n\n## Purpose & Responsibility\n\n## Interfaces\n\n## Implementation Notes\n\n## Mini Tracker\n"
    )
}

/// Edges worth propagating to other trackers. Verified-none is a leaf fact.
fn is_dependency(relation: Relation) -> bool {
    relation.is_edge() && relation != Relation::VerifiedNone
}

fn parent_of(info: &KeyInfo) -> String {
    if info.parent_path.is_empty() {
        parent_path(&info.norm_path)
    } else {
        info.parent_path.clone()
    }
}

/// Directory-level tracker over the whole project.
#[derive(Debug, Clone)]
pub struct GlobalPolicy {
    scope: ProjectScope,
}

impl GlobalPolicy {
    #[must_use]
    pub fn new(scope: ProjectScope) -> Self {
        Self { scope }
    }

    /// Nearest selected ancestor of `key`. Keys on excluded paths have none.
    fn module_of(
        &self,
        registry: &KeyRegistry,
        modules: &BTreeMap<&str, &str>,
        key: &str,
    ) -> Option<String> {
        let mut current = registry.get(key)?.norm_path.clone();
        if self.scope.is_excluded(&current) {
            return None;
        }
        loop {
            if let Some(module) = modules.get(current.as_str()) {
                return Some((*module).to_string());
            }
            let parent = parent_path(&current);
            if parent.is_empty() || parent == current {
                return None;
            }
            current = parent;
        }
    }
}

impl TrackerPolicy for GlobalPolicy {
    fn kind(&self) -> TrackerKind {
        TrackerKind::Global
    }

    fn tracker_path(&self) -> PathBuf {
        self.scope.memory_dir.join(GLOBAL_TRACKER_FILE)
    }

    fn select_keys(
        &self,
        registry: &KeyRegistry,
        _suggestions: &[Suggestion],
    ) -> BTreeMap<String, String> {
        registry
            .iter()
            .filter(|info| info.is_directory && !self.scope.is_excluded(&info.norm_path))
            .map(|info| (info.key_string.clone(), info.norm_path.clone()))
            .collect()
    }

    /// Lift file-level edges onto the nearest selected ancestor directory of each
    /// end. Pairs inside one module are dropped; competing relations for one
    /// module pair resolve by configured priority, first seen on ties.
    fn suggestions(
        &self,
        registry: &KeyRegistry,
        selected: &BTreeMap<String, String>,
        suggestions: &[Suggestion],
    ) -> Vec<Suggestion> {
        let modules = selected
            .iter()
            .map(|(key, path)| (path.as_str(), key.as_str()))
            .collect::<BTreeMap<_, _>>();

        let mut aggregated = BTreeMap::<(String, String), Relation>::new();
        for suggestion in suggestions.iter().filter(|suggestion| is_dependency(suggestion.relation)) {
            let (Some(source), Some(target)) = (
                self.module_of(registry, &modules, &suggestion.source),
                self.module_of(registry, &modules, &suggestion.target),
            ) else {
                continue;
            };
            if source == target {
                continue;
            }
            match aggregated.entry((source, target)) {
                Entry::Vacant(slot) => {
                    slot.insert(suggestion.relation);
                }
                Entry::Occupied(mut slot) => {
                    if self.scope.priority(suggestion.relation) > self.scope.priority(*slot.get()) {
                        slot.insert(suggestion.relation);
                    }
                }
            }
        }

        tracing::debug!(
            input = suggestions.len(),
            aggregated = aggregated.len(),
            "aggregated suggestions onto modules"
        );
        aggregated
            .into_iter()
            .map(|((source, target), relation)| Suggestion::new(source, target, relation))
            .collect()
    }
}

/// Tracker over every key inside a documentation root.
#[derive(Debug, Clone)]
pub struct DocPolicy {
    scope: ProjectScope,
}

impl DocPolicy {
    #[must_use]
    pub fn new(scope: ProjectScope) -> Self {
        Self { scope }
    }
}

impl TrackerPolicy for DocPolicy {
    fn kind(&self) -> TrackerKind {
        TrackerKind::Doc
    }

    fn tracker_path(&self) -> PathBuf {
        self.scope.memory_dir.join(DOC_TRACKER_FILE)
    }

    fn select_keys(
        &self,
        registry: &KeyRegistry,
        _suggestions: &[Suggestion],
    ) -> BTreeMap<String, String> {
        registry
            .iter()
            .filter(|info| {
                self.scope.in_doc_root(&info.norm_path) && !self.scope.is_excluded(&info.norm_path)
            })
            .map(|info| (info.key_string.clone(), info.norm_path.clone()))
            .collect()
    }

    fn suggestions(
        &self,
        _registry: &KeyRegistry,
        selected: &BTreeMap<String, String>,
        suggestions: &[Suggestion],
    ) -> Vec<Suggestion> {
        suggestions
            .iter()
            .filter(|suggestion| {
                suggestion.relation.is_committed()
                    && suggestion.source != suggestion.target
                    && selected.contains_key(&suggestion.source)
                    && selected.contains_key(&suggestion.target)
            })
            .cloned()
            .collect()
    }
}

/// Tracker embedded in one module's own document: the module, its direct
/// children, and the foreign keys they touch.
#[derive(Debug, Clone)]
pub struct ModulePolicy {
    scope: ProjectScope,
    module_path: String,
}

impl ModulePolicy {
    /// `module` may be relative to the project root.
    #[must_use]
    pub fn new(scope: ProjectScope, module: &Path) -> Self {
        let module_path = normalize_path(&scope.root.join(module).to_string_lossy());
        Self { scope, module_path }
    }

    #[must_use]
    pub fn module_path(&self) -> &str {
        &self.module_path
    }

    fn module_name(&self) -> &str {
        match self.module_path.rsplit('/').next() {
            Some(name) if !name.is_empty() => name,
            _ => "root",
        }
    }

    fn is_internal(&self, info: &KeyInfo) -> bool {
        !self.scope.is_excluded(&info.norm_path)
            && (info.norm_path == self.module_path || parent_of(info) == self.module_path)
    }

    fn internal_keys<'a>(&self, registry: &'a KeyRegistry) -> BTreeSet<&'a str> {
        registry
            .iter()
            .filter(|info| self.is_internal(info))
            .map(|info| info.key_string.as_str())
            .collect()
    }
}

impl TrackerPolicy for ModulePolicy {
    fn kind(&self) -> TrackerKind {
        TrackerKind::Module
    }

    fn tracker_path(&self) -> PathBuf {
        PathBuf::from(&self.module_path)
            .join(format!("{}{MODULE_TRACKER_SUFFIX}", self.module_name()))
    }

    fn select_keys(
        &self,
        registry: &KeyRegistry,
        suggestions: &[Suggestion],
    ) -> BTreeMap<String, String> {
        let internal = self.internal_keys(registry);
        let mut selected = internal
            .iter()
            .filter_map(|key| registry.get(key))
            .map(|info| (info.key_string.clone(), info.norm_path.clone()))
            .collect::<BTreeMap<_, _>>();

        for suggestion in suggestions.iter().filter(|suggestion| is_dependency(suggestion.relation)) {
            let touchpoint = if internal.contains(suggestion.source.as_str()) {
                &suggestion.target
            } else if internal.contains(suggestion.target.as_str()) {
                &suggestion.source
            } else {
                continue;
            };
            if let Some(info) = registry.get(touchpoint) {
                if !self.scope.is_excluded(&info.norm_path) {
                    selected.insert(info.key_string.clone(), info.norm_path.clone());
                }
            }
        }
        selected
    }

    /// Only edges from an internal key to a foreign touchpoint.
    fn suggestions(
        &self,
        registry: &KeyRegistry,
        selected: &BTreeMap<String, String>,
        suggestions: &[Suggestion],
    ) -> Vec<Suggestion> {
        let internal = self.internal_keys(registry);
        suggestions
            .iter()
            .filter(|suggestion| {
                suggestion.relation.is_committed()
                    && internal.contains(suggestion.source.as_str())
                    && !internal.contains(suggestion.target.as_str())
                    && selected.contains_key(&suggestion.target)
            })
            .cloned()
            .collect()
    }

    fn layout(&self) -> Layout {
        Layout::Embedded {
            markers: Markers::default(),
            template: module_template(self.module_name()),
        }
    }
}
