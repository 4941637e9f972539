use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use depgrid_core::{Relation, Tracker};
use serde::{Deserialize, Serialize};

use crate::policy::layout_for_path;
use crate::store::TrackerStore;
use crate::TrackerNotFound;

const CSV_HEADER: [&str; 5] = ["Source Key", "Source Path", "Target Key", "Target Path", "Dependency Type"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Json,
    Csv,
    Dot,
    Md,
}

impl ExportFormat {
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Dot => "dot",
            Self::Md => "md",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "csv" => Some(Self::Csv),
            "dot" => Some(Self::Dot),
            "md" => Some(Self::Md),
            _ => None,
        }
    }
}

/// Write a read-only projection of the tracker at `path`.
///
/// The default output is `<stem>_export.<ext>` beside the tracker.
///
/// # Errors
/// Returns [`TrackerNotFound`] for a missing tracker, an error for a tracker with
/// no keys, and I/O errors from writing the output.
pub fn export(
    store: &TrackerStore,
    path: &Path,
    format: ExportFormat,
    output: Option<&Path>,
) -> Result<PathBuf> {
    if !path.is_file() {
        return Err(TrackerNotFound { path: path.to_path_buf() }.into());
    }
    let tracker = store.read_layout(path, &layout_for_path(path))?;
    if tracker.is_empty() {
        return Err(anyhow!("tracker {} has no keys to export", path.display()));
    }

    let output = output.map_or_else(|| default_output(path, format), Path::to_path_buf);
    if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create export directory {}", parent.display()))?;
    }

    match format {
        ExportFormat::Json => {
            let json = serde_json::to_vec_pretty(&tracker).context("failed to serialize tracker")?;
            fs::write(&output, json)
                .with_context(|| format!("failed to write export file {}", output.display()))?;
        }
        ExportFormat::Csv => write_csv(&tracker, &output)?,
        ExportFormat::Dot => fs::write(&output, render_dot(&tracker))
            .with_context(|| format!("failed to write export file {}", output.display()))?,
        ExportFormat::Md => {
            fs::copy(path, &output).with_context(|| {
                format!("failed to copy {} to {}", path.display(), output.display())
            })?;
        }
    }

    tracing::info!(tracker = %path.display(), output = %output.display(), format = format.extension(), "exported tracker");
    Ok(output)
}

fn default_output(path: &Path, format: ExportFormat) -> PathBuf {
    let stem = path.file_stem().map_or_else(|| "tracker".into(), |stem| stem.to_string_lossy());
    path.with_file_name(format!("{stem}_export.{}", format.extension()))
}

fn edges(tracker: &Tracker) -> Vec<(String, String, Relation)> {
    let (grid, issues) = tracker.decode_grid();
    for issue in &issues {
        tracing::warn!(issue = %issue.describe(), "repaired grid row for export");
    }
    grid.edges()
        .into_iter()
        .map(|(source, target, relation)| (source.to_string(), target.to_string(), relation))
        .collect()
}

fn write_csv(tracker: &Tracker, output: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("failed to create export file {}", output.display()))?;
    writer.write_record(CSV_HEADER).context("failed to write CSV header")?;
    for (source, target, relation) in edges(tracker) {
        let source_path = tracker.keys.get(&source).map_or("", String::as_str);
        let target_path = tracker.keys.get(&target).map_or("", String::as_str);
        writer
            .write_record([
                source.as_str(),
                source_path,
                target.as_str(),
                target_path,
                relation.as_char().to_string().as_str(),
            ])
            .with_context(|| format!("failed to write CSV row {source} -> {target}"))?;
    }
    writer.flush().with_context(|| format!("failed to flush export file {}", output.display()))?;
    Ok(())
}

fn edge_style(relation: Relation) -> &'static str {
    match relation {
        Relation::DependsOn => "color=blue",
        Relation::DependedOnBy => "color=green, arrowhead=oinv",
        Relation::Mutual => "color=red, style=dashed, arrowhead=odot",
        Relation::Documentation => "color=orange",
        Relation::SemanticWeak => "color=grey, style=dotted",
        Relation::SemanticStrong => "color=dimgrey, style=bold",
        _ => "color=black",
    }
}

fn quoted(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\\\""))
}

fn render_dot(tracker: &Tracker) -> String {
    let mut lines = vec![
        "digraph Dependencies {".to_string(),
        "  rankdir=LR;".to_string(),
        "  node [shape=box, style=filled, fillcolor=lightblue];".to_string(),
        String::new(),
    ];
    for key in tracker.key_order() {
        let path = tracker.keys.get(&key).map_or("", String::as_str);
        let name = path.rsplit('/').next().unwrap_or(path);
        lines.push(format!("  {} [label={}];", quoted(&key), quoted(&format!("{key}\\n{name}"))));
    }
    lines.push(String::new());
    lines.extend(edges(tracker).into_iter().map(|(source, target, relation)| {
        format!(
            "  {} -> {} [label={}, {}];",
            quoted(&source),
            quoted(&target),
            quoted(&relation.as_char().to_string()),
            edge_style(relation)
        )
    }));
    lines.push("}".to_string());

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use anyhow::Result;
    use tempfile::TempDir;

    use super::*;

    fn seed(dir: &TempDir) -> Result<PathBuf> {
        let path = dir.path().join("doc_tracker.md");
        let tracker = Tracker {
            keys: BTreeMap::from([
                ("1A".to_string(), "/p/docs/a.md".to_string()),
                ("1B".to_string(), "/p/docs/b.md".to_string()),
                ("1C".to_string(), "/p/docs/c.md".to_string()),
            ]),
            grid: BTreeMap::from([
                ("1A".to_string(), "o<x".to_string()),
                ("1B".to_string(), ".op".to_string()),
                ("1C".to_string(), "dno".to_string()),
            ]),
            last_key_edit: "seeded".to_string(),
            last_grid_edit: "seeded".to_string(),
        };
        TrackerStore::default().write(&path, &tracker)?;
        Ok(path)
    }

    #[test]
    fn csv_lists_only_real_edges() -> Result<()> {
        let dir = TempDir::new()?;
        let path = seed(&dir)?;
        let output = export(&TrackerStore::default(), &path, ExportFormat::Csv, None)?;
        assert_eq!(output, dir.path().join("doc_tracker_export.csv"));

        let text = fs::read_to_string(&output)?;
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "Source Key,Source Path,Target Key,Target Path,Dependency Type");
        assert_eq!(
            &lines[1..],
            [
                "1A,/p/docs/a.md,1B,/p/docs/b.md,<",
                "1A,/p/docs/a.md,1C,/p/docs/c.md,x",
                "1C,/p/docs/c.md,1A,/p/docs/a.md,d",
                "1C,/p/docs/c.md,1B,/p/docs/b.md,n",
            ]
        );
        Ok(())
    }

    #[test]
    fn dot_styles_edges_by_relation() -> Result<()> {
        let dir = TempDir::new()?;
        let path = seed(&dir)?;
        let output = export(&TrackerStore::default(), &path, ExportFormat::Dot, Some(&dir.path().join("out/graph.dot")))?;
        let text = fs::read_to_string(output)?;
        assert!(text.starts_with("digraph Dependencies {"));
        assert!(text.contains("\"1A\" [label=\"1A\\na.md\"];"));
        assert!(text.contains("\"1A\" -> \"1B\" [label=\"<\", color=blue];"));
        assert!(text.contains("\"1A\" -> \"1C\" [label=\"x\", color=red, style=dashed, arrowhead=odot];"));
        assert!(!text.contains("\"1B\" -> \"1A\""));
        Ok(())
    }

    #[test]
    fn json_and_md_exports() -> Result<()> {
        let dir = TempDir::new()?;
        let path = seed(&dir)?;
        let json = export(&TrackerStore::default(), &path, ExportFormat::Json, None)?;
        let value: serde_json::Value = serde_json::from_slice(&fs::read(json)?)?;
        assert_eq!(value["keys"]["1B"], "/p/docs/b.md");

        let md = export(&TrackerStore::default(), &path, ExportFormat::Md, None)?;
        assert_eq!(fs::read_to_string(md)?, fs::read_to_string(&path)?);
        Ok(())
    }

    #[test]
    fn empty_or_missing_tracker_is_an_error() -> Result<()> {
        let dir = TempDir::new()?;
        let missing = dir.path().join("absent.md");
        let err = match export(&TrackerStore::default(), &missing, ExportFormat::Json, None) {
            Ok(_) => panic!("missing tracker should not export"),
            Err(err) => err,
        };
        assert!(err.downcast_ref::<TrackerNotFound>().is_some());

        let empty = dir.path().join("empty.md");
        TrackerStore::default().write(&empty, &Tracker::default())?;
        assert!(export(&TrackerStore::default(), &empty, ExportFormat::Csv, None).is_err());
        Ok(())
    }
}
