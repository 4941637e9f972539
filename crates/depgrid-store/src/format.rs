//! Line-oriented tracker text format.
//!
//! ```text
//! ---KEY_DEFINITIONS_START---
//! Key Definitions:
//! 1A: /project/src
//! ---KEY_DEFINITIONS_END---
//!
//! last_KEY_edit: Assigned keys: 1A
//! last_GRID_edit: Initial creation
//!
//! ---GRID_START---
//! X 1A
//! 1A = o
//! ---GRID_END---
//! ```
//!
//! Parsing is tolerant: unknown lines are ignored and malformed key or grid lines
//! are skipped with a warning.

use depgrid_core::{normalize_path, validate_key, Tracker};

pub const KEY_DEFINITIONS_START: &str = "---KEY_DEFINITIONS_START---";
pub const KEY_DEFINITIONS_END: &str = "---KEY_DEFINITIONS_END---";
pub const GRID_START: &str = "---GRID_START---";
pub const GRID_END: &str = "---GRID_END---";
pub const LAST_KEY_EDIT: &str = "last_KEY_edit";
pub const LAST_GRID_EDIT: &str = "last_GRID_edit";

const KEY_DEFINITIONS_HEADER: &str = "Key Definitions:";

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Section {
    Outside,
    Keys,
    Grid { header_pending: bool },
}

fn is_marker(line: &str, marker: &str) -> bool {
    line.eq_ignore_ascii_case(marker)
}

fn audit_value<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let (head, value) = line.split_once(':')?;
    head.trim().eq_ignore_ascii_case(label).then_some(value.trim())
}

/// `X <keys...>` column header; only recognised as the first grid line.
fn is_column_header(line: &str) -> bool {
    let mut words = line.split_whitespace();
    words.next().is_some_and(|head| head.eq_ignore_ascii_case("X"))
        && words.all(validate_key)
}

#[must_use]
pub fn parse_tracker(text: &str) -> Tracker {
    let mut tracker = Tracker::default();
    let mut section = Section::Outside;

    for (number, raw) in text.lines().enumerate() {
        let line = raw.trim();
        let line_number = number + 1;

        match section {
            Section::Outside => {
                if is_marker(line, KEY_DEFINITIONS_START) {
                    section = Section::Keys;
                } else if is_marker(line, GRID_START) {
                    section = Section::Grid { header_pending: true };
                } else if let Some(value) = audit_value(line, LAST_KEY_EDIT) {
                    tracker.last_key_edit = value.to_string();
                } else if let Some(value) = audit_value(line, LAST_GRID_EDIT) {
                    tracker.last_grid_edit = value.to_string();
                }
            }
            Section::Keys => {
                if is_marker(line, KEY_DEFINITIONS_END) {
                    section = Section::Outside;
                    continue;
                }
                if line.is_empty() || line.eq_ignore_ascii_case(KEY_DEFINITIONS_HEADER) {
                    continue;
                }
                match line.split_once(':') {
                    Some((key, path)) if validate_key(key.trim()) && !path.trim().is_empty() => {
                        tracker.keys.insert(key.trim().to_string(), normalize_path(path));
                    }
                    _ => tracing::warn!(line = line_number, content = line, "skipping malformed key definition"),
                }
            }
            Section::Grid { header_pending } => {
                if is_marker(line, GRID_END) {
                    section = Section::Outside;
                    continue;
                }
                if line.is_empty() {
                    continue;
                }
                section = Section::Grid { header_pending: false };
                match line.split_once('=') {
                    Some((key, row)) if validate_key(key.trim()) => {
                        tracker.grid.insert(key.trim().to_string(), row.trim().to_string());
                    }
                    _ if header_pending && is_column_header(line) => {}
                    _ => tracing::warn!(line = line_number, content = line, "skipping malformed grid row"),
                }
            }
        }
    }

    tracing::debug!(
        keys = tracker.keys.len(),
        rows = tracker.grid.len(),
        "parsed tracker text"
    );
    tracker
}

/// Serialize a tracker in the canonical `order`.
///
/// Callers validate and repair the grid first; rows missing from `tracker.grid`
/// are written empty.
#[must_use]
pub fn render_tracker(tracker: &Tracker, order: &[String]) -> String {
    let mut lines = vec![KEY_DEFINITIONS_START.to_string(), KEY_DEFINITIONS_HEADER.to_string()];
    lines.extend(order.iter().filter_map(|key| {
        tracker.keys.get(key).map(|path| format!("{key}: {}", normalize_path(path)))
    }));
    lines.push(KEY_DEFINITIONS_END.to_string());
    lines.push(String::new());
    lines.push(format!("{LAST_KEY_EDIT}: {}", tracker.last_key_edit));
    lines.push(format!("{LAST_GRID_EDIT}: {}", tracker.last_grid_edit));
    lines.push(String::new());
    lines.push(GRID_START.to_string());
    lines.push(format!("X {}", order.join(" ")));
    lines.extend(order.iter().map(|key| {
        format!("{key} = {}", tracker.grid.get(key).map_or("", String::as_str))
    }));
    lines.push(GRID_END.to_string());

    let mut out = lines.join("\n");
    out.push('\n');
    out
}
