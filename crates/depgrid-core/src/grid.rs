use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::codec::{decode_bounded, encode, initial_row};
use crate::relation::Relation;
use crate::GridError;

/// An externally computed candidate edge. Never persisted on its own.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Suggestion {
    pub source: String,
    pub target: String,
    pub relation: Relation,
}

impl Suggestion {
    #[must_use]
    pub fn new(source: impl Into<String>, target: impl Into<String>, relation: Relation) -> Self {
        Self { source: source.into(), target: target.into(), relation }
    }
}

/// A problem found while decoding encoded rows against a key order.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GridIssue {
    MissingRow { key: String },
    UnexpectedRow { key: String },
    Undecodable { key: String, reason: String },
    WidthMismatch { key: String, expected: usize, actual: usize },
    MisplacedDiagonal { key: String },
}

impl GridIssue {
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::MissingRow { key }
            | Self::UnexpectedRow { key }
            | Self::Undecodable { key, .. }
            | Self::WidthMismatch { key, .. }
            | Self::MisplacedDiagonal { key } => key,
        }
    }

    /// Structural issues mean the row set does not match the key set; the grid is
    /// not square over the key order and must not be written.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::MissingRow { .. } | Self::UnexpectedRow { .. })
    }

    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::MissingRow { key } => format!("no grid row for key {key}"),
            Self::UnexpectedRow { key } => format!("grid row {key} has no key definition"),
            Self::Undecodable { key, reason } => format!("row {key} cannot be decoded: {reason}"),
            Self::WidthMismatch { key, expected, actual } => {
                format!("row {key} has width {actual}, expected {expected}")
            }
            Self::MisplacedDiagonal { key } => format!("row {key} is missing its diagonal"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct SuggestionConflict {
    pub source: String,
    pub target: String,
    pub existing: Relation,
    pub proposed: Relation,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct SuggestionReport {
    pub applied: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub conflicts: Vec<SuggestionConflict>,
}

impl SuggestionReport {
    #[must_use]
    pub fn mutated(&self) -> bool {
        self.applied > 0
    }
}

/// Square relation matrix over an explicit key order.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Grid {
    keys: Vec<String>,
    index: BTreeMap<String, usize>,
    rows: Vec<Vec<Relation>>,
}

impl Grid {
    /// All-placeholder grid with the diagonal on the trace.
    #[must_use]
    pub fn initial(order: &[String]) -> Self {
        let width = order.len();
        Self {
            keys: order.to_vec(),
            index: index_of_order(order),
            rows: (0..width).map(|position| initial_row(width, position)).collect(),
        }
    }

    /// Decode encoded rows at the width of `order`, repairing what cannot be used.
    ///
    /// Missing, undecodable and wrong-width rows are reinitialized; a row whose trace
    /// cell is not the diagonal has it restored. Rows for keys outside `order` are
    /// dropped. Every repair is reported.
    #[must_use]
    pub fn decode(order: &[String], encoded: &BTreeMap<String, String>) -> (Self, Vec<GridIssue>) {
        let mut grid = Self::initial(order);
        let mut issues = Vec::new();
        let width = order.len();

        for (position, key) in order.iter().enumerate() {
            let Some(text) = encoded.get(key) else {
                issues.push(GridIssue::MissingRow { key: key.clone() });
                continue;
            };
            match decode_bounded(text, width) {
                Err(err) => issues.push(GridIssue::Undecodable {
                    key: key.clone(),
                    reason: err.to_string(),
                }),
                Ok(row) if row.len() != width => issues.push(GridIssue::WidthMismatch {
                    key: key.clone(),
                    expected: width,
                    actual: row.len(),
                }),
                Ok(mut row) => {
                    if row[position] != Relation::Diagonal {
                        row[position] = Relation::Diagonal;
                        issues.push(GridIssue::MisplacedDiagonal { key: key.clone() });
                    }
                    grid.rows[position] = row;
                }
            }
        }

        for key in encoded.keys() {
            if !grid.index.contains_key(key) {
                issues.push(GridIssue::UnexpectedRow { key: key.clone() });
            }
        }

        (grid, issues)
    }

    /// Report every issue [`Grid::decode`] would repair, without building a grid.
    #[must_use]
    pub fn check(order: &[String], encoded: &BTreeMap<String, String>) -> Vec<GridIssue> {
        Self::decode(order, encoded).1
    }

    #[must_use]
    pub fn encode(&self) -> BTreeMap<String, String> {
        self.keys.iter().cloned().zip(self.rows.iter().map(|row| encode(row))).collect()
    }

    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[must_use]
    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    #[must_use]
    pub fn row(&self, key: &str) -> Option<&[Relation]> {
        self.index_of(key).map(|position| self.rows[position].as_slice())
    }

    #[must_use]
    pub fn get(&self, row_key: &str, col_key: &str) -> Option<Relation> {
        let row = self.index_of(row_key)?;
        let col = self.index_of(col_key)?;
        Some(self.rows[row][col])
    }

    /// Set one cell directly, bypassing the suggestion policy.
    ///
    /// # Errors
    /// Returns [`GridError::Validation`] when either key is unknown, when the trace
    /// would lose its diagonal, or when a diagonal is placed off the trace.
    pub fn set(&mut self, row_key: &str, col_key: &str, relation: Relation) -> Result<(), GridError> {
        let (Some(row), Some(col)) = (self.index_of(row_key), self.index_of(col_key)) else {
            return Err(GridError::Validation(format!(
                "cell ({row_key}, {col_key}) is outside the grid"
            )));
        };
        if (row == col) != (relation == Relation::Diagonal) {
            return Err(GridError::Validation(format!(
                "diagonal symbol MUST appear exactly on the trace, got {relation} at ({row_key}, {col_key})"
            )));
        }
        self.rows[row][col] = relation;
        Ok(())
    }

    /// Re-index onto `new_order`, keeping every relation whose two ends survive.
    ///
    /// This is a pure index remap: relations touching a removed key are dropped and
    /// rows for new keys start as placeholders.
    #[must_use]
    pub fn rebuild(&self, new_order: &[String]) -> Self {
        let mut rebuilt = Self::initial(new_order);
        let survivors = self
            .keys
            .iter()
            .enumerate()
            .filter_map(|(old, key)| rebuilt.index_of(key).map(|new| (old, new)))
            .collect::<Vec<_>>();

        for &(old_row, new_row) in &survivors {
            for &(old_col, new_col) in &survivors {
                if new_row != new_col {
                    rebuilt.rows[new_row][new_col] = self.rows[old_row][old_col];
                }
            }
        }

        tracing::debug!(
            old_keys = self.len(),
            new_keys = rebuilt.len(),
            surviving_keys = survivors.len(),
            "rebuilt grid"
        );
        rebuilt
    }

    /// Monotone fill: placeholders take the suggested relation, committed cells
    /// never change, and a differing committed value is reported as a conflict.
    pub fn apply_suggestions(&mut self, suggestions: &[Suggestion]) -> SuggestionReport {
        let mut report = SuggestionReport::default();

        for suggestion in suggestions {
            let (Some(row), Some(col)) =
                (self.index_of(&suggestion.source), self.index_of(&suggestion.target))
            else {
                report.skipped += 1;
                continue;
            };
            if row == col || !suggestion.relation.is_committed() {
                report.skipped += 1;
                continue;
            }

            let existing = self.rows[row][col];
            if existing == Relation::Placeholder {
                self.rows[row][col] = suggestion.relation;
                report.applied += 1;
            } else if existing == suggestion.relation || existing == Relation::Diagonal {
                report.unchanged += 1;
            } else {
                tracing::warn!(
                    source = %suggestion.source,
                    target = %suggestion.target,
                    existing = %existing,
                    proposed = %suggestion.relation,
                    "suggestion conflicts with committed relation; keeping existing value"
                );
                report.conflicts.push(SuggestionConflict {
                    source: suggestion.source.clone(),
                    target: suggestion.target.clone(),
                    existing,
                    proposed: suggestion.relation,
                });
            }
        }

        report
    }

    /// Cell-level merge onto `order`. Primary strictly dominates secondary; a
    /// placeholder or absent pair in primary lets the secondary value through.
    #[must_use]
    pub fn merge(primary: &Self, secondary: &Self, order: &[String]) -> Self {
        let mut merged = Self::initial(order);
        for (row, row_key) in order.iter().enumerate() {
            for (col, col_key) in order.iter().enumerate() {
                if row == col {
                    continue;
                }
                let committed = |grid: &Self| {
                    grid.get(row_key, col_key).filter(|value| *value != Relation::Placeholder)
                };
                if let Some(value) = committed(primary).or_else(|| committed(secondary)) {
                    merged.rows[row][col] = value;
                }
            }
        }
        merged
    }

    /// Drop one key's row and column, splicing at its index in this grid's order.
    #[must_use]
    pub fn without_key(&self, key: &str) -> Option<Self> {
        let removed = self.index_of(key)?;
        let keys = self
            .keys
            .iter()
            .enumerate()
            .filter(|(position, _)| *position != removed)
            .map(|(_, key)| key.clone())
            .collect::<Vec<_>>();
        let rows = self
            .rows
            .iter()
            .enumerate()
            .filter(|(position, _)| *position != removed)
            .map(|(_, row)| {
                let mut row = row.clone();
                row.remove(removed);
                row
            })
            .collect();
        Some(Self { index: index_of_order(&keys), keys, rows })
    }

    /// Every cell that projects to an edge, in row-major canonical order.
    #[must_use]
    pub fn edges(&self) -> Vec<(&str, &str, Relation)> {
        let mut edges = Vec::new();
        for (row, source) in self.keys.iter().enumerate() {
            for (col, target) in self.keys.iter().enumerate() {
                let relation = self.rows[row][col];
                if row != col && relation.is_edge() {
                    edges.push((source.as_str(), target.as_str(), relation));
                }
            }
        }
        edges
    }

    /// Keys present in exactly one of two orders, as (added, removed) relative to `self`.
    #[must_use]
    pub fn key_changes(&self, new_order: &[String]) -> (Vec<String>, Vec<String>) {
        let old = self.keys.iter().collect::<BTreeSet<_>>();
        let new = new_order.iter().collect::<BTreeSet<_>>();
        let added = new_order.iter().filter(|key| !old.contains(key)).cloned().collect();
        let removed = self.keys.iter().filter(|key| !new.contains(key)).cloned().collect();
        (added, removed)
    }
}

fn index_of_order(order: &[String]) -> BTreeMap<String, usize> {
    order.iter().enumerate().map(|(position, key)| (key.clone(), position)).collect()
}
