use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::grid::{Grid, GridIssue};
use crate::keys::order_keys;
use crate::GridError;

/// In-memory form of one tracker file: key definitions, encoded rows, and the two
/// audit strings. An empty `keys` map is the "absent tracker" state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct Tracker {
    pub keys: BTreeMap<String, String>,
    pub grid: BTreeMap<String, String>,
    #[serde(default)]
    pub last_key_edit: String,
    #[serde(default)]
    pub last_grid_edit: String,
}

impl Tracker {
    #[must_use]
    pub fn from_grid(keys: BTreeMap<String, String>, grid: &Grid) -> Self {
        Self { keys, grid: grid.encode(), ..Self::default() }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[must_use]
    pub fn key_order(&self) -> Vec<String> {
        order_keys(self.keys.keys())
    }

    /// Decode the stored rows against this tracker's own key order.
    #[must_use]
    pub fn decode_grid(&self) -> (Grid, Vec<GridIssue>) {
        Grid::decode(&self.key_order(), &self.grid)
    }

    #[must_use]
    pub fn issues(&self) -> Vec<GridIssue> {
        Grid::check(&self.key_order(), &self.grid)
    }

    /// Union of two trackers.
    ///
    /// Keys are unioned with the primary path winning; cells come from
    /// [`Grid::merge`]. When only one side has keys the other is returned as is. The
    /// key audit string is taken from primary, falling back to secondary; the grid
    /// audit string is left for the caller.
    ///
    /// # Errors
    /// Returns [`GridError::Validation`] when both sides are empty.
    pub fn merge(primary: &Self, secondary: &Self) -> Result<Self, GridError> {
        match (primary.is_empty(), secondary.is_empty()) {
            (true, true) => {
                return Err(GridError::Validation(
                    "cannot merge two empty trackers".to_string(),
                ))
            }
            (false, true) => return Ok(primary.clone()),
            (true, false) => return Ok(secondary.clone()),
            (false, false) => {}
        }

        let mut keys = secondary.keys.clone();
        keys.extend(primary.keys.iter().map(|(key, path)| (key.clone(), path.clone())));
        let order = order_keys(keys.keys());

        let (primary_grid, primary_issues) = primary.decode_grid();
        let (secondary_grid, secondary_issues) = secondary.decode_grid();
        for (side, issue) in primary_issues
            .iter()
            .map(|issue| ("primary", issue))
            .chain(secondary_issues.iter().map(|issue| ("secondary", issue)))
        {
            tracing::warn!(side, issue = %issue.describe(), "repaired grid row before merge");
        }

        let merged = Grid::merge(&primary_grid, &secondary_grid, &order);
        let last_key_edit = if primary.last_key_edit.is_empty() {
            secondary.last_key_edit.clone()
        } else {
            primary.last_key_edit.clone()
        };

        Ok(Self { keys, grid: merged.encode(), last_key_edit, last_grid_edit: String::new() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::Relation;

    fn tracker(entries: &[(&str, &str)], rows: &[(&str, &str)], key_edit: &str) -> Tracker {
        Tracker {
            keys: entries.iter().map(|(key, path)| ((*key).to_string(), (*path).to_string())).collect(),
            grid: rows.iter().map(|(key, row)| ((*key).to_string(), (*row).to_string())).collect(),
            last_key_edit: key_edit.to_string(),
            last_grid_edit: String::new(),
        }
    }

    #[test]
    fn merge_unions_keys_with_primary_path_winning() -> Result<(), GridError> {
        let primary = tracker(&[("A", "/a"), ("B", "/b")], &[("A", "o<"), ("B", "po")], "p-edit");
        let secondary = tracker(&[("B", "/b-old"), ("C", "/c")], &[("B", "o<"), ("C", "po")], "s-edit");

        let merged = Tracker::merge(&primary, &secondary)?;
        assert_eq!(merged.keys.get("B").map(String::as_str), Some("/b"));
        assert_eq!(merged.key_order(), vec!["A", "B", "C"]);
        assert_eq!(merged.last_key_edit, "p-edit");

        let (grid, issues) = merged.decode_grid();
        assert!(issues.is_empty());
        assert_eq!(grid.get("A", "B"), Some(Relation::DependsOn));
        assert_eq!(grid.get("B", "C"), Some(Relation::DependsOn));
        assert_eq!(grid.get("A", "C"), Some(Relation::Placeholder));
        Ok(())
    }

    #[test]
    fn merge_with_one_empty_side_returns_the_other() -> Result<(), GridError> {
        let populated = tracker(&[("A", "/a")], &[("A", "o")], "edit");
        assert_eq!(Tracker::merge(&populated, &Tracker::default())?, populated);
        assert_eq!(Tracker::merge(&Tracker::default(), &populated)?, populated);
        Ok(())
    }

    #[test]
    fn merge_of_two_empty_trackers_fails() {
        assert!(matches!(
            Tracker::merge(&Tracker::default(), &Tracker::default()),
            Err(GridError::Validation(_))
        ));
    }

    #[test]
    fn key_edit_falls_back_to_secondary() -> Result<(), GridError> {
        let primary = tracker(&[("A", "/a")], &[("A", "o")], "");
        let secondary = tracker(&[("B", "/b")], &[("B", "o")], "from secondary");
        assert_eq!(Tracker::merge(&primary, &secondary)?.last_key_edit, "from secondary");
        Ok(())
    }

    #[test]
    fn merge_with_self_keeps_the_grid() -> Result<(), GridError> {
        let original = tracker(&[("1A", "/a"), ("1B", "/b")], &[("1A", "ox"), ("1B", "xo")], "edit");
        let merged = Tracker::merge(&original, &original)?;
        assert_eq!(merged.keys, original.keys);
        assert_eq!(merged.grid, original.grid);
        Ok(())
    }
}
