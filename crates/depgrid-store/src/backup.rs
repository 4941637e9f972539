use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

use crate::config::ProjectScope;

const STAMP_LEN: usize = "YYYYMMDD_HHMMSS_ffffff".len();

/// Timestamped copies of tracker files with a fixed retention per file.
#[derive(Debug, Clone)]
pub struct BackupManager {
    dir: PathBuf,
    retention: usize,
}

impl BackupManager {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, retention: usize) -> Self {
        Self { dir: dir.into(), retention }
    }

    #[must_use]
    pub fn from_scope(scope: &ProjectScope) -> Self {
        Self::new(scope.backup_dir.clone(), scope.backup_retention)
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy `path` to `<file name>.<YYYYMMDD_HHMMSS_ffffff>.bak` and prune old copies.
    /// Returns `None` when there is nothing to back up.
    ///
    /// # Errors
    /// Returns an error when the backup directory or the copy cannot be created.
    /// Pruning failures are logged only.
    pub fn backup(&self, path: &Path) -> Result<Option<PathBuf>> {
        if !path.is_file() {
            tracing::debug!(path = %path.display(), "no file to back up");
            return Ok(None);
        }
        let file_name = file_name_of(path)?;
        fs::create_dir_all(&self.dir).with_context(|| {
            format!("failed to create backup directory {}", self.dir.display())
        })?;

        let stamp = OffsetDateTime::now_utc()
            .format(format_description!(
                "[year][month][day]_[hour][minute][second]_[subsecond digits:6]"
            ))
            .context("failed to format backup timestamp")?;
        let mut target = self.dir.join(format!("{file_name}.{stamp}.bak"));
        let mut suffix = 1_u32;
        while target.exists() {
            target = self.dir.join(format!("{file_name}.{stamp}_{suffix}.bak"));
            suffix += 1;
        }

        fs::copy(path, &target).with_context(|| {
            format!("failed to back up {} to {}", path.display(), target.display())
        })?;
        tracing::info!(source = %path.display(), backup = %target.display(), "backed up tracker");

        self.prune(&file_name);
        Ok(Some(target))
    }

    /// Backups of `path`, newest first. Files whose timestamp does not parse are
    /// not listed.
    ///
    /// # Errors
    /// Returns an error when the backup directory exists but cannot be read.
    pub fn list(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let file_name = file_name_of(path)?;
        Ok(self.scan(&file_name)?.into_iter().map(|(_, backup)| backup).collect())
    }

    fn scan(&self, file_name: &str) -> Result<Vec<((PrimitiveDateTime, u32), PathBuf)>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.dir).with_context(|| {
            format!("failed to read backup directory {}", self.dir.display())
        })?;

        let mut backups = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| {
                format!("failed to read entry in backup directory {}", self.dir.display())
            })?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(order) = parse_backup_name(&name, file_name) {
                backups.push((order, entry.path()));
            }
        }
        backups.sort_by(|lhs, rhs| rhs.0.cmp(&lhs.0));
        Ok(backups)
    }

    fn prune(&self, file_name: &str) {
        let backups = match self.scan(file_name) {
            Ok(backups) => backups,
            Err(err) => {
                tracing::warn!(file = file_name, error = %err, "skipping backup cleanup");
                return;
            }
        };
        for (_, stale) in backups.into_iter().skip(self.retention) {
            match fs::remove_file(&stale) {
                Ok(()) => tracing::debug!(backup = %stale.display(), "removed old backup"),
                Err(err) => {
                    tracing::warn!(backup = %stale.display(), error = %err, "failed to remove old backup");
                }
            }
        }
    }
}

fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| anyhow!("path has no file name: {}", path.display()))
}

fn parse_backup_name(name: &str, file_name: &str) -> Option<(PrimitiveDateTime, u32)> {
    let middle = name.strip_prefix(file_name)?.strip_prefix('.')?.strip_suffix(".bak")?;
    let stamp = middle.get(..STAMP_LEN)?;
    let suffix = match middle.get(STAMP_LEN..)? {
        "" => 0,
        rest => rest.strip_prefix('_')?.parse().ok()?,
    };
    let taken = PrimitiveDateTime::parse(
        stamp,
        format_description!("[year][month][day]_[hour][minute][second]_[subsecond digits:6]"),
    )
    .ok()?;
    Some((taken, suffix))
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn keeps_only_the_newest_backups() -> Result<()> {
        let dir = TempDir::new()?;
        let tracker = dir.path().join("doc_tracker.md");
        let manager = BackupManager::new(dir.path().join("backups"), 2);

        let mut created = Vec::new();
        for round in 0..4 {
            fs::write(&tracker, format!("round {round}"))?;
            let backup = manager.backup(&tracker)?;
            created.push(backup.unwrap_or_else(|| panic!("round {round} should back up")));
        }

        let remaining = manager.list(&tracker)?;
        assert_eq!(remaining, vec![created[3].clone(), created[2].clone()]);
        assert_eq!(fs::read_to_string(&remaining[0])?, "round 3");
        Ok(())
    }

    #[test]
    fn missing_source_is_not_backed_up() -> Result<()> {
        let dir = TempDir::new()?;
        let manager = BackupManager::new(dir.path().join("backups"), 2);
        assert_eq!(manager.backup(&dir.path().join("absent.md"))?, None);
        assert!(!manager.dir().exists());
        Ok(())
    }

    #[test]
    fn unrelated_and_unparseable_files_are_ignored() -> Result<()> {
        let dir = TempDir::new()?;
        let backups = dir.path().join("backups");
        fs::create_dir_all(&backups)?;
        fs::write(backups.join("doc_tracker.md.garbage.bak"), "x")?;
        fs::write(backups.join("other.md.20260101_000000_000000.bak"), "x")?;

        let tracker = dir.path().join("doc_tracker.md");
        fs::write(&tracker, "current")?;
        let manager = BackupManager::new(&backups, 1);
        manager.backup(&tracker)?;
        manager.backup(&tracker)?;

        assert_eq!(manager.list(&tracker)?.len(), 1);
        assert!(backups.join("doc_tracker.md.garbage.bak").exists());
        assert!(backups.join("other.md.20260101_000000_000000.bak").exists());
        Ok(())
    }

    #[test]
    fn backup_names_parse_with_collision_suffix() {
        let plain = parse_backup_name("a.md.20261016_101112_123456.bak", "a.md");
        let bumped = parse_backup_name("a.md.20261016_101112_123456_2.bak", "a.md");
        assert!(plain.is_some());
        assert!(bumped > plain);
        assert!(parse_backup_name("a.md.20261016_101112_123456.bak", "b.md").is_none());
    }
}
