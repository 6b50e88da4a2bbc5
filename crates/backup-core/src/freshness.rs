use std::fs;
use std::path::PathBuf;

use chrono::{NaiveDateTime, TimeDelta};
use tracing::debug;

use crate::manifest::{Manifest, read_manifest};
use crate::naming::tag_of_archive;

/// Answers "is there a recent enough archive for this tag" from the backup directory.
///
/// The index is read-only: stale archives are left in place and get replaced by
/// the next build for their tag.
#[derive(Debug, Clone)]
pub struct FreshnessIndex {
    backup_dir: PathBuf,
}

impl FreshnessIndex {
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
        }
    }

    /// Archive files in the backup directory whose name carries exactly `tag`.
    pub fn candidates(&self, tag: &str) -> Vec<PathBuf> {
        let entries = match fs::read_dir(&self.backup_dir) {
            Ok(entries) => entries,
            Err(err) => {
                debug!("cannot list {}: {}", self.backup_dir.display(), err);
                return Vec::new();
            }
        };

        entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_file()))
            .filter(|entry| tag_of_archive(&entry.file_name().to_string_lossy()) == Some(tag))
            .map(|entry| entry.path())
            .collect()
    }

    /// Newest readable manifest among the tag's candidates.
    pub fn latest(&self, tag: &str) -> Option<Manifest> {
        self.candidates(tag)
            .iter()
            .filter_map(|path| read_manifest(path))
            .max_by_key(|manifest| manifest.created)
    }

    /// True when some candidate was created no longer than `max_age` before `now`.
    pub fn is_fresh(&self, tag: &str, max_age: TimeDelta, now: NaiveDateTime) -> bool {
        let Some(latest) = self.latest(tag) else {
            debug!("no readable {} archive in {}", tag, self.backup_dir.display());
            return false;
        };
        let fresh = now - max_age <= latest.created;
        debug!(
            "newest {} archive created {} ({})",
            tag,
            latest.created,
            if fresh { "fresh" } else { "stale" }
        );
        fresh
    }
}
