use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::errors::BackupError;
use crate::naming::{archive_file_name, partial_path};
use crate::writer::BuiltArchive;

/// How a tag's archive came to exist during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Materialized {
    Built(BuiltArchive),
    Copied { source: PathBuf, path: PathBuf },
}

impl Materialized {
    pub fn path(&self) -> &Path {
        match self {
            Materialized::Built(built) => &built.path,
            Materialized::Copied { path, .. } => path,
        }
    }
}

/// Remembers the first archive built in a run so later tags can copy it.
///
/// The world is not written to while a run is in progress, so every archive the
/// run produces would have the same contents anyway.
#[derive(Debug, Default)]
pub struct ReuseCache {
    artifact: Option<PathBuf>,
}

impl ReuseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Produces the archive for `tag`, calling `build` only if nothing was built yet.
    pub fn get_or_build<F>(
        &mut self,
        tag: &str,
        destination_dir: &Path,
        build: F,
    ) -> Result<Materialized, BackupError>
    where
        F: FnOnce() -> Result<BuiltArchive, BackupError>,
    {
        if let Some(source) = self.artifact.clone() {
            let path = destination_dir.join(archive_file_name(tag));
            // Copying a file onto itself would truncate it.
            if path != source {
                info!(
                    "copying from existing backup {} to {}",
                    source.display(),
                    path.display()
                );
                copy_archive(&source, &path)?;
            }
            return Ok(Materialized::Copied { source, path });
        }

        let built = build()?;
        self.artifact = Some(built.path.clone());
        Ok(Materialized::Built(built))
    }
}

fn copy_archive(source: &Path, dest: &Path) -> Result<(), BackupError> {
    let partial = partial_path(dest);
    let copied = fs::copy(source, &partial).and_then(|_| fs::rename(&partial, dest));
    if let Err(err) = copied {
        let _ = fs::remove_file(&partial);
        return Err(BackupError::Copy {
            from: source.to_path_buf(),
            to: dest.to_path_buf(),
            source: err,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::InclusionFilter;
    use crate::manifest::Manifest;
    use crate::test_support::{at, read_entries, sample_world, world_roots};
    use crate::writer::ArchiveWriter;
    use std::cell::Cell;

    #[test]
    fn builds_once_then_copies() {
        let server = sample_world("reuse-once");
        let backups = server.join("backup");
        let writer = ArchiveWriter::new(world_roots(&server), InclusionFilter::default());
        let manifest = Manifest::new(at("2024-07-01 00:00:00"));
        let builds = Cell::new(0);
        let mut cache = ReuseCache::new();

        let first = cache
            .get_or_build("daily", &backups, || {
                builds.set(builds.get() + 1);
                writer.build("daily", &backups, &manifest)
            })
            .expect("first tag builds");
        let second = cache
            .get_or_build("weekly", &backups, || {
                builds.set(builds.get() + 1);
                writer.build("weekly", &backups, &manifest)
            })
            .expect("second tag copies");

        assert_eq!(builds.get(), 1);
        assert!(matches!(first, Materialized::Built(_)));
        assert_eq!(
            second,
            Materialized::Copied {
                source: backups.join("backup_daily.zip"),
                path: backups.join("backup_weekly.zip"),
            }
        );
        assert_eq!(read_entries(first.path()), read_entries(second.path()));
        let _ = fs::remove_dir_all(server);
    }

    #[test]
    fn failed_build_is_not_remembered() {
        let server = sample_world("reuse-fail");
        let backups = server.join("backup");
        let mut cache = ReuseCache::new();

        let err = cache
            .get_or_build("daily", &backups, || Err(BackupError::Task("boom".into())))
            .expect_err("build fails");
        assert!(matches!(err, BackupError::Task(_)));

        let writer = ArchiveWriter::new(world_roots(&server), InclusionFilter::default());
        let manifest = Manifest::new(at("2024-07-01 00:00:00"));
        let retried = cache
            .get_or_build("weekly", &backups, || writer.build("weekly", &backups, &manifest))
            .expect("next tag builds instead of copying");
        assert!(matches!(retried, Materialized::Built(_)));
        let _ = fs::remove_dir_all(server);
    }

    #[test]
    fn copy_failure_leaves_the_artifact_intact() {
        let server = sample_world("reuse-copy-fail");
        let backups = server.join("backup");
        let writer = ArchiveWriter::new(world_roots(&server), InclusionFilter::default());
        let manifest = Manifest::new(at("2024-07-01 00:00:00"));
        let mut cache = ReuseCache::new();

        let first = cache
            .get_or_build("daily", &backups, || writer.build("daily", &backups, &manifest))
            .expect("build");
        let before = read_entries(first.path());

        fs::create_dir_all(backups.join("backup_weekly.zip")).expect("block weekly path");
        let err = cache
            .get_or_build("weekly", &backups, || unreachable!("must not rebuild"))
            .expect_err("copy onto a directory fails");
        assert!(matches!(err, BackupError::Copy { .. }));
        assert_eq!(read_entries(first.path()), before);
        assert!(!backups.join("backup_weekly.zip.partial").exists());
        let _ = fs::remove_dir_all(server);
    }
}
