use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::context::RunContext;
use crate::errors::BackupError;
use crate::freshness::FreshnessIndex;
use crate::manifest::Manifest;
use crate::reuse::Materialized;
use crate::tags::RetentionPolicy;
use crate::writer::{ArchiveWriter, BuiltArchive};


#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagOutcome {
    /// An archive recent enough for the tag already exists.
    Fresh { tag: String },
    Built { tag: String, archive: BuiltArchive },
    Copied {
        tag: String,
        source: PathBuf,
        path: PathBuf,
    },
    /// The tag has no retention interval and was skipped.
    Unknown { tag: String },
}

impl TagOutcome {
    pub fn tag(&self) -> &str {
        match self {
            TagOutcome::Fresh { tag }
            | TagOutcome::Built { tag, .. }
            | TagOutcome::Copied { tag, .. }
            | TagOutcome::Unknown { tag } => tag,
        }
    }

    /// Path of the archive this outcome wrote, if any.
    pub fn produced(&self) -> Option<&Path> {
        match self {
            TagOutcome::Built { archive, .. } => Some(&archive.path),
            TagOutcome::Copied { path, .. } => Some(path),
            TagOutcome::Fresh { .. } | TagOutcome::Unknown { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub outcomes: Vec<TagOutcome>,
}

impl RunReport {
    /// File names of the archives written during the run, in tag order.
    pub fn produced(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter_map(TagOutcome::produced)
            .filter_map(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect()
    }

    pub fn builds(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome, TagOutcome::Built { .. }))
            .count()
    }
}

/// Walks the configured tags once, producing an archive for every stale one.
#[derive(Debug, Clone)]
pub struct RetentionScheduler {
    policy: RetentionPolicy,
    backup_dir: PathBuf,
    writer: ArchiveWriter,
}

impl RetentionScheduler {
    pub fn new(policy: RetentionPolicy, backup_dir: impl Into<PathBuf>, writer: ArchiveWriter) -> Self {
        Self {
            policy,
            backup_dir: backup_dir.into(),
            writer,
        }
    }

    /// Processes `tags` in order, each exactly once.
    ///
    /// Unknown tags are reported and skipped. The first build or copy failure
    /// stops the loop; archives already produced in this run stay on disk.
    pub fn run(&self, ctx: &mut RunContext, tags: &[String]) -> Result<RunReport, BackupError> {
        let index = FreshnessIndex::new(&self.backup_dir);
        let manifest = Manifest::new(ctx.now);
        let mut report = RunReport::default();

        for tag in tags {
            let Some(interval) = self.policy.interval(tag) else {
                warn!(
                    "tag '{}' is not a valid retention tag, must be one of: {}",
                    tag,
                    self.policy.tag_names().join(", ")
                );
                report.outcomes.push(TagOutcome::Unknown { tag: tag.clone() });
                continue;
            };

            if index.is_fresh(tag, interval, ctx.now) {
                info!("backup tag {} within its interval, skipping", tag);
                report.outcomes.push(TagOutcome::Fresh { tag: tag.clone() });
                continue;
            }

            let materialized = ctx.reuse.get_or_build(tag, &self.backup_dir, || {
                self.writer.build(tag, &self.backup_dir, &manifest)
            })?;
            info!("backup saved: {}", materialized.path().display());

            report.outcomes.push(match materialized {
                Materialized::Built(archive) => TagOutcome::Built {
                    tag: tag.clone(),
                    archive,
                },
                Materialized::Copied { source, path } => TagOutcome::Copied {
                    tag: tag.clone(),
                    source,
                    path,
                },
            });
        }

        Ok(report)
    }
}
