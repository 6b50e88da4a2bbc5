use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::errors::BackupError;

/// Held open by a running server; never archived.
pub const LOCK_FILE_NAME: &str = "session.lock";

/// Decides which files, by `/`-separated path relative to the archive anchor, go into an archive.
#[derive(Debug, Clone, Default)]
pub struct InclusionFilter {
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl InclusionFilter {
    /// With no include patterns every path is a candidate; exclude patterns always win.
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self, BackupError> {
        Ok(Self {
            include: build_set(include)?,
            exclude: build_set(exclude)?,
        })
    }

    pub fn accepts(&self, rel_path: &str) -> bool {
        let file_name = rel_path.rsplit('/').next().unwrap_or(rel_path);
        if file_name == LOCK_FILE_NAME {
            return false;
        }
        if self
            .exclude
            .as_ref()
            .is_some_and(|exclude| exclude.is_match(rel_path))
        {
            return false;
        }
        match &self.include {
            Some(include) => include.is_match(rel_path),
            None => true,
        }
    }
}

fn build_set(patterns: &[String]) -> Result<Option<GlobSet>, BackupError> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|source| BackupError::Filter {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    let set = builder.build().map_err(|source| BackupError::Filter {
        pattern: patterns.join(","),
        source,
    })?;
    Ok(Some(set))
}
