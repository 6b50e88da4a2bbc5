use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{NaiveDateTime, Timelike};
use tracing::debug;
use zip::ZipArchive;

/// Name of the zip entry that records when an archive was produced.
pub const MANIFEST_ENTRY: &str = "backup-info.txt";
pub const MANIFEST_LABEL: &str = "Timestamp -";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Manifest {
    pub created: NaiveDateTime,
}

impl Manifest {
    /// Sub-second precision is dropped so the value survives a render/parse cycle.
    pub fn new(created: NaiveDateTime) -> Self {
        Self {
            created: created.with_nanosecond(0).unwrap_or(created),
        }
    }

    pub fn render(&self) -> String {
        format!(
            "{MANIFEST_LABEL} {}",
            self.created.format(TIMESTAMP_FORMAT)
        )
    }

    pub fn parse(text: &str) -> Option<Self> {
        let value = text
            .lines()
            .find_map(|line| line.trim().strip_prefix(MANIFEST_LABEL))?;
        NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT)
            .ok()
            .map(|created| Self { created })
    }
}

/// Reads the manifest embedded in an archive.
///
/// Anything that keeps us from getting a timestamp out of the file yields `None`.
pub fn read_manifest(path: &Path) -> Option<Manifest> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            debug!("cannot open {}: {}", path.display(), err);
            return None;
        }
    };
    let mut archive = match ZipArchive::new(file) {
        Ok(archive) => archive,
        Err(err) => {
            debug!("{} is not a readable archive: {}", path.display(), err);
            return None;
        }
    };
    let mut entry = match archive.by_name(MANIFEST_ENTRY) {
        Ok(entry) => entry,
        Err(err) => {
            debug!("{} has no {}: {}", path.display(), MANIFEST_ENTRY, err);
            return None;
        }
    };
    let mut text = String::new();
    if let Err(err) = entry.read_to_string(&mut text) {
        debug!("failed to read manifest of {}: {}", path.display(), err);
        return None;
    }

    let manifest = Manifest::parse(&text);
    if manifest.is_none() {
        debug!("unparsable manifest in {}: {:?}", path.display(), text);
    }
    manifest
}
