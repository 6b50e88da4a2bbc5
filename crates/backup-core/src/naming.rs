use std::path::{Path, PathBuf};

pub const ARCHIVE_PREFIX: &str = "backup_";
pub const ARCHIVE_EXTENSION: &str = ".zip";
/// Suffix of an archive that is still being written.
pub const PARTIAL_SUFFIX: &str = ".partial";

pub fn archive_file_name(tag: &str) -> String {
    format!("{ARCHIVE_PREFIX}{tag}{ARCHIVE_EXTENSION}")
}

/// Returns the tag encoded in an archive file name.
///
/// Only exact `backup_<tag>.zip` names qualify, so `backup_dailyXYZ.zip` is not a
/// `daily` archive.
pub fn tag_of_archive(file_name: &str) -> Option<&str> {
    let tag = file_name
        .strip_prefix(ARCHIVE_PREFIX)?
        .strip_suffix(ARCHIVE_EXTENSION)?;
    (!tag.is_empty()).then_some(tag)
}

pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}
