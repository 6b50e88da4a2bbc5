use fs2::FileExt;
use std::{fs::File, fs::OpenOptions, path::Path};

/// Lives in the backup directory; held for the whole run.
pub const LOCK_FILE: &str = ".world-backup.lock";

pub struct LockGuard {
    _file: File,
}

pub fn acquire_lock(path: &Path) -> std::io::Result<LockGuard> {
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)?;

    file.try_lock_exclusive()?;
    Ok(LockGuard { _file: file })
}
