use std::fs::{self, File};
use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::errors::BackupError;
use crate::filter::InclusionFilter;
use crate::manifest::{MANIFEST_ENTRY, Manifest};
use crate::naming::{archive_file_name, partial_path};

/// Entries at or above this size need zip64 headers.
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Directory that archive entry names are made relative to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AnchorMode {
    /// Entries keep the source directory name: `world/level.dat`.
    #[default]
    Parent,
    /// Entries start inside the source directory: `level.dat`.
    Root,
}

impl AnchorMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AnchorMode::Parent => "parent",
            AnchorMode::Root => "root",
        }
    }
}

impl FromStr for AnchorMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "parent" => Ok(AnchorMode::Parent),
            "root" => Ok(AnchorMode::Root),
            other => Err(format!("unknown anchor '{other}' (expected parent or root)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltArchive {
    pub path: PathBuf,
    pub files_written: usize,
    pub files_skipped: usize,
}

/// Walks the world directories into a single deflated zip.
#[derive(Debug, Clone)]
pub struct ArchiveWriter {
    sources: Vec<PathBuf>,
    filter: InclusionFilter,
    anchor: AnchorMode,
}

impl ArchiveWriter {
    pub fn new(sources: Vec<PathBuf>, filter: InclusionFilter) -> Self {
        Self {
            sources,
            filter,
            anchor: AnchorMode::default(),
        }
    }

    pub fn with_anchor(mut self, anchor: AnchorMode) -> Self {
        self.anchor = anchor;
        self
    }

    /// Writes `backup_<tag>.zip` into `destination_dir`.
    ///
    /// Unreadable source files are logged and left out. Only a destination that
    /// cannot be created or written fails the build; in that case nothing is left
    /// under the archive name.
    pub fn build(
        &self,
        tag: &str,
        destination_dir: &Path,
        manifest: &Manifest,
    ) -> Result<BuiltArchive, BackupError> {
        fs::create_dir_all(destination_dir).map_err(|source| BackupError::Destination {
            path: destination_dir.to_path_buf(),
            source,
        })?;

        let path = destination_dir.join(archive_file_name(tag));
        let partial = partial_path(&path);
        info!("creating new archive {}", path.display());

        let file = File::create(&partial).map_err(|source| BackupError::Destination {
            path: partial.clone(),
            source,
        })?;

        let written = self.write_entries(file, &partial, manifest).and_then(|counts| {
            fs::rename(&partial, &path).map_err(|source| BackupError::Destination {
                path: path.clone(),
                source,
            })?;
            Ok(counts)
        });
        let (files_written, files_skipped) = match written {
            Ok(counts) => counts,
            Err(err) => {
                let _ = fs::remove_file(&partial);
                return Err(err);
            }
        };

        if files_skipped > 0 {
            warn!(
                "{} file(s) could not be read and are missing from {}",
                files_skipped,
                path.display()
            );
        }
        Ok(BuiltArchive {
            path,
            files_written,
            files_skipped,
        })
    }

    fn write_entries(
        &self,
        file: File,
        partial: &Path,
        manifest: &Manifest,
    ) -> Result<(usize, usize), BackupError> {
        let archive_err = |source: ZipError| BackupError::Archive {
            path: partial.to_path_buf(),
            source,
        };

        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut written = 0usize;
        let mut skipped = 0usize;

        for root in &self.sources {
            if !root.is_dir() {
                warn!("source directory {} does not exist, skipping", root.display());
                continue;
            }
            let anchor = match self.anchor {
                AnchorMode::Parent => root.parent().unwrap_or(root.as_path()),
                AnchorMode::Root => root.as_path(),
            };

            for entry in WalkDir::new(root).follow_links(false) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        warn!("skipping unreadable path under {}: {}", root.display(), err);
                        skipped += 1;
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(rel) = entry.path().strip_prefix(anchor) else {
                    continue;
                };
                let rel = rel.to_string_lossy().replace('\\', "/");
                if !self.filter.accepts(&rel) {
                    debug!("excluded {}", rel);
                    continue;
                }

                let mut source = match File::open(entry.path()) {
                    Ok(source) => source,
                    Err(err) => {
                        warn!("error reading {}: {}", entry.path().display(), err);
                        skipped += 1;
                        continue;
                    }
                };
                let size = source.metadata().map(|meta| meta.len()).unwrap_or(0);
                match add_entry(&mut zip, &rel, &mut source, size, options).map_err(archive_err)? {
                    EntryOutcome::Added => {
                        debug!("added {} to archive as {}", entry.path().display(), rel);
                        written += 1;
                    }
                    EntryOutcome::Unreadable(err) => {
                        warn!("error reading {}: {}", entry.path().display(), err);
                        skipped += 1;
                    }
                }
            }
        }

        zip.start_file(MANIFEST_ENTRY, options).map_err(archive_err)?;
        zip.write_all(manifest.render().as_bytes())
            .map_err(|err| archive_err(ZipError::from(err)))?;
        zip.finish().map_err(archive_err)?;

        Ok((written, skipped))
    }
}

#[derive(Debug)]
enum EntryOutcome {
    Added,
    Unreadable(io::Error),
}

/// Streams `source` into a new entry named `name`.
///
/// A read failure drops the partial entry and reports it as unreadable; only a
/// failure to write the archive itself is an error.
fn add_entry<W: Write + Seek, R: Read>(
    zip: &mut ZipWriter<W>,
    name: &str,
    source: &mut R,
    size: u64,
    options: SimpleFileOptions,
) -> Result<EntryOutcome, ZipError> {
    zip.start_file(name, options.large_file(size >= ZIP64_THRESHOLD))?;
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    loop {
        let read = match source.read(&mut buffer) {
            Ok(0) => return Ok(EntryOutcome::Added),
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                zip.abort_file()?;
                return Ok(EntryOutcome::Unreadable(err));
            }
        };
        zip.write_all(&buffer[..read])?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::read_manifest;
    use crate::test_support::{at, read_entries, sample_world, unique_temp_dir, world_roots};

    #[test]
    fn archives_worlds_relative_to_their_parent() {
        let server = sample_world("writer-parent");
        let backups = server.join("backup");
        let manifest = Manifest::new(at("2024-05-01 12:00:00"));

        let writer = ArchiveWriter::new(world_roots(&server), InclusionFilter::default());
        let built = writer.build("daily", &backups, &manifest).expect("build archive");

        assert_eq!(built.path, backups.join("backup_daily.zip"));
        assert_eq!(built.files_written, 4);
        assert_eq!(built.files_skipped, 0);

        let entries = read_entries(&built.path);
        assert_eq!(
            entries.keys().cloned().collect::<Vec<_>>(),
            vec![
                "backup-info.txt",
                "world/level.dat",
                "world/region/r.0.0.mca",
                "world_nether/DIM-1/region/r.0.0.mca",
                "world_the_end/DIM1/level.dat",
            ]
        );
        assert_eq!(entries["world/level.dat"], b"overworld-level");
        assert_eq!(read_manifest(&built.path), Some(manifest));
        assert!(!partial_path(&built.path).exists());
        let _ = fs::remove_dir_all(server);
    }

    #[test]
    fn root_anchor_drops_the_directory_name() {
        let server = sample_world("writer-root");
        let backups = server.join("backup");
        let writer = ArchiveWriter::new(vec![server.join("world")], InclusionFilter::default())
            .with_anchor(AnchorMode::Root);

        let built = writer
            .build("hourly", &backups, &Manifest::new(at("2024-05-01 12:00:00")))
            .expect("build archive");
        let entries = read_entries(&built.path);
        assert!(entries.contains_key("level.dat"));
        assert!(entries.contains_key("region/r.0.0.mca"));
        assert!(!entries.contains_key("world/level.dat"));
        let _ = fs::remove_dir_all(server);
    }

    #[test]
    fn rejected_paths_and_lock_file_are_absent() {
        let server = sample_world("writer-filter");
        let backups = server.join("backup");
        let filter =
            InclusionFilter::new(&[], &["world_nether/**".to_string()]).expect("filter");
        let writer = ArchiveWriter::new(world_roots(&server), filter);

        let built = writer
            .build("weekly", &backups, &Manifest::new(at("2024-05-01 12:00:00")))
            .expect("build archive");
        let entries = read_entries(&built.path);
        assert!(!entries.keys().any(|name| name.starts_with("world_nether/")));
        assert!(!entries.keys().any(|name| name.ends_with("session.lock")));
        assert!(entries.contains_key("world_the_end/DIM1/level.dat"));
        let _ = fs::remove_dir_all(server);
    }

    #[test]
    fn missing_sources_still_produce_a_manifest_only_archive() {
        let server = unique_temp_dir("writer-empty");
        let backups = server.join("backup");
        let writer = ArchiveWriter::new(world_roots(&server), InclusionFilter::default());

        let built = writer
            .build("daily", &backups, &Manifest::new(at("2024-05-01 12:00:00")))
            .expect("build archive");
        assert_eq!(built.files_written, 0);
        let entries = read_entries(&built.path);
        assert_eq!(entries.len(), 1);
        assert!(entries.contains_key(MANIFEST_ENTRY));
        let _ = fs::remove_dir_all(server);
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_files_are_skipped_not_fatal() {
        use std::os::unix::fs::PermissionsExt;

        let server = sample_world("writer-unreadable");
        let secret = server.join("world/secret.dat");
        fs::write(&secret, b"secret").expect("write secret");
        fs::set_permissions(&secret, fs::Permissions::from_mode(0o000)).expect("chmod");
        // Root ignores permission bits; nothing to observe in that case.
        if fs::read(&secret).is_ok() {
            let _ = fs::remove_dir_all(server);
            return;
        }

        let writer = ArchiveWriter::new(world_roots(&server), InclusionFilter::default());
        let built = writer
            .build("daily", &server.join("backup"), &Manifest::new(at("2024-05-01 12:00:00")))
            .expect("build survives unreadable file");
        assert_eq!(built.files_skipped, 1);
        assert!(!read_entries(&built.path).contains_key("world/secret.dat"));

        fs::set_permissions(&secret, fs::Permissions::from_mode(0o644)).expect("chmod back");
        let _ = fs::remove_dir_all(server);
    }

    #[test]
    fn unwritable_destination_fails_the_build() {
        let server = sample_world("writer-dest");
        let blocker = server.join("not-a-dir");
        fs::write(&blocker, b"file").expect("write blocker");

        let writer = ArchiveWriter::new(world_roots(&server), InclusionFilter::default());
        let err = writer
            .build("daily", &blocker, &Manifest::new(at("2024-05-01 12:00:00")))
            .expect_err("destination is a file");
        assert!(matches!(err, BackupError::Destination { .. }));
        let _ = fs::remove_dir_all(server);
    }

    #[test]
    fn large_files_are_streamed_intact() {
        let server = sample_world("writer-large");
        let big: Vec<u8> = (0..3 * COPY_BUFFER_SIZE + 17).map(|i| (i % 251) as u8).collect();
        fs::write(server.join("world/region/r.1.0.mca"), &big).expect("write big region");

        let writer = ArchiveWriter::new(world_roots(&server), InclusionFilter::default());
        let built = writer
            .build("daily", &server.join("backup"), &Manifest::new(at("2024-05-01 12:00:00")))
            .expect("build archive");
        assert_eq!(read_entries(&built.path)["world/region/r.1.0.mca"], big);
        let _ = fs::remove_dir_all(server);
    }

    struct FailsAfter {
        remaining: usize,
    }

    impl Read for FailsAfter {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.remaining == 0 {
                return Err(io::Error::other("device went away"));
            }
            let n = buf.len().min(self.remaining);
            buf[..n].fill(b'x');
            self.remaining -= n;
            Ok(n)
        }
    }

    #[test]
    fn read_failure_mid_file_drops_only_that_entry() {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut zip = ZipWriter::new(io::Cursor::new(Vec::new()));

        let kept = add_entry(&mut zip, "world/level.dat", &mut b"level".as_slice(), 5, options)
            .expect("write kept entry");
        assert!(matches!(kept, EntryOutcome::Added));
        let mut flaky = FailsAfter {
            remaining: COPY_BUFFER_SIZE + 10,
        };
        let dropped = add_entry(&mut zip, "world/broken.mca", &mut flaky, 1 << 20, options)
            .expect("read failure is not an archive error");
        assert!(matches!(dropped, EntryOutcome::Unreadable(_)));

        let bytes = zip.finish().expect("finish archive").into_inner();
        let mut archive = zip::ZipArchive::new(io::Cursor::new(bytes)).expect("reopen archive");
        let names: Vec<String> = archive.file_names().map(str::to_string).collect();
        assert_eq!(names, vec!["world/level.dat"]);
        let mut level = String::new();
        archive
            .by_name("world/level.dat")
            .expect("kept entry")
            .read_to_string(&mut level)
            .expect("read kept entry");
        assert_eq!(level, "level");
    }

    #[test]
    fn anchor_mode_parses_case_insensitively() {
        assert_eq!("Parent".parse::<AnchorMode>(), Ok(AnchorMode::Parent));
        assert_eq!(" root ".parse::<AnchorMode>(), Ok(AnchorMode::Root));
        assert!("sideways".parse::<AnchorMode>().is_err());
    }
}
