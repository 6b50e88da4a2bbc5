use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::NaiveDateTime;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::manifest::TIMESTAMP_FORMAT;

static COUNTER: AtomicUsize = AtomicUsize::new(0);

pub fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!(
        "world-backup-{prefix}-{}-{nanos}-{seq}",
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

pub fn at(value: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).expect("valid test timestamp")
}

pub fn write_file(root: &Path, rel: &str, bytes: &[u8]) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dir");
    }
    std::fs::write(path, bytes).expect("write test file");
}

pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).expect("create zip");
    let mut zip = ZipWriter::new(file);
    for (name, bytes) in entries {
        zip.start_file(*name, SimpleFileOptions::default())
            .expect("start zip entry");
        zip.write_all(bytes).expect("write zip entry");
    }
    zip.finish().expect("finish zip");
}

pub fn read_entries(path: &Path) -> BTreeMap<String, Vec<u8>> {
    let file = std::fs::File::open(path).expect("open zip");
    let mut archive = ZipArchive::new(file).expect("read zip");
    let mut entries = BTreeMap::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).expect("zip entry");
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes).expect("read zip entry");
        entries.insert(entry.name().to_string(), bytes);
    }
    entries
}

/// A server directory with the three vanilla dimensions and a held session lock.
pub fn sample_world(prefix: &str) -> PathBuf {
    let server = unique_temp_dir(prefix);
    write_file(&server, "world/level.dat", b"overworld-level");
    write_file(&server, "world/session.lock", b"lock");
    write_file(&server, "world/region/r.0.0.mca", b"region-0-0");
    write_file(&server, "world_nether/DIM-1/region/r.0.0.mca", b"nether-region");
    write_file(&server, "world_the_end/DIM1/level.dat", b"end-level");
    server
}

pub fn world_roots(server: &Path) -> Vec<PathBuf> {
    ["world", "world_nether", "world_the_end"]
        .iter()
        .map(|name| server.join(name))
        .collect()
}
