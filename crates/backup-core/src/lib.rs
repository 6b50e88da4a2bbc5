//! Retention-aware world snapshots.
//!
//! A run walks the configured retention tags in order. Each tag either already
//! has a fresh archive in the backup directory, or gets one: the first stale
//! tag builds an archive from the world directories and every later stale tag
//! in the same run receives a byte copy of it.

pub mod context;
pub mod control;
pub mod errors;
pub mod filter;
pub mod freshness;
pub mod manifest;
pub mod naming;
pub mod reuse;
pub mod scheduler;
pub mod tags;
pub mod writer;

#[cfg(test)]
pub(crate) mod test_support;

pub use context::RunContext;
pub use control::{ControlChannel, OfflineChannel, announce, with_saves_suspended};
pub use errors::BackupError;
pub use filter::{InclusionFilter, LOCK_FILE_NAME};
pub use freshness::FreshnessIndex;
pub use manifest::{MANIFEST_ENTRY, Manifest, TIMESTAMP_FORMAT, read_manifest};
pub use reuse::{Materialized, ReuseCache};
pub use scheduler::{RetentionScheduler, RunReport, TagOutcome};
pub use tags::{RetentionPolicy, parse_tag_list};
pub use writer::{AnchorMode, ArchiveWriter, BuiltArchive};
