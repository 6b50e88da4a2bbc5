use chrono::{Local, NaiveDateTime};

use crate::reuse::ReuseCache;

/// State that lives for exactly one run: the snapshot instant and the reuse cache.
///
/// Build a new one for every run; nothing here may leak into the next iteration.
#[derive(Debug)]
pub struct RunContext {
    pub now: NaiveDateTime,
    pub reuse: ReuseCache,
}

impl RunContext {
    pub fn new() -> Self {
        Self::at(Local::now().naive_local())
    }

    pub fn at(now: NaiveDateTime) -> Self {
        Self {
            now,
            reuse: ReuseCache::new(),
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}
