use std::future::Future;
use std::pin::pin;
use std::time::Duration;

use anyhow::Result;
use backup_core::RetentionScheduler;
use chrono::{Local, NaiveDateTime, TimeDelta, Timelike};
use tokio::signal;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::backup::{self, RunOptions};
use crate::config::BackupConfig;

/// Runs a backup pass now and then at the top of every hour until Ctrl-C.
///
/// Each pass is independent; a failed pass is logged and the next one still runs.
/// Ctrl-C during a pass lets it finish (saves are re-enabled) before the loop ends.
pub async fn run_hourly(
    config: &BackupConfig,
    scheduler: &RetentionScheduler,
    options: RunOptions,
) -> Result<()> {
    run_until(
        signal::ctrl_c(),
        || backup::run_once(config, scheduler, options),
        || until_next_hour(Local::now().naive_local()),
    )
    .await;
    Ok(())
}

/// Repeats `pass` with `next_wait()` between passes until `stop` completes.
///
/// `stop` is a single future polled for the whole loop, including while a pass
/// is running.
async fn run_until<S, P, Fut, T>(stop: S, mut pass: P, mut next_wait: impl FnMut() -> Duration)
where
    S: Future,
    P: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut stop = pin!(stop);
    let mut stopping = false;

    loop {
        let mut current = pin!(pass());
        let result = loop {
            tokio::select! {
                result = &mut current => break result,
                _ = &mut stop, if !stopping => {
                    info!("interrupted, finishing the current backup run");
                    stopping = true;
                }
            }
        };
        if let Err(err) = result {
            warn!("backup run failed: {:#}", err);
        }
        if stopping {
            info!("stopping scheduled backups");
            return;
        }

        let wait = next_wait();
        info!("next backup run in {}s", wait.as_secs());
        tokio::select! {
            _ = sleep(wait) => {}
            _ = &mut stop => {
                info!("interrupted, stopping scheduled backups");
                return;
            }
        }
    }
}

pub fn until_next_hour(now: NaiveDateTime) -> Duration {
    let top_of_hour = now
        .with_minute(0)
        .and_then(|time| time.with_second(0))
        .and_then(|time| time.with_nanosecond(0))
        .unwrap_or(now);
    (top_of_hour + TimeDelta::hours(1) - now)
        .to_std()
        .unwrap_or(Duration::from_secs(60))
}
