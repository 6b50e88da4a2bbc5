use std::io::ErrorKind;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use backup_core::{
    ArchiveWriter, BackupError, ControlChannel, InclusionFilter, OfflineChannel, RetentionPolicy,
    RetentionScheduler, RunContext, RunReport, TIMESTAMP_FORMAT, announce, with_saves_suspended,
};
use tokio::task;
use tracing::info;

use crate::config::BackupConfig;
use crate::control::RconControl;
use crate::lock::{self, LOCK_FILE};

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Mirror status lines to players with `say`.
    pub verbose: bool,
    /// Leave the server alone: no RCON connection, commands are only logged.
    pub dry_run: bool,
}

pub fn build_scheduler(config: &BackupConfig) -> Result<RetentionScheduler> {
    let filter = InclusionFilter::new(&config.include, &config.exclude)
        .context("Invalid include/exclude pattern")?;
    let writer = ArchiveWriter::new(config.sources(), filter).with_anchor(config.anchor);
    Ok(RetentionScheduler::new(
        RetentionPolicy::standard(),
        &config.backup_location,
        writer,
    ))
}

/// One complete pass over the configured tags with world saving suspended.
pub async fn run_once(
    config: &BackupConfig,
    scheduler: &RetentionScheduler,
    options: RunOptions,
) -> Result<RunReport> {
    std::fs::create_dir_all(&config.backup_location).with_context(|| {
        format!(
            "Failed to create backup directory {}",
            config.backup_location.display()
        )
    })?;
    let lock_path = config.backup_location.join(LOCK_FILE);
    let _guard = match lock::acquire_lock(&lock_path) {
        Ok(guard) => guard,
        Err(err) if err.kind() == ErrorKind::WouldBlock => {
            bail!("another backup run holds {}", lock_path.display())
        }
        Err(err) => {
            return Err(err).with_context(|| format!("Failed to lock {}", lock_path.display()));
        }
    };

    let ctx = RunContext::new();
    let started = ctx.now.format(TIMESTAMP_FORMAT).to_string();
    info!("saving backups: {}", started);

    let rcon = if options.dry_run {
        None
    } else {
        Some(RconControl::connect(config).await?)
    };
    let offline = OfflineChannel;
    let channel: &dyn ControlChannel = match &rcon {
        Some(rcon) => rcon as &dyn ControlChannel,
        None => &offline,
    };
    let settle = if options.dry_run {
        Duration::ZERO
    } else {
        Duration::from_secs(config.save_settle_secs)
    };

    if options.verbose {
        announce(channel, &format!("Saving backups: {started}")).await;
    }

    let scheduler = scheduler.clone();
    let tags = config.backup_frequency.clone();
    let result = with_saves_suspended(channel, settle, || async move {
        task::spawn_blocking(move || {
            let mut ctx = ctx;
            scheduler.run(&mut ctx, &tags)
        })
        .await
        .map_err(|err| BackupError::Task(err.to_string()))?
    })
    .await;

    if let Ok(report) = &result {
        if options.verbose {
            for name in report.produced() {
                announce(channel, &format!("Backup saved: {name}")).await;
            }
            announce(channel, "Backups complete").await;
        }
        info!(
            "backups complete: {} archive(s) written",
            report.produced().len()
        );
    }

    if let Some(rcon) = rcon {
        rcon.close().await;
    }
    result.context("Backup run failed")
}
