use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::errors::BackupError;

pub const SAVE_ALL: &str = "save-all";
pub const SAVE_OFF: &str = "save-off";
pub const SAVE_ON: &str = "save-on";

/// Server console the backup talks to while it runs.
#[async_trait]
pub trait ControlChannel: Send + Sync {
    async fn command(&self, command: &str) -> Result<String, BackupError>;
}

/// Stand-in for a dry run: logs what would have been sent and answers with nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineChannel;

#[async_trait]
impl ControlChannel for OfflineChannel {
    async fn command(&self, command: &str) -> Result<String, BackupError> {
        info!("dry run: not sending '{}'", command);
        Ok(String::new())
    }
}

/// Runs `pass` with world saving switched off.
///
/// `save-all` flushes the world, `settle` gives the server time to finish
/// writing, then `save-off` holds further writes. `save-on` is sent exactly once
/// afterwards on every path, including a failed suspend or a failed pass. A
/// resume failure is returned only when nothing failed before it.
pub async fn with_saves_suspended<T, F, Fut>(
    channel: &dyn ControlChannel,
    settle: Duration,
    pass: F,
) -> Result<T, BackupError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, BackupError>>,
{
    let outcome = match suspend(channel, settle).await {
        Ok(()) => pass().await,
        Err(err) => Err(err),
    };

    match (outcome, channel.command(SAVE_ON).await) {
        (Ok(value), Ok(_)) => Ok(value),
        (Ok(_), Err(resume_err)) => {
            warn!("failed to re-enable world saving: {}", resume_err);
            Err(resume_err)
        }
        (Err(err), Ok(_)) => Err(err),
        (Err(err), Err(resume_err)) => {
            warn!("failed to re-enable world saving after error: {}", resume_err);
            Err(err)
        }
    }
}

async fn suspend(channel: &dyn ControlChannel, settle: Duration) -> Result<(), BackupError> {
    channel.command(SAVE_ALL).await?;
    if !settle.is_zero() {
        tokio::time::sleep(settle).await;
    }
    channel.command(SAVE_OFF).await?;
    Ok(())
}

/// Broadcasts a status line to players. Never fails the caller.
pub async fn announce(channel: &dyn ControlChannel, message: &str) {
    if let Err(err) = channel.command(&format!("say {message}")).await {
        warn!("failed to announce '{}': {}", message, err);
    }
}
