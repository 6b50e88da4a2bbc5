use anyhow::{Context, Result};
use async_trait::async_trait;
use backup_core::{BackupError, ControlChannel};
use backup_rcon::{RconSession, RconSettings, load_rcon_settings};
use tracing::{debug, info, warn};

use crate::config::BackupConfig;

/// The server console, reached over RCON.
pub struct RconControl {
    session: RconSession,
}

impl RconControl {
    pub async fn connect(config: &BackupConfig) -> Result<Self> {
        let settings = resolve_settings(config).await?;
        let session = RconSession::connect(&settings).await?;
        Ok(Self { session })
    }

    pub async fn close(self) {
        let address = self.session.address().to_string();
        if let Err(err) = self.session.close().await {
            warn!("failed to close RCON session to {}: {:#}", address, err);
        }
    }
}

#[async_trait]
impl ControlChannel for RconControl {
    async fn command(&self, command: &str) -> Result<String, BackupError> {
        let response = self
            .session
            .execute(command)
            .await
            .map_err(|err| BackupError::control(command, format!("{err:#}")))?;
        let trimmed = response.trim();
        if !trimmed.is_empty() {
            info!("{}", trimmed);
        }
        Ok(response)
    }
}

/// Explicit credentials win; without a password, `server.properties` next to
/// the worlds is consulted.
async fn resolve_settings(config: &BackupConfig) -> Result<RconSettings> {
    if config.rcon_password.is_empty() {
        let discovered = load_rcon_settings(&config.world_location, &config.rcon_host)
            .await
            .context("Failed to read RCON settings from server.properties")?;
        if let Some(settings) = discovered {
            debug!("using RCON settings from server.properties");
            return Ok(settings);
        }
    }
    Ok(RconSettings::new(
        &config.rcon_host,
        config.rcon_port,
        config.rcon_password.clone(),
    ))
}
