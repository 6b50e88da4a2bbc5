use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use minecraft_client_rs::Client;
use tokio::fs;
use tokio::task::spawn_blocking;
use tracing::info;

pub const DEFAULT_RCON_PORT: u16 = 25575;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RconSettings {
    pub address: String,
    pub password: String,
}

impl RconSettings {
    pub fn new(host: &str, port: u16, password: impl Into<String>) -> Self {
        Self {
            address: format!("{host}:{port}"),
            password: password.into(),
        }
    }

    /// One bullet per password character, for log lines.
    pub fn masked_password(&self) -> String {
        "•".repeat(self.password.chars().count())
    }
}

/// An authenticated RCON connection, kept open for the length of one backup run.
pub struct RconSession {
    address: String,
    client: Arc<Mutex<Client>>,
}

impl RconSession {
    pub async fn connect(settings: &RconSettings) -> Result<Self> {
        let mut line = format!("connecting to {}", settings.address);
        if !settings.password.is_empty() {
            line.push_str(&format!(" with password: {}", settings.masked_password()));
        }
        info!("{}", line);

        let address = settings.address.clone();
        let password = settings.password.clone();
        let client = spawn_blocking(move || {
            let mut client =
                Client::new(address).map_err(|err| anyhow::anyhow!(err.to_string()))?;
            client
                .authenticate(password)
                .map_err(|err| anyhow::anyhow!(err.to_string()))?;
            Ok::<_, anyhow::Error>(client)
        })
        .await
        .with_context(|| "RCON connect task failed")?
        .with_context(|| format!("Failed to connect to RCON at {}", settings.address))?;

        Ok(Self {
            address: settings.address.clone(),
            client: Arc::new(Mutex::new(client)),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub async fn execute(&self, command: &str) -> Result<String> {
        let client = Arc::clone(&self.client);
        let command = command.to_string();

        spawn_blocking(move || {
            let mut client = client
                .lock()
                .map_err(|_| anyhow::anyhow!("RCON session lock poisoned"))?;
            let response = client
                .send_command(command)
                .map_err(|err| anyhow::anyhow!(err.to_string()))?;
            Ok::<_, anyhow::Error>(response.body)
        })
        .await
        .with_context(|| "RCON task failed")?
    }

    pub async fn close(self) -> Result<()> {
        let client = self.client;
        spawn_blocking(move || {
            let mut client = client
                .lock()
                .map_err(|_| anyhow::anyhow!("RCON session lock poisoned"))?;
            client
                .close()
                .map_err(|err| anyhow::anyhow!(err.to_string()))
        })
        .await
        .with_context(|| "RCON task failed")?
    }
}

/// Reads RCON settings from the `server.properties` in `server_dir`.
///
/// Returns `None` when the file is missing or RCON is disabled.
pub async fn load_rcon_settings(server_dir: &Path, host: &str) -> Result<Option<RconSettings>> {
    let properties_path = server_dir.join("server.properties");
    let content = match fs::read_to_string(&properties_path).await {
        Ok(value) => value,
        Err(_) => return Ok(None),
    };
    parse_rcon_properties(&content, host)
}

pub fn parse_rcon_properties(content: &str, host: &str) -> Result<Option<RconSettings>> {
    let mut enabled = false;
    let mut port: Option<u16> = None;
    let mut password: Option<String> = None;

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((key, value)) = trimmed.split_once('=') else {
            continue;
        };
        match key.trim() {
            "enable-rcon" => enabled = value.trim().eq_ignore_ascii_case("true"),
            "rcon.port" => port = value.trim().parse::<u16>().ok(),
            "rcon.password" => {
                let val = value.trim();
                if !val.is_empty() {
                    password = Some(val.to_string());
                }
            }
            _ => {}
        }
    }

    if !enabled {
        return Ok(None);
    }

    let password = password.ok_or_else(|| anyhow::anyhow!("Missing rcon.password"))?;
    Ok(Some(RconSettings::new(
        host,
        port.unwrap_or(DEFAULT_RCON_PORT),
        password,
    )))
}
