use std::fs;
use std::path::{Path, PathBuf};

use backup_core::{AnchorMode, parse_tag_list};
use serde::{Serialize, Serializer};
use thiserror::Error;
use tracing::info;

/// Environment variables and the configuration key each one sets.
///
/// Only these names are read. Keys added on top of the classic six carry a
/// `WORLD_BACKUP_` prefix, so ambient variables such as `INCLUDE` never leak in.
pub const ENV_VARS: [(&str, &str); 11] = [
    ("WORLD_LOCATION", "world_location"),
    ("BACKUP_LOCATION", "backup_location"),
    ("RCON_HOST", "rcon_host"),
    ("RCON_PORT", "rcon_port"),
    ("RCON_PASSWORD", "rcon_password"),
    ("BACKUP_FREQUENCY", "backup_frequency"),
    ("WORLD_BACKUP_WORLD_DIRS", "world_dirs"),
    ("WORLD_BACKUP_INCLUDE", "include"),
    ("WORLD_BACKUP_EXCLUDE", "exclude"),
    ("WORLD_BACKUP_ANCHOR", "anchor"),
    ("WORLD_BACKUP_SAVE_SETTLE_SECS", "save_settle_secs"),
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),

    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("path {0} is invalid")]
    InvalidPath(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupConfig {
    pub world_location: PathBuf,
    pub backup_location: PathBuf,
    pub world_dirs: Vec<String>,
    pub rcon_host: String,
    pub rcon_port: u16,
    pub rcon_password: String,
    pub backup_frequency: Vec<String>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    #[serde(serialize_with = "serialize_anchor")]
    pub anchor: AnchorMode,
    pub save_settle_secs: u64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            world_location: PathBuf::from("./"),
            backup_location: PathBuf::from("./backup"),
            world_dirs: vec![
                "world".to_string(),
                "world_nether".to_string(),
                "world_the_end".to_string(),
            ],
            rcon_host: "localhost".to_string(),
            rcon_port: backup_rcon::DEFAULT_RCON_PORT,
            rcon_password: String::new(),
            backup_frequency: vec!["daily".to_string(), "weekly".to_string()],
            include: Vec::new(),
            exclude: Vec::new(),
            anchor: AnchorMode::Parent,
            save_settle_secs: 5,
        }
    }
}

impl BackupConfig {
    /// Applies raw key/value pairs on top of `self`.
    ///
    /// Keys match case-insensitively. Unknown keys and unparsable values are errors.
    pub fn apply_pairs<I, K, V>(mut self, pairs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in pairs {
            let key = key.as_ref().trim().to_ascii_lowercase();
            let value = value.as_ref().trim();
            match key.as_str() {
                "world_location" => self.world_location = PathBuf::from(value),
                "backup_location" => self.backup_location = PathBuf::from(value),
                "world_dirs" => self.world_dirs = split_list(value),
                "rcon_host" => self.rcon_host = value.to_string(),
                "rcon_port" => self.rcon_port = parse_number(&key, value)?,
                "rcon_password" => self.rcon_password = value.to_string(),
                "backup_frequency" => self.backup_frequency = parse_tag_list(value),
                "include" => self.include = split_list(value),
                "exclude" => self.exclude = split_list(value),
                "anchor" => {
                    self.anchor = value.parse().map_err(|reason| ConfigError::InvalidValue {
                        key: key.clone(),
                        value: value.to_string(),
                        reason,
                    })?
                }
                "save_settle_secs" => self.save_settle_secs = parse_number(&key, value)?,
                _ => return Err(ConfigError::UnknownKey(key)),
            }
        }
        Ok(self)
    }

    /// Applies the variables listed in [`ENV_VARS`], ignoring everything else.
    pub fn apply_env<I>(self, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let known = vars.into_iter().filter_map(|(name, value)| {
            ENV_VARS
                .iter()
                .find(|(var, _)| *var == name)
                .map(|(_, key)| (*key, value))
        });
        self.apply_pairs(known)
    }

    pub fn sources(&self) -> Vec<PathBuf> {
        self.world_dirs
            .iter()
            .map(|dir| self.world_location.join(dir))
            .collect()
    }

    pub fn write_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let text = toml::to_string_pretty(self)?;
        fs::write(path, text).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Both locations must exist or be creatable before any backup work starts.
    pub fn validate_paths(&self) -> Result<(), ConfigError> {
        validate_path(&self.backup_location)?;
        validate_path(&self.world_location)
    }
}

/// Builds the configuration: defaults, then environment, then the file.
///
/// With a path that does not exist yet, the effective configuration is written
/// there so it can be edited. `None` skips the file entirely.
pub fn resolve<I>(config_path: Option<&Path>, env: I) -> Result<BackupConfig, ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let config = BackupConfig::default().apply_env(env)?;
    let Some(path) = config_path else {
        info!("using environment for configuration, no config file loaded");
        return Ok(config);
    };

    match read_file_pairs(path)? {
        Some(pairs) => {
            info!("loaded configuration from {}", path.display());
            config.apply_pairs(pairs)
        }
        None => {
            config.write_to(path)?;
            info!("wrote default configuration to {}", path.display());
            Ok(config)
        }
    }
}

fn read_file_pairs(path: &Path) -> Result<Option<Vec<(String, String)>>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let table = toml::from_str::<toml::Table>(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let pairs = table
        .iter()
        .map(|(key, value)| Ok::<_, ConfigError>((key.clone(), value_to_string(key, value)?)))
        .collect::<Result<Vec<_>, ConfigError>>()?;
    Ok(Some(pairs))
}

fn value_to_string(key: &str, value: &toml::Value) -> Result<String, ConfigError> {
    match value {
        toml::Value::String(text) => Ok(text.clone()),
        toml::Value::Integer(number) => Ok(number.to_string()),
        toml::Value::Float(number) => Ok(number.to_string()),
        toml::Value::Boolean(flag) => Ok(flag.to_string()),
        toml::Value::Array(items) => items
            .iter()
            .map(|item| value_to_string(key, item))
            .collect::<Result<Vec<_>, _>>()
            .map(|items| items.join(",")),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: other.to_string(),
            reason: "expected a string, number or list".to_string(),
        }),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: "expected a non-negative number".to_string(),
    })
}

fn serialize_anchor<S: Serializer>(anchor: &AnchorMode, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(anchor.as_str())
}

/// A path is usable when it exists, or when its parent is a writable directory.
pub fn validate_path(path: &Path) -> Result<(), ConfigError> {
    if path.exists() {
        return Ok(());
    }
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let writable = fs::metadata(parent)
        .map(|meta| meta.is_dir() && !meta.permissions().readonly())
        .unwrap_or(false);
    if writable {
        Ok(())
    } else {
        Err(ConfigError::InvalidPath(path.to_path_buf()))
    }
}
