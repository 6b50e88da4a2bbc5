use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("cannot write archive destination {path}: {source}")]
    Destination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("failed to copy {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid filter pattern '{pattern}': {source}")]
    Filter {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("control command '{command}' failed: {message}")]
    Control { command: String, message: String },

    #[error("backup task failed: {0}")]
    Task(String),
}

impl BackupError {
    pub fn control(command: &str, message: impl Into<String>) -> Self {
        Self::Control {
            command: command.to_string(),
            message: message.into(),
        }
    }
}
