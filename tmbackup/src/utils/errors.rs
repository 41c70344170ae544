//! Error types for backup runs.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Location not found: {0}")]
    LocationNotFound(String),

    #[error("Not a backup location (no backup.marker): {0}")]
    NotABackupLocation(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Backup location already initialized: {0}")]
    AlreadyInitialized(String),

    #[error("Remote shell to {host} failed (exit status {status}): {message}")]
    Transport {
        host: String,
        status: i32,
        message: String,
    },

    #[error("Command failed with exit status {status}: {command}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("Previous backup task is still active (pid {0})")]
    AlreadyRunning(i32),

    #[error("Insufficient space: {0}")]
    InsufficientSpace(String),

    #[error("Transfer failed with exit status {status}: {message}")]
    TransferFailure { status: i32, message: String },

    #[error("Cannot parse snapshot date: {0}")]
    DateParse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Marker error: {0}")]
    Marker(#[from] toml::de::Error),

    #[error("Interrupted by {0}")]
    Interrupted(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BackupError>;
