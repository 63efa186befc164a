//! Error types for qdisk

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid disk name '{name}': {reason}")]
    InvalidDiskName { name: String, reason: &'static str },

    #[error("Unsupported disk format: {0}")]
    UnsupportedFormat(String),

    #[error("Disk image '{0}' not found")]
    DiskNotFound(String),

    #[error("Disk image '{0}' already exists")]
    DiskAlreadyExists(String),

    #[error("{program} failed (exit code {code:?}): {stderr}")]
    CommandFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Machine launch failed: {0}")]
    Launch(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse failure category, used by the HTTP layer to pick a status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller sent an incomplete or malformed request
    Validation,
    /// Named disk has no backing file
    NotFound,
    /// Named disk already has a backing file
    Conflict,
    /// The disk utility ran and failed, or could not be started
    Execution,
    /// The emulator could not be started or exited non-zero
    Launch,
    /// Anything else (filesystem faults, serialization)
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) | Error::InvalidDiskName { .. } | Error::UnsupportedFormat(_) => {
                ErrorKind::Validation
            }
            Error::DiskNotFound(_) => ErrorKind::NotFound,
            Error::DiskAlreadyExists(_) => ErrorKind::Conflict,
            Error::CommandFailed { .. } | Error::Spawn { .. } => ErrorKind::Execution,
            Error::Launch(_) => ErrorKind::Launch,
            Error::Config(_) | Error::Io(_) | Error::Json(_) | Error::Other(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Text to surface to an operator. Tool failures keep the tool's own
    /// diagnostic verbatim.
    pub fn diagnostic(&self) -> String {
        match self {
            Error::CommandFailed { stderr, .. } => stderr.trim().to_string(),
            Error::Launch(message) => message.clone(),
            other => other.to_string(),
        }
    }

    /// Short variant name for API error bodies
    pub fn name(&self) -> &'static str {
        match self {
            Error::Validation(_) => "ValidationError",
            Error::InvalidDiskName { .. } => "InvalidDiskName",
            Error::UnsupportedFormat(_) => "UnsupportedFormat",
            Error::DiskNotFound(_) => "DiskNotFound",
            Error::DiskAlreadyExists(_) => "DiskAlreadyExists",
            Error::CommandFailed { .. } => "CommandFailed",
            Error::Spawn { .. } => "CommandNotStarted",
            Error::Launch(_) => "LaunchError",
            Error::Config(_) => "ConfigError",
            Error::Io(_) => "IoError",
            Error::Json(_) => "JsonError",
            Error::Other(_) => "Error",
        }
    }

    pub(crate) fn missing(field: &str) -> Self {
        Error::Validation(format!("missing required field '{}'", field))
    }
}
