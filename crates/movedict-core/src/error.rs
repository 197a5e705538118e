//! Error types for movedict

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for movedict operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Video decode error: {0}")]
    Decode(String),

    #[error("Video encoding error: {0}")]
    Encoder(String),

    #[error("Container error: {0}")]
    Container(String),

    #[error("Pose estimator error: {0}")]
    Estimator(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Output name already taken: {name}")]
    NameCollision { name: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Command execution failed: {command} - {message}")]
    CommandFailed { command: String, message: String },
}

/// Result type alias using movedict's Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a command execution error
    pub fn command_failed(command: impl Into<String>, message: impl Into<String>) -> Self {
        Error::CommandFailed {
            command: command.into(),
            message: message.into(),
        }
    }
}

/// Failure of a single transcode invocation
///
/// Neither variant is retried. `OpenFailed` guarantees that no output file
/// was created; `ProcessingFailed` guarantees that any partial output was
/// removed before the error was returned.
#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("failed to open input {path:?}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: Error,
    },

    #[error("processing failed: {0}")]
    ProcessingFailed(#[source] Error),
}

impl TranscodeError {
    /// Short machine-readable reason, as reported to the calling layer
    pub fn reason(&self) -> &'static str {
        match self {
            TranscodeError::OpenFailed { .. } => "open_failed",
            TranscodeError::ProcessingFailed(_) => "processing_failed",
        }
    }
}
