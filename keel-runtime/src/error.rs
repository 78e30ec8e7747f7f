//! Error types for the runtime client

use thiserror::Error;

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors that can occur when calling the container runtime
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The requested image is not present locally
    #[error("Image not found: {0}")]
    ImageNotFound(String),

    /// Container, volume or network does not exist
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Runtime command exited unsuccessfully
    #[error("{program} {args} failed (exit code {exit_code:?}): {stderr}")]
    Command {
        /// Program that was executed
        program: String,
        /// Space separated arguments, for diagnostics only
        args: String,
        /// Exit code, None when terminated by a signal
        exit_code: Option<i32>,
        /// Trimmed standard error
        stderr: String,
    },

    /// Failed to spawn or talk to the runtime
    #[error("Runtime I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Runtime output could not be parsed
    #[error("Failed to parse runtime response: {0}")]
    Parse(String),

    /// Malformed request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl RuntimeError {
    /// Check if this error means the image is missing locally
    pub fn is_image_not_found(&self) -> bool {
        matches!(self, Self::ImageNotFound(_))
    }

    /// Check if this error is a "not found" error of any kind
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::ImageNotFound(_))
    }
}

impl From<serde_json::Error> for RuntimeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}
