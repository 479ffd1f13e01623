//! Error types for the package index client

use thiserror::Error;

/// Result type alias for index client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to the package index
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Index returned an error status code
    #[error("index error (status {status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message from the index
        message: String,
    },

    /// Credentials were rejected by the index
    #[error("index rejected the credentials (status {status})")]
    Auth { status: u16 },

    /// Failed to read an artifact file for upload
    #[error("failed to read artifact {path}: {message}")]
    Artifact { path: String, message: String },
}

impl ClientError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Check if this error is an authentication failure
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }

    /// Check if this error is a server error (5xx status)
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Api { status, .. } if *status >= 500)
    }
}
