//! Error types returned by directory client implementations.

use http::StatusCode;
use thiserror::Error;

/// Errors that can occur when calling the directory service.
///
/// Client implementations own retry, pagination, and authentication; by the
/// time an error reaches the reconciler it is final for that call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// The service answered with a non-success status.
    #[error("directory service returned {status}: {message}")]
    Status {
        /// HTTP status of the response.
        status: StatusCode,
        /// Error message reported by the service.
        message: String,
    },

    /// The request never produced a response (network, TLS, auth token).
    #[error("directory transport error: {0}")]
    Transport(String),
}

impl DirectoryError {
    /// Creates a `404 Not Found` error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::Status {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    /// Creates an error for an arbitrary status.
    #[must_use]
    pub fn status(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Creates a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Returns the HTTP status, if the service responded.
    #[must_use]
    pub fn http_status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(_) => None,
        }
    }

    /// Returns `true` for the canonical not-found signal (HTTP 404).
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.http_status() == Some(StatusCode::NOT_FOUND)
    }
}
