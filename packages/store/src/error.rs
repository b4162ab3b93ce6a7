//! Backend error types.

use thiserror::Error;

/// PostgREST code for "the result contains 0 rows" on a single-object request.
pub const NO_ROWS_CODE: &str = "PGRST116";

/// Errors reported by an [`crate::AuthBackend`] or [`crate::RecordStore`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    /// Credentials rejected, token invalid, or another auth API failure
    #[error("{message}")]
    Auth { status: Option<u16>, message: String },

    /// Signup with an email that already has an account
    #[error("User already registered")]
    UserAlreadyRegistered,

    /// Operation requires a session and none is active
    #[error("not authenticated")]
    NotAuthenticated,

    /// Table API returned an error body
    #[error("{message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// Connection, timeout or other transport failure
    #[error("network error: {0}")]
    Transport(String),

    /// Response body could not be decoded
    #[error("malformed response: {0}")]
    Decode(String),

    /// Failure injected by a test backend
    #[error("{0}")]
    Injected(String),
}

impl BackendError {
    pub fn auth(message: impl Into<String>) -> Self {
        BackendError::Auth {
            status: None,
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Decode(err.to_string())
    }
}

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, BackendError>;
