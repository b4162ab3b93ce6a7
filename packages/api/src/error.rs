//! Error types for backend client setup.

use thiserror::Error;

/// Errors building an [`crate::HttpBackend`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required setting absent or empty
    #[error("{0} not set")]
    Missing(&'static str),

    /// Backend URL does not parse or is not http(s)
    #[error("invalid backend url: {0}")]
    InvalidUrl(String),

    /// HTTP client could not be built
    #[error("http client error: {0}")]
    Client(#[from] reqwest::Error),
}
