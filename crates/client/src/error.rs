//! Unified error handling for the client engine.
//!
//! Cart mutation and load failures are intentionally swallowed (logged, not
//! rethrown) inside [`crate::cart::CartSync`] to preserve UX continuity;
//! everything that reaches a caller as a `ClientError` comes from the
//! authentication path, the storage layer, or an explicit API failure.

use thiserror::Error;

use crate::cart::storage::StorageError;
use crate::config::ConfigError;

/// Client-side error taxonomy.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure (connect, timeout, TLS, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The session is unauthenticated or was rejected with 401. Session
    /// state has already been corrected when this surfaces.
    #[error("Unauthorized")]
    Unauthorized,

    /// A token refresh was requested but no refresh token is available.
    #[error("No refresh token available")]
    RefreshUnavailable,

    /// A response body did not match the expected wire shape.
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The local persistence slot failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration failure.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// A request URL could not be constructed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ClientError {
    /// The HTTP status carried by this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Unauthorized => Some(401),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Result type alias for `ClientError`.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display_includes_status() {
        let err = ClientError::Api {
            status: 422,
            message: "quantity exceeds stock".into(),
        };
        assert_eq!(err.to_string(), "API error (422): quantity exceeds stock");
        assert_eq!(err.status(), Some(422));
    }

    #[test]
    fn unauthorized_maps_to_401() {
        assert_eq!(ClientError::Unauthorized.status(), Some(401));
    }
}
