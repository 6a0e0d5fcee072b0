//! Client error types.
//!
//! Every service call returns `Result<T, ClientError>`. The interceptor
//! resolves what it can (token refresh, cache substitution) and surfaces
//! everything else here unchanged, so callers decide on user-facing messages.

use reqwest::StatusCode;
use thiserror::Error;

use crate::config::ConfigError;
use crate::store::StoreError;

/// Maximum number of body characters kept in error values.
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Errors produced by the Keyhaven client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport or network failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server rejected the credentials and no refresh could fix it.
    #[error("Unauthorized: {body}")]
    Unauthorized {
        /// Response body of the rejected request.
        body: String,
    },

    /// Exchanging the refresh token failed.
    #[error("Token refresh failed: {0}")]
    RefreshFailed(#[source] Box<ClientError>),

    /// A token exchange succeeded but the body lacked the access/refresh pair.
    #[error("Response did not include an access and refresh token pair")]
    MissingTokens,

    /// The server answered 304 but there is no cached body to substitute.
    #[error("Not modified, but no cached response is available")]
    NotModified,

    /// The server returned a non-success status.
    #[error("Server error {status}: {body}")]
    Status {
        /// HTTP status code.
        status: StatusCode,
        /// Response body (truncated).
        body: String,
    },

    /// The request was rejected locally before reaching the network.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// The response body did not match the expected shape.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The persisted session could not be read or written.
    #[error("Session store error: {0}")]
    Store(#[from] StoreError),

    /// The client configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ClientError {
    /// Create an error from a non-success status and its body.
    #[must_use]
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let body = truncate(body);
        if status == StatusCode::UNAUTHORIZED {
            Self::Unauthorized { body }
        } else {
            Self::Status { status, body }
        }
    }

    /// HTTP status associated with this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Unauthorized { .. } => Some(StatusCode::UNAUTHORIZED),
            Self::NotModified => Some(StatusCode::NOT_MODIFIED),
            Self::Status { status, .. } => Some(*status),
            Self::Http(err) => err.status(),
            Self::RefreshFailed(inner) => inner.status(),
            _ => None,
        }
    }

    /// Returns true for authentication failures: a 401 without a usable
    /// refresh token, or a failed refresh exchange.
    #[must_use]
    pub const fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthorized { .. } | Self::RefreshFailed(_))
    }

    /// Returns true if the request never reached the network.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

/// Result type alias for `ClientError`.
pub type Result<T> = std::result::Result<T, ClientError>;
