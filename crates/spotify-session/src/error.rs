//! Error types for authenticated resource calls

use spotify_auth::Error as AuthError;

/// Errors from [`crate::AuthenticatedClient::call`].
///
/// `Unauthenticated`, `Unauthorized`, and most `RefreshFailed` values need
/// the user to re-run the authorization flow. `Network` and 5xx `Upstream`
/// are transient.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("not authenticated: complete the authorization flow first")]
    Unauthenticated,

    #[error("token refresh failed: {0}")]
    RefreshFailed(#[source] AuthError),

    #[error("upstream rejected the access token after a forced refresh")]
    Unauthorized,

    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("network error: {message}")]
    Network { message: String, timed_out: bool },

    #[error("invalid upstream response: {0}")]
    Decode(String),
}

impl CallError {
    pub(crate) fn network(err: reqwest::Error) -> Self {
        CallError::Network {
            timed_out: err.is_timeout(),
            message: err.to_string(),
        }
    }

    /// Whether retrying later may succeed without user action.
    pub fn is_retryable(&self) -> bool {
        match self {
            CallError::Network { .. } => true,
            CallError::Upstream { status, .. } => *status == 429 || *status >= 500,
            CallError::RefreshFailed(inner) => inner.is_retryable(),
            _ => false,
        }
    }

    /// Whether the user has to run the authorization flow again.
    pub fn requires_reauthentication(&self) -> bool {
        match self {
            CallError::Unauthenticated | CallError::Unauthorized => true,
            CallError::RefreshFailed(inner) => inner.requires_reauthentication(),
            _ => false,
        }
    }
}

impl From<AuthError> for CallError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::NotAuthenticated => CallError::Unauthenticated,
            AuthError::RefreshFailed(inner) => CallError::RefreshFailed(*inner),
            other => CallError::RefreshFailed(other),
        }
    }
}

/// Result alias for authenticated calls.
pub type Result<T> = std::result::Result<T, CallError>;
