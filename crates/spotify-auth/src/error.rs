//! Error types for the credential lifecycle

/// Errors from authorization, token exchange, and credential storage.
///
/// `NotAuthenticated`, `GrantRejected` and `RefreshFailed` (unless caused by
/// the network) mean the user has to run the authorization flow again.
/// `Network` is transient and safe to retry.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("not authenticated: complete the authorization flow first")]
    NotAuthenticated,

    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("grant rejected: {0}")]
    GrantRejected(String),

    #[error("token refresh failed: {0}")]
    RefreshFailed(#[source] Box<Error>),

    #[error("refresh task aborted: {0}")]
    Aborted(String),

    #[error("invalid OAuth configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),
}

impl Error {
    /// Whether retrying the same operation later may succeed without user action.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network(_) | Error::Aborted(_) => true,
            Error::RefreshFailed(inner) => inner.is_retryable(),
            _ => false,
        }
    }

    /// Whether the caller has to send the user through the authorization flow.
    pub fn requires_reauthentication(&self) -> bool {
        match self {
            Error::NotAuthenticated | Error::GrantRejected(_) => true,
            Error::RefreshFailed(inner) => !inner.is_retryable(),
            _ => false,
        }
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
