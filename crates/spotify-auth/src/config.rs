//! OAuth client registration shared by the exchanger and the authorization URL builder

use std::time::Duration;

use common::Secret;

use crate::constants::{
    AUTHORIZE_ENDPOINT, DEFAULT_REDIRECT_URI, DEFAULT_SCOPES, DEFAULT_TIMEOUT_SECS, TOKEN_ENDPOINT,
};

/// Registered application identity plus the endpoints it talks to.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub redirect_uri: String,
    pub scopes: String,
    pub authorize_url: String,
    pub token_url: String,
    /// Upper bound for a single token-endpoint request
    pub timeout: Duration,
}

impl OAuthConfig {
    /// Config pointing at the public Spotify accounts service.
    pub fn new(client_id: impl Into<String>, client_secret: Secret<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret,
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            scopes: DEFAULT_SCOPES.to_string(),
            authorize_url: AUTHORIZE_ENDPOINT.to_string(),
            token_url: TOKEN_ENDPOINT.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}
