//! OAuth token exchange and refresh
//!
//! Both grants POST a form to the token endpoint with HTTP Basic client
//! authentication. The exchanger is a pure function of the grant: it never
//! retries and never touches the credential store. Retry and installation
//! belong to the lifecycle manager.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::OAuthConfig;
use crate::credentials::{Credential, unix_millis};
use crate::error::{Error, Result};

/// Parameters for one token-endpoint call. Never persisted.
#[derive(Clone, PartialEq, Eq)]
pub enum GrantRequest {
    AuthorizationCode { code: String, redirect_uri: String },
    RefreshToken { refresh_token: String },
}

impl GrantRequest {
    pub fn grant_type(&self) -> &'static str {
        match self {
            GrantRequest::AuthorizationCode { .. } => "authorization_code",
            GrantRequest::RefreshToken { .. } => "refresh_token",
        }
    }

    /// Form body for the token endpoint.
    fn form(&self) -> Vec<(&'static str, &str)> {
        match self {
            GrantRequest::AuthorizationCode { code, redirect_uri } => vec![
                ("grant_type", self.grant_type()),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ],
            GrantRequest::RefreshToken { refresh_token } => vec![
                ("grant_type", self.grant_type()),
                ("refresh_token", refresh_token),
            ],
        }
    }

    /// Refresh token to keep when the response doesn't rotate it.
    fn prior_refresh_token(&self) -> Option<&str> {
        match self {
            GrantRequest::AuthorizationCode { .. } => None,
            GrantRequest::RefreshToken { refresh_token } => Some(refresh_token),
        }
    }
}

impl fmt::Debug for GrantRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrantRequest")
            .field("grant_type", &self.grant_type())
            .finish_non_exhaustive()
    }
}

/// Raw token-endpoint body. Every field is optional so that "absent" is
/// decided here, explicitly, instead of by a failed deserialization.
#[derive(Debug, Default, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub token_type: Option<String>,
    /// Seconds until the access token expires (delta, not absolute)
    pub expires_in: Option<u64>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

/// What a response says about the refresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshTokenField {
    Absent,
    Empty,
    Rotated(String),
}

impl TokenResponse {
    pub fn refresh_token_field(&self) -> RefreshTokenField {
        match self.refresh_token.as_deref() {
            None => RefreshTokenField::Absent,
            Some("") => RefreshTokenField::Empty,
            Some(token) => RefreshTokenField::Rotated(token.to_string()),
        }
    }

    /// Turn a 2xx body into a credential issued at `issued_at` (unix ms).
    ///
    /// A missing or empty `access_token` is a rejected grant (the body minus
    /// any token fields is kept for diagnostics). A missing `expires_in` is a protocol error since
    /// expiry can't be computed without it. When the refresh token isn't
    /// rotated, `prior_refresh` is kept.
    pub fn into_credential(
        self,
        issued_at: u64,
        prior_refresh: Option<&str>,
        raw_body: &str,
    ) -> Result<Credential> {
        let refresh_token = match self.refresh_token_field() {
            RefreshTokenField::Rotated(token) => Some(token),
            RefreshTokenField::Empty => {
                warn!("token response carried an empty refresh_token, keeping the previous one");
                prior_refresh.map(str::to_string)
            }
            RefreshTokenField::Absent => prior_refresh.map(str::to_string),
        };

        let access_token = match self.access_token {
            Some(token) if !token.is_empty() => token,
            _ => {
                return Err(Error::GrantRejected(format!(
                    "response has no access_token: {}",
                    redact_tokens(raw_body)
                )));
            }
        };

        let expires_in = self
            .expires_in
            .ok_or_else(|| Error::Protocol("response has no expires_in".into()))?;

        Ok(Credential::issue(
            access_token,
            refresh_token,
            issued_at,
            expires_in,
        ))
    }
}

/// Classify a complete token-endpoint response.
///
/// - non-2xx with an OAuth error object (`{"error": ...}`) → `GrantRejected`
/// - any other non-2xx, or a body that isn't a JSON object → `Protocol`
/// - 2xx → [`TokenResponse::into_credential`]
pub fn decode_token_response(
    status: u16,
    body: &str,
    issued_at: u64,
    prior_refresh: Option<&str>,
) -> Result<Credential> {
    if !(200..300).contains(&status) {
        let body = redact_tokens(body);
        let oauth_error = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .is_some_and(|v| v.get("error").is_some());
        if oauth_error {
            return Err(Error::GrantRejected(format!(
                "token endpoint returned {status}: {body}"
            )));
        }
        return Err(Error::Protocol(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    let response: TokenResponse = serde_json::from_str(body)
        .map_err(|e| Error::Protocol(format!("invalid token response: {e}")))?;
    response.into_credential(issued_at, prior_refresh, body)
}

/// Copy of a JSON object body without its token fields. Other bodies are
/// returned as-is.
fn redact_tokens(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(mut fields)) => {
            fields.remove("access_token");
            fields.remove("refresh_token");
            serde_json::Value::Object(fields).to_string()
        }
        _ => body.to_string(),
    }
}

/// Performs a grant against the token endpoint.
///
/// Uses `Pin<Box<dyn Future>>` so managers can hold an `Arc<dyn TokenExchanger>`.
pub trait TokenExchanger: Send + Sync {
    fn exchange(
        &self,
        grant: GrantRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Credential>> + Send + '_>>;
}

/// Production exchanger backed by `reqwest`.
pub struct TokenClient {
    http: reqwest::Client,
    config: OAuthConfig,
}

impl TokenClient {
    pub fn new(http: reqwest::Client, config: OAuthConfig) -> Self {
        Self { http, config }
    }

    async fn exchange_grant(&self, grant: GrantRequest) -> Result<Credential> {
        debug!(grant_type = grant.grant_type(), "calling token endpoint");

        let response = self
            .http
            .post(&self.config.token_url)
            .basic_auth(
                &self.config.client_id,
                Some(self.config.client_secret.expose()),
            )
            .form(&grant.form())
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| {
                Error::Network(format!("{} request failed: {e}", grant.grant_type()))
            })?;

        let status = response.status().as_u16();
        let issued_at = unix_millis();
        let body = response.text().await.map_err(|e| {
            Error::Network(format!("reading {} response failed: {e}", grant.grant_type()))
        })?;

        let credential =
            decode_token_response(status, &body, issued_at, grant.prior_refresh_token())?;
        debug!(
            grant_type = grant.grant_type(),
            expires_at = credential.expires_at,
            "token endpoint issued credential"
        );
        Ok(credential)
    }
}

impl TokenExchanger for TokenClient {
    fn exchange(
        &self,
        grant: GrantRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Credential>> + Send + '_>> {
        Box::pin(self.exchange_grant(grant))
    }
}
