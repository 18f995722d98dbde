//! Authorization redirect and anti-forgery `state` handling
//!
//! The gateway sends the user to the provider's authorization page with a
//! random `state`. The provider echoes it back on the redirect, and the
//! callback is only honoured if the echoed value matches one we issued.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use constant_time_eq::constant_time_eq;
use rand::RngExt;
use sha2::{Digest, Sha256};

use crate::config::OAuthConfig;
use crate::error::{Error, Result};

/// Generate a random anti-forgery `state` value.
///
/// 32 random bytes encoded as URL-safe base64 without padding (43 chars).
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Build the authorization URL the user is redirected to.
pub fn build_authorization_url(config: &OAuthConfig, state: &str) -> Result<String> {
    let url = reqwest::Url::parse_with_params(
        &config.authorize_url,
        &[
            ("response_type", "code"),
            ("client_id", config.client_id.as_str()),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("scope", config.scopes.as_str()),
            ("state", state),
        ],
    )
    .map_err(|e| Error::Config(format!("authorize_url {}: {e}", config.authorize_url)))?;
    Ok(url.into())
}

/// Compare two `state` values without leaking where they differ.
///
/// Both sides are hashed first so the comparison always runs over 32 bytes
/// regardless of the presented length.
pub fn state_matches(expected: &str, presented: &str) -> bool {
    let a = Sha256::digest(expected.as_bytes());
    let b = Sha256::digest(presented.as_bytes());
    constant_time_eq(a.as_slice(), b.as_slice())
}
