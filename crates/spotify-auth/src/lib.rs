//! Spotify OAuth credential primitives
//!
//! Provides the credential set and its store, the token exchanger for the
//! authorization-code and refresh-token grants, and the authorization
//! redirect with its anti-forgery `state`. Orchestration (when to refresh,
//! who waits for whom) lives in `spotify-session`.
//!
//! Credential flow:
//! 1. `authorize::generate_state()` + `authorize::build_authorization_url()`
//! 2. User authorizes, provider redirects back with `code` and `state`
//! 3. `TokenClient` exchanges the code via `GrantRequest::AuthorizationCode`
//! 4. Credential installed via `CredentialStore::install()`
//! 5. On expiry, `GrantRequest::RefreshToken` produces the next credential

pub mod authorize;
pub mod config;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod token;

pub use authorize::{build_authorization_url, generate_state, state_matches};
pub use config::OAuthConfig;
pub use constants::*;
pub use credentials::{AuthState, Credential, CredentialStore, unix_millis};
pub use error::{Error, Result};
pub use token::{
    GrantRequest, RefreshTokenField, TokenClient, TokenExchanger, TokenResponse,
    decode_token_response,
};
