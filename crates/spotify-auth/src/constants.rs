//! Spotify OAuth endpoints and defaults
//!
//! The client id and secret are not here: they identify a registered
//! application and come from configuration.

/// Authorization endpoint the user is redirected to
pub const AUTHORIZE_ENDPOINT: &str = "https://accounts.spotify.com/authorize";

/// Token endpoint for authorization-code exchange and token refresh
pub const TOKEN_ENDPOINT: &str = "https://accounts.spotify.com/api/token";

/// Base URL of the Web API that accepts the bearer tokens
pub const API_BASE_URL: &str = "https://api.spotify.com/v1";

/// Callback the gateway serves for the authorization redirect
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8000/api/spotify/auth_redirect";

/// Scopes needed to read the current playback and control the queue.
pub const DEFAULT_SCOPES: &str =
    "user-modify-playback-state user-read-currently-playing user-read-playback-state";

/// Bound on every token-endpoint request when the caller doesn't set one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
