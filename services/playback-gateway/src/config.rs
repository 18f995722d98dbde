//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The client secret is loaded from the SPOTIFY_SECRET env var or
//! client_secret_file, never stored in the TOML directly.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use common::Secret;
use serde::Deserialize;
use spotify_auth::{
    API_BASE_URL, AUTHORIZE_ENDPOINT, DEFAULT_REDIRECT_URI, DEFAULT_SCOPES, DEFAULT_TIMEOUT_SECS,
    OAuthConfig, TOKEN_ENDPOINT,
};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub spotify: SpotifyConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Registered application and upstream endpoints
#[derive(Debug, Deserialize)]
pub struct SpotifyConfig {
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// Path to a file containing the client secret (alternative to SPOTIFY_SECRET)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_scopes")]
    pub scopes: String,
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Market passed to search, e.g. "ZA"
    #[serde(default)]
    pub market: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Where the credential is persisted. In-memory only when unset.
    #[serde(default)]
    pub credential_path: Option<PathBuf>,
}

fn default_max_connections() -> usize {
    256
}

fn default_redirect_uri() -> String {
    DEFAULT_REDIRECT_URI.to_string()
}

fn default_scopes() -> String {
    DEFAULT_SCOPES.to_string()
}

fn default_authorize_url() -> String {
    AUTHORIZE_ENDPOINT.to_string()
}

fn default_token_url() -> String {
    TOKEN_ENDPOINT.to_string()
}

fn default_api_base_url() -> String {
    API_BASE_URL.to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn require_http_url(field: &str, value: &str) -> common::Result<()> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(common::Error::Config(format!(
            "{field} must start with http:// or https://, got: {value}"
        )))
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Client secret resolution order:
    /// 1. SPOTIFY_SECRET env var
    /// 2. client_secret_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(id) = std::env::var("SPOTIFY_ID") {
            config.spotify.client_id = id;
        }
        if config.spotify.client_id.trim().is_empty() {
            return Err(common::Error::Config("client_id must not be empty".into()));
        }

        for (field, value) in [
            ("redirect_uri", &config.spotify.redirect_uri),
            ("authorize_url", &config.spotify.authorize_url),
            ("token_url", &config.spotify.token_url),
            ("api_base_url", &config.spotify.api_base_url),
        ] {
            require_http_url(field, value)?;
        }

        if config.spotify.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if config.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        // Env var takes precedence over file
        if let Ok(secret) = std::env::var("SPOTIFY_SECRET") {
            config.spotify.client_secret = Some(Secret::new(secret));
        } else if let Some(ref secret_file) = config.spotify.client_secret_file {
            let secret = std::fs::read_to_string(secret_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read client_secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
            let secret = secret.trim().to_owned();
            if !secret.is_empty() {
                config.spotify.client_secret = Some(Secret::new(secret));
            }
        }

        if config.spotify.client_secret.is_none() {
            return Err(common::Error::Config(
                "client secret missing: set SPOTIFY_SECRET or client_secret_file".into(),
            ));
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("playback-gateway.toml")
    }
}

impl SpotifyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// OAuth client settings for the exchanger and the authorization URL.
    pub fn oauth(&self) -> common::Result<OAuthConfig> {
        let secret = self.client_secret.clone().ok_or_else(|| {
            common::Error::Config(
                "client secret missing: set SPOTIFY_SECRET or client_secret_file".into(),
            )
        })?;
        Ok(OAuthConfig {
            redirect_uri: self.redirect_uri.clone(),
            scopes: self.scopes.clone(),
            authorize_url: self.authorize_url.clone(),
            token_url: self.token_url.clone(),
            timeout: self.timeout(),
            ..OAuthConfig::new(self.client_id.clone(), secret)
        })
    }
}
