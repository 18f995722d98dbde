//! In-process stand-ins for the accounts service and the Web API

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use common::Secret;
use spotify_auth::{Credential, CredentialStore, OAuthConfig, TokenClient, unix_millis};
use spotify_session::{AuthenticatedClient, TokenManager};
use tokio::net::TcpListener;

use crate::spotify::SpotifyApi;
use crate::{AppState, ServiceCounters};

/// Shared knobs and recordings of the mock upstream.
#[derive(Clone, Default)]
pub struct MockUpstream {
    token_calls: Arc<AtomicUsize>,
    token_bodies: Arc<Mutex<Vec<String>>>,
    requests: Arc<Mutex<Vec<String>>>,
    bearers: Arc<Mutex<Vec<String>>>,
    reject_next: Arc<AtomicUsize>,
    fail_status: Arc<AtomicU16>,
    playing: Arc<AtomicBool>,
}

impl MockUpstream {
    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub fn token_bodies(&self) -> Vec<String> {
        self.token_bodies.lock().unwrap().clone()
    }

    /// Web API requests as `"METHOD /path?query"`.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn bearers(&self) -> Vec<String> {
        self.bearers.lock().unwrap().clone()
    }

    /// Answer the next `n` Web API requests with 401.
    pub fn reject_next(&self, n: usize) {
        self.reject_next.store(n, Ordering::SeqCst);
    }

    /// Answer every Web API request with `status` and a Spotify error body.
    pub fn fail_with(&self, status: u16) {
        self.fail_status.store(status, Ordering::SeqCst);
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::SeqCst);
    }
}

fn track_json() -> serde_json::Value {
    serde_json::json!({
        "name": "Bohemian Rhapsody",
        "uri": "spotify:track:4u7EnebtmKWzUH433cf5Qv",
        "artists": [{ "name": "Queen", "id": "1dfeR4HaWDbWqFHLkxsg1d" }],
        "external_urls": { "spotify": "https://open.spotify.com/track/4u7EnebtmKWzUH433cf5Qv" },
        "duration_ms": 354320
    })
}

async fn token_endpoint(State(mock): State<MockUpstream>, body: String) -> Response {
    let n = mock.token_calls.fetch_add(1, Ordering::SeqCst) + 1;
    mock.token_bodies.lock().unwrap().push(body.clone());

    if body.contains("code=bad") {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Invalid authorization code"
            })),
        )
            .into_response();
    }

    Json(serde_json::json!({
        "access_token": format!("at_new_{n}"),
        "token_type": "Bearer",
        "expires_in": 3600,
        "refresh_token": "rt_new",
        "scope": "user-read-playback-state"
    }))
    .into_response()
}

async fn web_api(
    State(mock): State<MockUpstream>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let target = match uri.query() {
        Some(query) => format!("{method} {}?{query}", uri.path()),
        None => format!("{method} {}", uri.path()),
    };
    mock.requests.lock().unwrap().push(target);
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    mock.bearers.lock().unwrap().push(bearer);

    if mock
        .reject_next
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
    {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": { "status": 401, "message": "The access token expired" }
            })),
        )
            .into_response();
    }

    let fail = mock.fail_status.load(Ordering::SeqCst);
    if fail != 0 {
        return (
            StatusCode::from_u16(fail).unwrap(),
            Json(serde_json::json!({
                "error": {
                    "status": fail,
                    "message": "Player command failed: No active device found",
                    "reason": "NO_ACTIVE_DEVICE"
                }
            })),
        )
            .into_response();
    }

    match (method.as_str(), uri.path()) {
        ("GET", "/v1/me/player") if mock.playing.load(Ordering::SeqCst) => Json(serde_json::json!({
            "is_playing": true,
            "item": track_json(),
            "context": {
                "type": "playlist",
                "external_urls": {
                    "spotify": "https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M"
                }
            }
        }))
        .into_response(),
        ("GET", "/v1/me/player") => StatusCode::NO_CONTENT.into_response(),
        ("POST", "/v1/me/player/next") | ("POST", "/v1/me/player/queue") => {
            StatusCode::NO_CONTENT.into_response()
        }
        ("GET", "/v1/search") if uri.query().unwrap_or_default().contains("q=nothing") => {
            Json(serde_json::json!({ "tracks": { "items": [], "total": 0 } })).into_response()
        }
        ("GET", "/v1/search") => {
            Json(serde_json::json!({ "tracks": { "items": [track_json()], "total": 1 } }))
                .into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Serve the mock on an ephemeral port and return its base URL.
pub async fn start_upstream(mock: MockUpstream) -> String {
    let app = Router::new()
        .route("/api/token", post(token_endpoint))
        .fallback(web_api)
        .with_state(mock);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

pub fn valid_credential() -> Credential {
    Credential {
        access_token: "at_valid".into(),
        refresh_token: Some("rt_1".into()),
        expires_at: unix_millis() + 3_600_000,
    }
}

pub fn expired_credential() -> Credential {
    Credential {
        access_token: "at_stale".into(),
        refresh_token: Some("rt_1".into()),
        expires_at: 0,
    }
}

/// App state wired to the mock at `base` through the real token client.
pub async fn test_state(base: &str, credential: Option<Credential>) -> AppState {
    let mut oauth = OAuthConfig::new("client-id", Secret::new("client-secret".into()));
    oauth.token_url = format!("{base}/api/token");
    oauth.timeout = Duration::from_secs(5);

    let store = Arc::new(CredentialStore::in_memory());
    if let Some(credential) = credential {
        store.install(credential).await.unwrap();
    }

    let http = reqwest::Client::new();
    let exchanger = Arc::new(TokenClient::new(http.clone(), oauth.clone()));
    let manager = Arc::new(TokenManager::new(store, exchanger, oauth));
    let client = AuthenticatedClient::new(http, manager, Duration::from_secs(5));
    let (_recorder, prometheus) = crate::metrics::isolated_recorder();

    AppState {
        api: Arc::new(SpotifyApi::new(
            client,
            format!("{base}/v1"),
            Some("ZA".into()),
        )),
        counters: ServiceCounters {
            requests_total: Default::default(),
            errors_total: Default::default(),
            started_at: Instant::now(),
        },
        prometheus,
    }
}
