//! Spotify Playback Gateway
//!
//! Single-binary Rust service that:
//! 1. Sends the user through Spotify's authorization-code flow
//! 2. Keeps the resulting credential fresh, refreshing lazily on expiry
//! 3. Exposes now-playing, skip, search and queue routes backed by the Web API
//! 4. Reports health and Prometheus metrics

mod api;
mod config;
mod error;
mod metrics;
mod spotify;
#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use spotify_auth::{AuthState, CredentialStore, TokenClient};
use spotify_session::{AuthenticatedClient, TokenManager};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::spotify::SpotifyApi;

/// How long in-flight requests get to finish after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Request counters reported by `/health`
#[derive(Clone)]
struct ServiceCounters {
    requests_total: Arc<AtomicU64>,
    errors_total: Arc<AtomicU64>,
    started_at: Instant,
}

impl ServiceCounters {
    fn new() -> Self {
        Self {
            requests_total: Arc::new(AtomicU64::new(0)),
            errors_total: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }
}

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    api: Arc<SpotifyApi>,
    counters: ServiceCounters,
    prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .nest("/api/spotify", api::routes())
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs, filtered by LOG_LEVEL or RUST_LOG
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting spotify-playback-gateway");

    // Install before any metrics are emitted
    let prometheus = metrics::install_recorder().context("failed to install Prometheus recorder")?;

    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    let oauth = config.spotify.oauth()?;

    info!(
        listen_addr = %config.server.listen_addr,
        api_base_url = %config.spotify.api_base_url,
        redirect_uri = %config.spotify.redirect_uri,
        persistent = config.spotify.credential_path.is_some(),
        "configuration loaded"
    );

    let store = match &config.spotify.credential_path {
        Some(path) => CredentialStore::load(path.clone()).await,
        None => CredentialStore::in_memory(),
    };
    let store = Arc::new(store);
    info!(
        auth_state = store.state_at(spotify_auth::unix_millis()).await.label(),
        "credential store ready"
    );

    let http = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;
    let exchanger = Arc::new(TokenClient::new(http.clone(), oauth.clone()));
    let manager = Arc::new(TokenManager::new(store, exchanger, oauth));
    let client = AuthenticatedClient::new(http, manager, config.spotify.timeout());

    let state = AppState {
        api: Arc::new(SpotifyApi::new(
            client,
            config.spotify.api_base_url.clone(),
            config.spotify.market.clone(),
        )),
        counters: ServiceCounters::new(),
        prometheus,
    };

    let app = build_router(state, config.server.max_connections);
    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // The drain timer starts at signal receipt, not at server start.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => info!("all in-flight requests drained"),
        Ok(Ok(Err(e))) => error!(error = %e, "server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "server task panicked"),
        Err(_) => warn!(
            drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "drain timeout exceeded, forcing shutdown"
        ),
    }

    info!("shutdown complete");
    Ok(())
}

/// Liveness plus the authentication state.
///
/// Always 200: an unauthenticated gateway is running fine, it just needs a
/// human to visit `/api/spotify/authenticate`.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let auth_state = state.api.manager().auth_state().await;
    let status = match auth_state {
        AuthState::Unauthenticated => "degraded",
        AuthState::Valid | AuthState::Expired => "healthy",
    };

    let body = serde_json::json!({
        "status": status,
        "auth_state": auth_state.label(),
        "uptime_seconds": state.counters.started_at.elapsed().as_secs(),
        "requests_served": state.counters.requests_total.load(Ordering::Relaxed),
        "errors_total": state.counters.errors_total.load(Ordering::Relaxed),
    });

    (
        axum::http::StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus text exposition.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::test_support::{MockUpstream, start_upstream, test_state, valid_credential};

    async fn get_json(state: AppState, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = build_router(state, 16)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn health_reports_unauthenticated_as_degraded() {
        let base = start_upstream(MockUpstream::default()).await;
        let state = test_state(&base, None).await;

        let (status, json) = get_json(state, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["auth_state"], "unauthenticated");
        assert_eq!(json["requests_served"], 0);
        assert!(json["uptime_seconds"].is_u64());
    }

    #[tokio::test]
    async fn health_reports_counters_and_valid_auth() {
        let base = start_upstream(MockUpstream::default()).await;
        let state = test_state(&base, Some(valid_credential())).await;
        state.counters.requests_total.fetch_add(5, Ordering::Relaxed);
        state.counters.errors_total.fetch_add(2, Ordering::Relaxed);

        let (status, json) = get_json(state, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["auth_state"], "valid");
        assert_eq!(json["requests_served"], 5);
        assert_eq!(json["errors_total"], 2);
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_prometheus_format() {
        let base = start_upstream(MockUpstream::default()).await;
        let state = test_state(&base, None).await;

        let response = build_router(state, 16)
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(content_type.starts_with("text/plain"));
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let base = start_upstream(MockUpstream::default()).await;
        let state = test_state(&base, None).await;

        let response = build_router(state, 16)
            .oneshot(
                Request::builder()
                    .uri("/api/spotify/unknown")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
