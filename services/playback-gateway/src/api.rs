//! Routes under `/api/spotify`
//!
//! Handlers stay thin: parse the request, call one `SpotifyApi` operation,
//! shape the JSON. Request ids, error rendering and request metrics are
//! applied uniformly by [`respond`].

use std::future::Future;
use std::sync::atomic::Ordering;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::http::header::LOCATION;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{Instrument, info, info_span, warn};

use crate::AppState;
use crate::error::{ApiError, Result};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/authenticate", get(authenticate))
        .route("/auth_redirect", get(auth_redirect))
        .route("/now_playing", get(now_playing))
        .route("/skip_song", get(skip_song))
        .route("/search", get(search))
        .route("/add", post(add))
}

fn new_request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().as_simple())
}

/// Run a handler body inside a request span, render its error and record
/// request metrics.
async fn respond<F>(state: &AppState, route: &'static str, handler: F) -> Response
where
    F: Future<Output = Result<Response>>,
{
    let request_id = new_request_id();
    let started = Instant::now();
    state.counters.requests_total.fetch_add(1, Ordering::Relaxed);

    let span = info_span!("request", route, request_id = %request_id);
    let response = match handler.instrument(span).await {
        Ok(response) => response,
        Err(err) => {
            state.counters.errors_total.fetch_add(1, Ordering::Relaxed);
            let (status, kind) = err.classify();
            warn!(
                route,
                request_id = %request_id,
                status = status.as_u16(),
                kind,
                error = %err,
                "request failed"
            );
            err.into_response_with(&request_id)
        }
    };

    crate::metrics::record_request(
        route,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}

async fn authenticate(State(state): State<AppState>) -> Response {
    respond(&state, "authenticate", async {
        let url = state.api.manager().authorization_url().await?;
        info!("redirecting user to authorization page");
        Ok::<_, ApiError>((StatusCode::FOUND, [(LOCATION, url)]).into_response())
    })
    .await
}

#[derive(Debug, Deserialize)]
struct AuthRedirectParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

async fn auth_redirect(
    State(state): State<AppState>,
    Query(params): Query<AuthRedirectParams>,
) -> Response {
    respond(&state, "auth_redirect", async {
        if let (Some(reason), None) = (&params.error, &params.code) {
            return Err(spotify_auth::Error::AuthorizationDenied(format!(
                "authorization refused by user or provider: {reason}"
            ))
            .into());
        }
        state
            .api
            .manager()
            .begin_authorization_flow(params.code.as_deref(), params.state.as_deref())
            .await?;
        Ok::<_, ApiError>("Spotify Authenticated Successfully".into_response())
    })
    .await
}

async fn now_playing(State(state): State<AppState>) -> Response {
    respond(&state, "now_playing", async {
        Ok::<_, ApiError>(match state.api.now_playing().await? {
            Some(playing) => Json(playing).into_response(),
            None => StatusCode::NO_CONTENT.into_response(),
        })
    })
    .await
}

async fn skip_song(State(state): State<AppState>) -> Response {
    respond(&state, "skip_song", async {
        state.api.skip_song().await?;
        Ok::<_, ApiError>(Json(serde_json::json!({ "message": "Skipped Song" })).into_response())
    })
    .await
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
}

async fn search(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Response {
    respond(&state, "search", async {
        let query = params
            .q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ApiError::BadRequest("search query is required".into()))?;

        match state.api.search_and_queue(query).await? {
            Some(track) => Ok::<_, ApiError>(Json(track).into_response()),
            None => Err(ApiError::NotFound("no results found".into())),
        }
    })
    .await
}

#[derive(Debug, Deserialize)]
struct AddRequest {
    uri: Option<String>,
}

async fn add(
    State(state): State<AppState>,
    payload: std::result::Result<Json<AddRequest>, JsonRejection>,
) -> Response {
    respond(&state, "add", async {
        let uri = payload
            .as_ref()
            .ok()
            .and_then(|Json(body)| body.uri.as_deref())
            .map(str::trim)
            .filter(|uri| !uri.is_empty())
            .ok_or_else(|| {
                ApiError::BadRequest("track uri is required in the request body".into())
            })?;

        state.api.add_to_queue(uri).await?;
        let body = serde_json::json!({ "message": "Successfully added to queue" });
        Ok::<_, ApiError>(Json(body).into_response())
    })
    .await
}
