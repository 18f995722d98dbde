//! HTTP error responses for the API routes

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use spotify_session::CallError;
use thiserror::Error;

/// Failures a route can return.
///
/// Every variant maps to a status and a stable `error.type` code so clients
/// can tell "authorize again" apart from "try again later".
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] spotify_auth::Error),

    #[error(transparent)]
    Call(#[from] CallError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

/// Result alias for route handlers
pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    /// HTTP status and `error.type` code.
    pub fn classify(&self) -> (StatusCode, &'static str) {
        use spotify_auth::Error as Auth;

        match self {
            ApiError::Auth(Auth::NotAuthenticated) => {
                (StatusCode::UNAUTHORIZED, "not_authenticated")
            }
            ApiError::Auth(Auth::AuthorizationDenied(_)) => {
                (StatusCode::BAD_REQUEST, "authorization_denied")
            }
            ApiError::Auth(Auth::Network(_)) => (StatusCode::BAD_GATEWAY, "network_error"),
            ApiError::Auth(Auth::Protocol(_)) => (StatusCode::BAD_GATEWAY, "protocol_error"),
            ApiError::Auth(e) if e.requires_reauthentication() => {
                (StatusCode::UNAUTHORIZED, "reauthentication_required")
            }
            ApiError::Auth(e) if e.is_retryable() => (StatusCode::BAD_GATEWAY, "network_error"),
            ApiError::Auth(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),

            ApiError::Call(CallError::Unauthenticated) => {
                (StatusCode::UNAUTHORIZED, "not_authenticated")
            }
            ApiError::Call(e) if e.requires_reauthentication() => {
                (StatusCode::UNAUTHORIZED, "reauthentication_required")
            }
            ApiError::Call(CallError::Network {
                timed_out: true, ..
            }) => (StatusCode::GATEWAY_TIMEOUT, "upstream_timeout"),
            ApiError::Call(CallError::Network { .. }) => {
                (StatusCode::BAD_GATEWAY, "network_error")
            }
            ApiError::Call(CallError::RefreshFailed(e)) if e.is_retryable() => {
                (StatusCode::BAD_GATEWAY, "network_error")
            }
            ApiError::Call(CallError::Upstream { status, .. }) => (
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
                "upstream_error",
            ),
            ApiError::Call(_) => (StatusCode::BAD_GATEWAY, "protocol_error"),

            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }

    /// Render as `{"error": {"type", "message", "request_id"}}`.
    pub fn into_response_with(self, request_id: &str) -> Response {
        let (status, kind) = self.classify();
        let message = match &self {
            ApiError::Call(CallError::Upstream { body, .. }) if !body.is_empty() => body.clone(),
            other => other.to_string(),
        };
        error_response(status, kind, &message, request_id)
    }
}

pub fn error_response(status: StatusCode, kind: &str, message: &str, request_id: &str) -> Response {
    let body = serde_json::json!({
        "error": {
            "type": kind,
            "message": message,
            "request_id": request_id,
        }
    });
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use spotify_auth::Error as Auth;

    fn classify(err: impl Into<ApiError>) -> (StatusCode, &'static str) {
        err.into().classify()
    }

    #[test]
    fn auth_errors_map_to_stable_codes() {
        assert_eq!(
            classify(Auth::NotAuthenticated),
            (StatusCode::UNAUTHORIZED, "not_authenticated")
        );
        assert_eq!(
            classify(Auth::AuthorizationDenied("missing state".into())),
            (StatusCode::BAD_REQUEST, "authorization_denied")
        );
        assert_eq!(
            classify(Auth::GrantRejected("invalid_grant".into())),
            (StatusCode::UNAUTHORIZED, "reauthentication_required")
        );
        assert_eq!(
            classify(Auth::Network("reset".into())),
            (StatusCode::BAD_GATEWAY, "network_error")
        );
        assert_eq!(
            classify(Auth::Protocol("not json".into())),
            (StatusCode::BAD_GATEWAY, "protocol_error")
        );
    }

    #[test]
    fn call_errors_map_to_stable_codes() {
        assert_eq!(
            classify(CallError::Unauthenticated),
            (StatusCode::UNAUTHORIZED, "not_authenticated")
        );
        assert_eq!(
            classify(CallError::Unauthorized),
            (StatusCode::UNAUTHORIZED, "reauthentication_required")
        );
        assert_eq!(
            classify(CallError::RefreshFailed(Auth::GrantRejected("x".into()))),
            (StatusCode::UNAUTHORIZED, "reauthentication_required")
        );
        assert_eq!(
            classify(CallError::RefreshFailed(Auth::Network("x".into()))),
            (StatusCode::BAD_GATEWAY, "network_error")
        );
        assert_eq!(
            classify(CallError::Network {
                message: "timed out".into(),
                timed_out: true
            }),
            (StatusCode::GATEWAY_TIMEOUT, "upstream_timeout")
        );
        assert_eq!(
            classify(CallError::Network {
                message: "refused".into(),
                timed_out: false
            }),
            (StatusCode::BAD_GATEWAY, "network_error")
        );
        assert_eq!(
            classify(CallError::Upstream {
                status: 404,
                body: String::new()
            }),
            (StatusCode::NOT_FOUND, "upstream_error")
        );
        assert_eq!(
            classify(CallError::Decode("expected value".into())),
            (StatusCode::BAD_GATEWAY, "protocol_error")
        );
    }

    #[tokio::test]
    async fn response_body_carries_type_message_and_request_id() {
        let err = ApiError::Call(CallError::Upstream {
            status: 403,
            body: "Player command failed: Premium required".into(),
        });
        let response = err.into_response_with("req_abc");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["type"], "upstream_error");
        assert_eq!(
            json["error"]["message"],
            "Player command failed: Premium required"
        );
        assert_eq!(json["error"]["request_id"], "req_abc");
    }
}
