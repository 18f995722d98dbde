//! Authenticated resource calls
//!
//! Every call obtains a fresh token first. If the resource API still answers
//! 401 (token revoked or clock skew), the token is refreshed once, bypassing
//! the recorded expiry, and the call is retried once. A second 401 is
//! surfaced as [`CallError::Unauthorized`].

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{CallError, Result};
use crate::manager::TokenManager;

/// Attempts per call: the original plus one retry after a forced refresh.
pub const MAX_ATTEMPTS: u32 = 2;

/// A request to the resource API, without credentials.
///
/// Any `Authorization` header set here is replaced by the bearer token.
#[derive(Debug, Clone)]
pub struct OutboundCall {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl OutboundCall {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: Url) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: Url) -> Self {
        Self::new(Method::PUT, url)
    }

    /// Attach a JSON body and the matching content type.
    pub fn with_json(mut self, value: &serde_json::Value) -> Self {
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(Bytes::from(value.to_string()));
        self
    }
}

/// Status and body of a 2xx upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl UpstreamResponse {
    /// 204, or a body that is empty or only whitespace.
    pub fn is_empty(&self) -> bool {
        self.status == StatusCode::NO_CONTENT || self.body.iter().all(u8::is_ascii_whitespace)
    }
}

/// Decoded result of a successful call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload<T> {
    Content(T),
    Empty,
}

/// Issues resource calls on behalf of the authenticated user.
pub struct AuthenticatedClient {
    http: reqwest::Client,
    manager: Arc<TokenManager>,
    timeout: Duration,
}

impl AuthenticatedClient {
    pub fn new(http: reqwest::Client, manager: Arc<TokenManager>, timeout: Duration) -> Self {
        Self {
            http,
            manager,
            timeout,
        }
    }

    pub fn manager(&self) -> &Arc<TokenManager> {
        &self.manager
    }

    /// Perform `call` with a valid bearer token.
    ///
    /// Non-2xx other than 401 is returned as [`CallError::Upstream`] without
    /// any refresh.
    pub async fn call(&self, call: &OutboundCall) -> Result<UpstreamResponse> {
        let mut token = self.manager.ensure_fresh().await?;

        for attempt in 0..MAX_ATTEMPTS {
            let response = self.send(call, &token).await?;
            if response.status != StatusCode::UNAUTHORIZED {
                return classify(response);
            }
            if attempt + 1 == MAX_ATTEMPTS {
                break;
            }
            warn!(
                attempt,
                url = %call.url,
                "upstream rejected access token, forcing refresh"
            );
            token = self.manager.force_refresh(&token).await?;
        }

        warn!(url = %call.url, "upstream rejected refreshed access token");
        Err(CallError::Unauthorized)
    }

    /// Like [`Self::call`], decoding a JSON body as `T`.
    ///
    /// An empty success is `Payload::Empty`, not a decode failure.
    pub async fn call_json<T: DeserializeOwned>(&self, call: &OutboundCall) -> Result<Payload<T>> {
        let response = self.call(call).await?;
        if response.is_empty() {
            return Ok(Payload::Empty);
        }
        serde_json::from_slice(&response.body)
            .map(Payload::Content)
            .map_err(|e| CallError::Decode(e.to_string()))
    }

    async fn send(&self, call: &OutboundCall, token: &str) -> Result<UpstreamResponse> {
        let mut headers = call.headers.clone();
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| CallError::Decode(format!("access token is not a valid header: {e}")))?;
        headers.insert(AUTHORIZATION, bearer);

        let mut request = self
            .http
            .request(call.method.clone(), call.url.clone())
            .headers(headers)
            .timeout(self.timeout);
        if let Some(body) = &call.body {
            request = request.body(body.clone());
        }

        let response = request.send().await.map_err(CallError::network)?;
        let status = response.status();
        let body = response.bytes().await.map_err(CallError::network)?;

        debug!(method = %call.method, url = %call.url, status = status.as_u16(), "upstream call");
        metrics::counter!(
            "spotify_upstream_calls_total",
            "status" => status.as_u16().to_string(),
        )
        .increment(1);

        Ok(UpstreamResponse { status, body })
    }
}

fn classify(response: UpstreamResponse) -> Result<UpstreamResponse> {
    if response.status.is_success() {
        Ok(response)
    } else {
        Err(CallError::Upstream {
            status: response.status.as_u16(),
            body: String::from_utf8_lossy(&response.body).into_owned(),
        })
    }
}
