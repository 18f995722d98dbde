//! Prometheus metrics exposition
//!
//! - `gateway_requests_total` (counter): labels `route`, `status`
//! - `gateway_request_duration_seconds` (histogram): label `route`
//! - `spotify_token_refresh_total` (counter): labels `reason`, `outcome`
//! - `spotify_upstream_calls_total` (counter): label `status`
//!
//! The last two are emitted by `spotify-session`; this module only installs
//! the recorder that collects them.

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

const DURATION_METRIC: &str = "gateway_request_duration_seconds";

/// 5ms up to 30s, covering the configurable upstream timeout.
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(DURATION_METRIC.to_string()), DURATION_BUCKETS)
}

/// Install the global Prometheus recorder and return a handle for `/metrics`.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

/// Record a completed API request.
pub fn record_request(route: &'static str, status: u16, duration_secs: f64) {
    metrics::counter!(
        "gateway_requests_total",
        "route" => route,
        "status" => status.to_string(),
    )
    .increment(1);
    metrics::histogram!(DURATION_METRIC, "route" => route).record(duration_secs);
}

#[cfg(test)]
pub(crate) fn isolated_recorder() -> (
    metrics_exporter_prometheus::PrometheusRecorder,
    PrometheusHandle,
) {
    // build_recorder() avoids the one-global-recorder-per-process limit
    let recorder = builder()
        .expect("failed to set histogram buckets")
        .build_recorder();
    let handle = recorder.handle();
    (recorder, handle)
}
