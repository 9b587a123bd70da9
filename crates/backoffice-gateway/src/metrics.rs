//! Gateway metrics
//!
//! Recorded through the `metrics` facade; the embedding application decides
//! whether and how to export them.
//!
//! - `gateway_requests_total` (counter): labels `method`, `status`
//! - `gateway_request_duration_seconds` (histogram): label `status`
//! - `gateway_token_refresh_total` (counter): label `outcome`
//! - `gateway_replays_total` (counter)

/// Status label for requests that never got an HTTP answer.
pub const STATUS_ERROR: &str = "error";

/// Record a completed logical request (including its replay, if any).
pub fn record_request(method: &str, status: &str, duration_secs: f64) {
    metrics::counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "status" => status.to_string())
        .record(duration_secs);
}

/// Record the outcome of one refresh call: `success`, `rejected`, `failed`
/// or `missing` (no refresh token, no call made).
pub fn record_refresh(outcome: &'static str) {
    metrics::counter!("gateway_token_refresh_total", "outcome" => outcome).increment(1);
}

pub fn record_replay() {
    metrics::counter!("gateway_replays_total").increment(1);
}
