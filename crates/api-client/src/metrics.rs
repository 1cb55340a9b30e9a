//! Client-side counters
//!
//! Emitted through the `metrics` facade; the host application decides
//! whether and where to export them.
//!
//! - `api_client_requests_total` (counter): labels `method`, `status`
//! - `api_client_refresh_total` (counter): label `outcome`
//! - `api_client_sign_outs_total` (counter): label `reason`

/// Record a completed request. `status` is 0 when no response arrived.
pub fn record_request(method: &str, status: u16) {
    metrics::counter!(
        "api_client_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record the end of a refresh cycle (`success`, `failure` or `timeout`).
pub fn record_refresh(outcome: &'static str) {
    metrics::counter!("api_client_refresh_total", "outcome" => outcome).increment(1);
}

/// Record a forced sign-out.
pub fn record_sign_out(reason: &'static str) {
    metrics::counter!("api_client_sign_outs_total", "reason" => reason).increment(1);
}
