//! Session metrics
//!
//! Counters emitted through the `metrics` facade. They are no-ops until the
//! host installs a recorder.
//!
//! - `session_requests_total` (counter): label `outcome`
//! - `session_refresh_total` (counter): label `outcome`
//! - `session_expired_total` (counter)

use crate::error::Error;
use crate::request::ApiResponse;

/// Record a finished logical request (including its retry, if any).
pub fn record_request(outcome: &'static str) {
    ::metrics::counter!("session_requests_total", "outcome" => outcome).increment(1);
}

/// Record the end of a refresh episode.
pub fn record_refresh(outcome: &'static str) {
    ::metrics::counter!("session_refresh_total", "outcome" => outcome).increment(1);
}

/// Record a session teardown.
pub fn record_expiry() {
    ::metrics::counter!("session_expired_total").increment(1);
}

/// Outcome label for a request result.
pub fn request_outcome(result: &Result<ApiResponse, Error>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(Error::Network(_)) => "network_error",
        Err(Error::Timeout(_)) => "timeout",
        Err(Error::SessionExpired(_)) => "session_expired",
        Err(Error::SessionClosed) => "session_closed",
        Err(_) => "error",
    }
}
