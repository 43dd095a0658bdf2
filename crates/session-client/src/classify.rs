//! Response classification
//!
//! The single decision point between passing a response through, refreshing
//! and retrying, and giving up on the session. Only 401 is treated as an
//! authentication failure; 403 is an authorization answer from a valid
//! session and passes through like any other status.

use reqwest::StatusCode;

use crate::request::{ApiRequest, ApiResponse, MAX_RETRIES};

/// What to do with a completed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Any non-401: hand the response to the caller unchanged
    Success,
    /// 401 on a first attempt with a refresh token stored: refresh and retry
    Recoverable,
    /// 401 after the retry, or with nothing to refresh with: tear down
    Terminal,
}

impl Classification {
    /// Label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Classification::Success => "success",
            Classification::Recoverable => "unauthorized_recoverable",
            Classification::Terminal => "unauthorized_terminal",
        }
    }
}

/// Classify by status, attempt number and refresh-token availability.
pub fn classify(status: StatusCode, retry_count: u8, refresh_available: bool) -> Classification {
    if status != StatusCode::UNAUTHORIZED {
        return Classification::Success;
    }
    if retry_count < MAX_RETRIES && refresh_available {
        Classification::Recoverable
    } else {
        Classification::Terminal
    }
}

/// Classify a response to the given request attempt.
pub fn classify_response(
    response: &ApiResponse,
    request: &ApiRequest,
    refresh_available: bool,
) -> Classification {
    classify(response.status(), request.retry_count(), refresh_available)
}
