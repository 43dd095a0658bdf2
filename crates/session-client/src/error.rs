//! Error types for session-aware requests

/// Errors surfaced to callers of `SessionClient::issue`.
///
/// Recoverable 401s never appear here: they are resolved by refresh-and-retry
/// and only surface as `SessionExpired` once recovery is impossible.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("session expired: {0}")]
    SessionExpired(String),

    #[error("session closed while the request was waiting on a token refresh or retry")]
    SessionClosed,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("response decode error: {0}")]
    Decode(String),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("session store error: {0}")]
    Store(String),
}

impl Error {
    /// Whether the caller must sign in again.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Error::SessionExpired(_))
    }
}

impl From<session_auth::Error> for Error {
    fn from(err: session_auth::Error) -> Self {
        Error::Store(err.to_string())
    }
}

/// Result alias for session-aware requests.
pub type Result<T> = std::result::Result<T, Error>;
