//! Session-aware HTTP request layer
//!
//! Attaches the stored access token to every outbound call and recovers from
//! authentication failures without the caller noticing. The pieces, leaf-first:
//!
//! - `SessionStore` holds the token pair and the session generation
//! - `RequestPipeline` attaches the access token and dispatches via a `Transport`
//! - `classify` routes a response to success, refresh-and-retry, or failure
//! - `RefreshCoordinator` runs at most one token exchange at a time and shares
//!   its result with every request that needed it
//! - `RetryExecutor` reissues a rejected request once with the fresh token
//! - `SessionTeardown` clears the session and emits one expiry event per episode
//!
//! Request lifecycle:
//! 1. `SessionClient::issue()` dispatches with the current access token
//! 2. Any non-401 response is returned to the caller untouched
//! 3. A 401 with a refresh token available joins or starts a refresh
//! 4. The request is retried once with the refreshed token
//! 5. A second 401, a failed refresh, or a missing refresh token tears the
//!    session down and surfaces `Error::SessionExpired`

pub mod classify;
pub mod client;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod request;
pub mod retry;
pub mod session;
pub mod teardown;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use classify::{Classification, classify, classify_response};
pub use client::{ClientConfig, SessionClient};
pub use coordinator::{RefreshCoordinator, RefreshFailure, RefreshOutcome, RefreshedToken};
pub use error::{Error, Result};
pub use pipeline::{Dispatched, RequestPipeline};
pub use request::{ApiRequest, ApiResponse, MAX_RETRIES};
pub use retry::RetryExecutor;
pub use session::{SessionSnapshot, SessionStatus, SessionStore};
pub use teardown::{ExpiryEvent, ExpiryHandler, LogExpiryHandler, SessionTeardown};
pub use transport::{HttpTransport, Transport};
