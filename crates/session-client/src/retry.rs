//! The single retry after a refresh

use std::sync::Arc;

use tracing::{debug, warn};

use crate::classify::{Classification, classify_response};
use crate::coordinator::{RefreshedToken, superseded};
use crate::error::{Error, Result};
use crate::pipeline::RequestPipeline;
use crate::request::{ApiRequest, ApiResponse};
use crate::session::SessionStore;
use crate::teardown::SessionTeardown;

/// Reissues a rejected request once with the token a refresh produced.
pub struct RetryExecutor {
    pipeline: Arc<RequestPipeline>,
    session: Arc<SessionStore>,
    teardown: Arc<SessionTeardown>,
}

impl RetryExecutor {
    pub fn new(
        pipeline: Arc<RequestPipeline>,
        session: Arc<SessionStore>,
        teardown: Arc<SessionTeardown>,
    ) -> Self {
        Self {
            pipeline,
            session,
            teardown,
        }
    }

    /// Send the retry copy of `request` with `token`.
    ///
    /// The token is attached directly, without a second session lookup. If
    /// the session moved on since the refresh, nothing is sent. A 401 on the
    /// retry is terminal, and a retry still on the wire when the session ends
    /// is abandoned.
    pub async fn retry(&self, request: &ApiRequest, token: RefreshedToken) -> Result<ApiResponse> {
        let mut generations = self.session.subscribe();
        if *generations.borrow_and_update() != token.generation {
            debug!("session changed after refresh, not retrying");
            return Err(self
                .session
                .termination_error("session ended before the retry was sent")
                .await);
        }

        let retry = request.for_retry();
        let send = self
            .pipeline
            .dispatch(&retry, Some(token.access_token), token.generation);
        let dispatched = tokio::select! {
            biased;
            _ = superseded(&mut generations, token.generation) => {
                debug!("session changed while the retry was in flight, abandoning it");
                return Err(self
                    .session
                    .termination_error("session ended while the retry was in flight")
                    .await);
            }
            dispatched = send => dispatched?,
        };

        match classify_response(&dispatched.response, &retry, false) {
            Classification::Success => {
                debug!(status = dispatched.response.status().as_u16(), "retry completed");
                Ok(dispatched.response)
            }
            Classification::Recoverable | Classification::Terminal => {
                let reason = "request rejected again after token refresh";
                warn!(reason);
                if self.teardown.expire(dispatched.generation, reason).await {
                    Err(Error::SessionExpired(reason.to_string()))
                } else {
                    Err(self.session.termination_error(reason).await)
                }
            }
        }
    }
}
