//! Session teardown and the expiry signal
//!
//! Teardown clears the stored tokens and tells the host application that the
//! user has to sign in again. The signal is an event handed to an
//! `ExpiryHandler`; how the host navigates to its sign-in entry point is its
//! own business.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::session::SessionStore;

/// Emitted once per failed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryEvent {
    /// Why recovery was impossible
    pub reason: String,
    /// Where the host should send the user to re-authenticate
    pub redirect_to: String,
}

/// Receiver of expiry events.
pub trait ExpiryHandler: Send + Sync {
    fn on_expired(&self, event: &ExpiryEvent);
}

impl<F> ExpiryHandler for F
where
    F: Fn(&ExpiryEvent) + Send + Sync,
{
    fn on_expired(&self, event: &ExpiryEvent) {
        self(event)
    }
}

/// Handler that only logs. Used when the host registers nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogExpiryHandler;

impl ExpiryHandler for LogExpiryHandler {
    fn on_expired(&self, event: &ExpiryEvent) {
        warn!(
            reason = %event.reason,
            redirect_to = %event.redirect_to,
            "session expired, sign-in required"
        );
    }
}

/// Clears the session and emits at most one `ExpiryEvent` per episode.
pub struct SessionTeardown {
    session: Arc<SessionStore>,
    handler: Arc<dyn ExpiryHandler>,
    redirect_to: String,
}

impl SessionTeardown {
    pub fn new(
        session: Arc<SessionStore>,
        handler: Arc<dyn ExpiryHandler>,
        redirect_to: impl Into<String>,
    ) -> Self {
        Self {
            session,
            handler,
            redirect_to: redirect_to.into(),
        }
    }

    /// Tear down the session that `generation` belongs to.
    ///
    /// Returns true if this call performed the teardown and emitted the event.
    /// A stale generation, an already expired session and a signed-out session
    /// are all no-ops.
    pub async fn expire(&self, generation: u64, reason: &str) -> bool {
        if !self.session.expire(generation).await {
            debug!(generation, reason, "session already ended, skipping teardown");
            return false;
        }

        crate::metrics::record_expiry();
        warn!(generation, reason, "session torn down");
        self.handler.on_expired(&ExpiryEvent {
            reason: reason.to_string(),
            redirect_to: self.redirect_to.clone(),
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingHandler, open_session};
    use session_auth::{Session, TokenPair};

    #[tokio::test]
    async fn expire_clears_tokens_and_emits_once() {
        let session = open_session(Session::from(TokenPair::new("at_1", "rt_1"))).await;
        let handler = RecordingHandler::new();
        let teardown = SessionTeardown::new(session.clone(), handler.clone(), "/login");

        assert!(teardown.expire(0, "refresh rejected").await);
        assert!(!teardown.expire(0, "refresh rejected").await);
        assert!(!teardown.expire(1, "late request").await);

        assert!(session.access_token().await.is_none());
        assert_eq!(
            handler.events(),
            vec![ExpiryEvent {
                reason: "refresh rejected".into(),
                redirect_to: "/login".into(),
            }]
        );
    }

    #[tokio::test]
    async fn stale_generation_does_not_touch_new_session() {
        let session = open_session(Session::from(TokenPair::new("at_1", "rt_1"))).await;
        let handler = RecordingHandler::new();
        let teardown = SessionTeardown::new(session.clone(), handler.clone(), "/login");

        session.sign_in(TokenPair::new("at_2", "rt_2")).await.unwrap();

        assert!(!teardown.expire(0, "old session failed").await);
        assert_eq!(session.access_token().await.unwrap().expose(), "at_2");
        assert_eq!(handler.count(), 0);
    }

    #[tokio::test]
    async fn sign_out_suppresses_event() {
        let session = open_session(Session::from(TokenPair::new("at_1", "rt_1"))).await;
        let handler = RecordingHandler::new();
        let teardown = SessionTeardown::new(session.clone(), handler.clone(), "/login");

        session.sign_out().await.unwrap();
        let generation = session.generation().await;

        assert!(!teardown.expire(generation, "after sign-out").await);
        assert_eq!(handler.count(), 0);
    }

    #[tokio::test]
    async fn closures_are_handlers() {
        let session = open_session(Session::default()).await;
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler = move |event: &ExpiryEvent| {
            sink.lock().unwrap().push(event.redirect_to.clone());
        };
        let teardown = SessionTeardown::new(session, Arc::new(handler), "/signin");

        assert!(teardown.expire(0, "no refresh token").await);
        assert_eq!(*seen.lock().unwrap(), vec!["/signin".to_string()]);
    }
}
