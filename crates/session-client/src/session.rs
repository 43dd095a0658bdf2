//! In-memory session state over a durable `TokenStore`
//!
//! The store is the only place tokens are mutated. Every mutation that starts
//! or ends a session bumps the generation and publishes it on a `watch`
//! channel, so work that belongs to an older session can notice and stop.
//! Refresh does not bump the generation: a rotated pair continues the same
//! session.

use std::sync::Arc;

use common::Secret;
use session_auth::{Session, TokenPair, TokenStore};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Tokens may be used; a terminal failure will tear the session down
    Active,
    /// Torn down after an unrecoverable authentication failure
    Expired,
    /// Cleared by an explicit sign-out
    SignedOut,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Expired => "expired",
            SessionStatus::SignedOut => "signed_out",
        }
    }
}

/// Point-in-time copy of the session, read under one lock.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub access_token: Option<Secret<String>>,
    pub refresh_token: Option<Secret<String>>,
    pub generation: u64,
    pub status: SessionStatus,
}

struct SessionState {
    session: Session,
    generation: u64,
    status: SessionStatus,
}

/// Owner of the current token pair.
pub struct SessionStore {
    backend: Arc<dyn TokenStore>,
    state: Mutex<SessionState>,
    generations: watch::Sender<u64>,
}

impl SessionStore {
    /// Load the persisted session. An empty backend yields an empty session.
    pub async fn open(backend: Arc<dyn TokenStore>) -> Result<Self> {
        let session = backend.load().await?;
        debug!(
            has_access_token = session.access_token.is_some(),
            has_refresh_token = session.refresh_token.is_some(),
            "session loaded"
        );
        let (generations, _) = watch::channel(0);
        Ok(Self {
            backend,
            state: Mutex::new(SessionState {
                session,
                generation: 0,
                status: SessionStatus::Active,
            }),
            generations,
        })
    }

    /// The access token and the generation it belongs to.
    pub async fn credential(&self) -> (Option<Secret<String>>, u64) {
        let state = self.state.lock().await;
        (state.session.access_token.clone(), state.generation)
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock().await;
        SessionSnapshot {
            access_token: state.session.access_token.clone(),
            refresh_token: state.session.refresh_token.clone(),
            generation: state.generation,
            status: state.status,
        }
    }

    pub async fn access_token(&self) -> Option<Secret<String>> {
        self.state.lock().await.session.access_token.clone()
    }

    pub async fn has_refresh_token(&self) -> bool {
        self.state.lock().await.session.refresh_token.is_some()
    }

    pub async fn generation(&self) -> u64 {
        self.state.lock().await.generation
    }

    pub async fn status(&self) -> SessionStatus {
        self.state.lock().await.status
    }

    /// Receiver that observes every generation change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generations.subscribe()
    }

    /// Start a new session with `pair`.
    ///
    /// The pair is persisted before it becomes visible, so a store failure
    /// leaves the previous session untouched. Returns the new generation.
    pub async fn sign_in(&self, pair: TokenPair) -> Result<u64> {
        let mut state = self.state.lock().await;
        let session = Session::from(pair);
        self.backend.save(&session).await?;

        state.session = session;
        state.status = SessionStatus::Active;
        state.generation += 1;
        self.generations.send_replace(state.generation);
        info!(generation = state.generation, "signed in");
        Ok(state.generation)
    }

    /// Install a refreshed pair if `generation` is still the live session.
    ///
    /// Returns false when the session was signed out, torn down or replaced
    /// while the exchange was in flight. A persistence failure is logged and
    /// the in-memory pair is still updated.
    pub async fn replace_if_current(&self, pair: TokenPair, generation: u64) -> bool {
        let mut state = self.state.lock().await;
        if state.generation != generation || state.status != SessionStatus::Active {
            debug!(
                generation,
                current = state.generation,
                status = state.status.as_str(),
                "discarding refreshed pair for a finished session"
            );
            return false;
        }

        let session = Session::from(pair);
        if let Err(e) = self.backend.save(&session).await {
            warn!(error = %e, "failed to persist refreshed tokens, keeping them in memory");
        }
        state.session = session;
        true
    }

    /// Tear down the session for `generation`.
    ///
    /// Only the first call for a live generation does anything; it clears the
    /// tokens, marks the session expired and returns true. Later calls, and
    /// calls for an older generation, return false.
    pub async fn expire(&self, generation: u64) -> bool {
        let mut state = self.state.lock().await;
        if state.generation != generation || state.status != SessionStatus::Active {
            return false;
        }

        state.session = Session::default();
        state.status = SessionStatus::Expired;
        state.generation += 1;
        self.generations.send_replace(state.generation);

        if let Err(e) = self.backend.clear().await {
            warn!(error = %e, "failed to clear persisted tokens after expiry");
        }
        true
    }

    /// Clear the session on request. Never signals expiry.
    ///
    /// The in-memory session is cleared even when the backend fails; the
    /// backend error is still returned.
    pub async fn sign_out(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.session = Session::default();
        state.status = SessionStatus::SignedOut;
        state.generation += 1;
        self.generations.send_replace(state.generation);
        info!(generation = state.generation, "signed out");

        self.backend.clear().await.map_err(Error::from)
    }

    /// The error for a request whose session ended underneath it.
    pub async fn termination_error(&self, reason: &str) -> Error {
        match self.status().await {
            SessionStatus::Expired => Error::SessionExpired(reason.to_string()),
            SessionStatus::Active | SessionStatus::SignedOut => Error::SessionClosed,
        }
    }
}
