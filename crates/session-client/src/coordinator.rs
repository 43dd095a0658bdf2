//! Single-flight token refresh
//!
//! The backend rotates the refresh token on every exchange, so two concurrent
//! exchanges with the same refresh token would invalidate each other and lock
//! the user out. `RefreshCoordinator` guarantees that at most one exchange is
//! in flight and that every request which needed it receives the same result.
//!
//! A refresh episode runs in a spawned task. Callers attach to it through a
//! shared future, so a caller that gives up (timeout, cancellation) does not
//! abort the exchange, and a rotated pair is always written back to the store.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use common::Secret;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use session_auth::TokenExchange;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::session::{SessionStatus, SessionStore};
use crate::teardown::SessionTeardown;

/// Why a refresh episode did not produce a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshFailure {
    /// The token endpoint refused the refresh token or failed
    Rejected(String),
    /// The exchange did not finish within the configured timeout
    Timeout,
    /// The session ended or was replaced while the exchange ran
    Superseded,
    /// The refresh task died before producing a result
    Aborted(String),
}

impl fmt::Display for RefreshFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshFailure::Rejected(msg) => write!(f, "refresh rejected: {msg}"),
            RefreshFailure::Timeout => write!(f, "refresh timed out"),
            RefreshFailure::Superseded => write!(f, "session ended during refresh"),
            RefreshFailure::Aborted(msg) => write!(f, "refresh aborted: {msg}"),
        }
    }
}

/// Result of one refresh episode, cloned to every waiter.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    Refreshed(Secret<String>),
    Failed(RefreshFailure),
}

impl RefreshOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RefreshOutcome::Refreshed(_) => "refreshed",
            RefreshOutcome::Failed(RefreshFailure::Rejected(_)) => "rejected",
            RefreshOutcome::Failed(RefreshFailure::Timeout) => "timeout",
            RefreshOutcome::Failed(RefreshFailure::Superseded) => "superseded",
            RefreshOutcome::Failed(RefreshFailure::Aborted(_)) => "aborted",
        }
    }
}

/// Access token to retry with, and the session generation it belongs to.
#[derive(Debug, Clone)]
pub struct RefreshedToken {
    pub access_token: Secret<String>,
    pub generation: u64,
}

struct Flight {
    episode: u64,
    generation: u64,
    outcome: Shared<BoxFuture<'static, RefreshOutcome>>,
}

/// Owns the single pending-refresh slot.
pub struct RefreshCoordinator {
    session: Arc<SessionStore>,
    exchange: Arc<dyn TokenExchange>,
    teardown: Arc<SessionTeardown>,
    timeout: Duration,
    pending: Arc<Mutex<Option<Flight>>>,
    episodes: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(
        session: Arc<SessionStore>,
        exchange: Arc<dyn TokenExchange>,
        teardown: Arc<SessionTeardown>,
        timeout: Duration,
    ) -> Self {
        Self {
            session,
            exchange,
            teardown,
            timeout,
            pending: Arc::new(Mutex::new(None)),
            episodes: AtomicU64::new(0),
        }
    }

    /// Whether an exchange is currently in flight.
    pub async fn is_refreshing(&self) -> bool {
        self.pending.lock().await.is_some()
    }

    /// Obtain a fresh access token after `stale` was rejected.
    ///
    /// `generation` is the session generation the rejected request was sent
    /// under. Joins the pending exchange if there is one. Without one, a
    /// stored token that already differs from `stale` is returned as is;
    /// otherwise a new exchange starts. Failure tears the session down and
    /// returns `SessionExpired`; a sign-out while waiting returns
    /// `SessionClosed`.
    pub async fn refresh(
        &self,
        stale: Option<&Secret<String>>,
        generation: u64,
    ) -> Result<RefreshedToken> {
        // Lock order: pending slot, then session
        let (outcome, flight_generation) = {
            let mut slot = self.pending.lock().await;
            let joined = slot
                .as_ref()
                .map(|flight| (flight.episode, flight.outcome.clone(), flight.generation));
            match joined {
                Some((episode, outcome, flight_generation)) => {
                    debug!(episode, "joining pending refresh");
                    (outcome, flight_generation)
                }
                None => {
                    let snapshot = self.session.snapshot().await;
                    if snapshot.status != SessionStatus::Active {
                        return Err(self
                            .session
                            .termination_error("session ended before refresh")
                            .await);
                    }

                    if let Some(current) = snapshot.access_token {
                        if snapshot.generation != generation || stale != Some(&current) {
                            debug!("access token already rotated, skipping exchange");
                            return Ok(RefreshedToken {
                                access_token: current,
                                generation: snapshot.generation,
                            });
                        }
                    }

                    let Some(refresh_token) = snapshot.refresh_token else {
                        drop(slot);
                        let reason = "no refresh token stored";
                        self.teardown.expire(snapshot.generation, reason).await;
                        return Err(Error::SessionExpired(reason.to_string()));
                    };

                    let episode = self.episodes.fetch_add(1, Ordering::Relaxed) + 1;
                    info!(episode, generation = snapshot.generation, "starting token refresh");
                    let outcome = self.start_flight(episode, snapshot.generation, refresh_token);
                    *slot = Some(Flight {
                        episode,
                        generation: snapshot.generation,
                        outcome: outcome.clone(),
                    });
                    (outcome, snapshot.generation)
                }
            }
        };

        let mut generations = self.session.subscribe();
        let outcome = tokio::select! {
            biased;
            outcome = outcome => outcome,
            _ = superseded(&mut generations, flight_generation) => {
                RefreshOutcome::Failed(RefreshFailure::Superseded)
            }
        };

        match outcome {
            RefreshOutcome::Refreshed(access_token) => Ok(RefreshedToken {
                access_token,
                generation: flight_generation,
            }),
            RefreshOutcome::Failed(RefreshFailure::Superseded) => Err(self
                .session
                .termination_error("session ended during token refresh")
                .await),
            RefreshOutcome::Failed(failure) => Err(Error::SessionExpired(failure.to_string())),
        }
    }

    /// Spawn the exchange for one episode and return its shared outcome.
    fn start_flight(
        &self,
        episode: u64,
        generation: u64,
        refresh_token: Secret<String>,
    ) -> Shared<BoxFuture<'static, RefreshOutcome>> {
        let session = self.session.clone();
        let exchange = self.exchange.clone();
        let teardown = self.teardown.clone();
        let pending = self.pending.clone();
        let timeout = self.timeout;

        let task = tokio::spawn(async move {
            let outcome =
                match tokio::time::timeout(timeout, exchange.refresh(refresh_token.expose_str()))
                    .await
                {
                    Ok(Ok(pair)) => {
                        let access_token = pair.access_token.clone();
                        if session.replace_if_current(pair, generation).await {
                            RefreshOutcome::Refreshed(access_token)
                        } else {
                            RefreshOutcome::Failed(RefreshFailure::Superseded)
                        }
                    }
                    Ok(Err(e)) => RefreshOutcome::Failed(RefreshFailure::Rejected(e.to_string())),
                    Err(_) => RefreshOutcome::Failed(RefreshFailure::Timeout),
                };

            match &outcome {
                RefreshOutcome::Refreshed(_) => info!(episode, "token refresh succeeded"),
                RefreshOutcome::Failed(RefreshFailure::Superseded) => {
                    debug!(episode, "session ended during refresh, result discarded")
                }
                RefreshOutcome::Failed(failure) => {
                    warn!(episode, error = %failure, "token refresh failed");
                    // Tear down before freeing the slot so no second exchange
                    // can start for the failed session
                    teardown.expire(generation, &failure.to_string()).await;
                }
            }
            crate::metrics::record_refresh(outcome.label());

            clear_slot(&pending, episode).await;
            outcome
        });

        let pending = self.pending.clone();
        let teardown = self.teardown.clone();
        async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let failure = RefreshFailure::Aborted(e.to_string());
                    warn!(episode, error = %failure, "refresh task did not complete");
                    teardown.expire(generation, &failure.to_string()).await;
                    clear_slot(&pending, episode).await;
                    RefreshOutcome::Failed(failure)
                }
            }
        }
        .boxed()
        .shared()
    }
}

async fn clear_slot(pending: &Mutex<Option<Flight>>, episode: u64) {
    let mut slot = pending.lock().await;
    if slot.as_ref().is_some_and(|flight| flight.episode == episode) {
        *slot = None;
    }
}

/// Resolves once the session generation moves past `generation`.
pub(crate) async fn superseded(generations: &mut watch::Receiver<u64>, generation: u64) {
    loop {
        if *generations.borrow_and_update() != generation {
            return;
        }
        if generations.changed().await.is_err() {
            return;
        }
    }
}
