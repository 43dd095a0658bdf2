//! Test doubles shared by the unit tests in this crate.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap};
use session_auth::{MemoryTokenStore, Session, TokenExchange, TokenPair};
use tokio::sync::Notify;

use crate::error::{Error, Result};
use crate::request::{ApiRequest, ApiResponse};
use crate::session::SessionStore;
use crate::teardown::{ExpiryEvent, ExpiryHandler};
use crate::transport::Transport;

/// Open a `SessionStore` over an in-memory backend.
pub(crate) async fn open_session(session: Session) -> Arc<SessionStore> {
    Arc::new(
        SessionStore::open(Arc::new(MemoryTokenStore::with_session(session)))
            .await
            .unwrap(),
    )
}

enum Script {
    /// 200 for any accepted token, 401 otherwise
    Accepting(Vec<String>),
    /// The same status for every request
    Fixed(StatusCode),
    /// Connection failure for every request
    Unreachable,
    /// Timeout for every request
    TimingOut,
}

/// Transport that answers from a script and records every Authorization header.
pub(crate) struct ScriptedTransport {
    script: Script,
    gate: Option<Arc<Notify>>,
    seen: Mutex<Vec<Option<String>>>,
}

impl ScriptedTransport {
    fn with_script(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            gate: None,
            seen: Mutex::new(Vec::new()),
        })
    }

    /// 200 for `tokens`, held on the wire until `gate` is notified.
    pub(crate) fn accepting_gated(tokens: &[&str], gate: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            script: Script::Accepting(tokens.iter().map(|t| t.to_string()).collect()),
            gate: Some(gate),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn accepting(tokens: &[&str]) -> Arc<Self> {
        Self::with_script(Script::Accepting(
            tokens.iter().map(|t| t.to_string()).collect(),
        ))
    }

    pub(crate) fn responding(status: StatusCode) -> Arc<Self> {
        Self::with_script(Script::Fixed(status))
    }

    pub(crate) fn unreachable() -> Arc<Self> {
        Self::with_script(Script::Unreachable)
    }

    pub(crate) fn timing_out() -> Arc<Self> {
        Self::with_script(Script::TimingOut)
    }

    /// Authorization header of every request sent, in order.
    pub(crate) fn authorizations(&self) -> Vec<Option<String>> {
        self.seen.lock().unwrap().clone()
    }

    pub(crate) fn requests(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    fn answer(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let authorization = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.seen.lock().unwrap().push(authorization.clone());

        let status = match &self.script {
            Script::Unreachable => {
                return Err(Error::Network("connection refused".into()));
            }
            Script::TimingOut => {
                return Err(Error::Timeout("no response within 30s".into()));
            }
            Script::Fixed(status) => *status,
            Script::Accepting(tokens) => {
                let accepted = authorization.as_deref().is_some_and(|value| {
                    value
                        .split_once(' ')
                        .is_some_and(|(_, token)| tokens.iter().any(|t| t == token))
                });
                if accepted {
                    StatusCode::OK
                } else {
                    StatusCode::UNAUTHORIZED
                }
            }
        };

        let body = if status == StatusCode::UNAUTHORIZED {
            serde_json::json!({"detail": "Could not validate credentials"})
        } else {
            serde_json::json!({"path": request.path()})
        };
        Ok(ApiResponse::new(status, HeaderMap::new(), body.to_string()))
    }
}

impl Transport for ScriptedTransport {
    fn send<'a>(
        &'a self,
        request: &'a ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse>> + Send + 'a>> {
        Box::pin(async move {
            // Let concurrent requests interleave like real network calls
            tokio::task::yield_now().await;
            let answer = self.answer(request);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            answer
        })
    }
}

#[derive(Clone, Copy)]
enum ExchangeMode {
    Rotating,
    Rejecting,
    Hanging,
}

/// Token endpoint double. Each successful call `n` returns `at_n` / `rt_n`.
pub(crate) struct FakeExchange {
    mode: ExchangeMode,
    gate: Option<Arc<Notify>>,
    calls: AtomicUsize,
    presented: Mutex<Vec<String>>,
}

impl FakeExchange {
    fn with_mode(mode: ExchangeMode) -> Self {
        Self {
            mode,
            gate: None,
            calls: AtomicUsize::new(0),
            presented: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn rotating() -> Self {
        Self::with_mode(ExchangeMode::Rotating)
    }

    pub(crate) fn rejecting() -> Self {
        Self::with_mode(ExchangeMode::Rejecting)
    }

    /// Never answers.
    pub(crate) fn hanging() -> Self {
        Self::with_mode(ExchangeMode::Hanging)
    }

    /// Hold every answer until `gate` is notified.
    pub(crate) fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Refresh tokens presented, in call order.
    pub(crate) fn presented(&self) -> Vec<String> {
        self.presented.lock().unwrap().clone()
    }
}

impl TokenExchange for FakeExchange {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = session_auth::Result<TokenPair>> + Send + 'a>> {
        Box::pin(async move {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.presented.lock().unwrap().push(refresh_token.to_string());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            match self.mode {
                ExchangeMode::Rotating => {
                    Ok(TokenPair::new(format!("at_{call}"), format!("rt_{call}")))
                }
                ExchangeMode::Rejecting => Err(session_auth::Error::InvalidCredentials(
                    "refresh rejected (401 Unauthorized): Invalid refresh token".into(),
                )),
                ExchangeMode::Hanging => std::future::pending().await,
            }
        })
    }
}

/// Expiry handler that records every event.
#[derive(Default)]
pub(crate) struct RecordingHandler {
    events: Mutex<Vec<ExpiryEvent>>,
}

impl RecordingHandler {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn events(&self) -> Vec<ExpiryEvent> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

impl ExpiryHandler for RecordingHandler {
    fn on_expired(&self, event: &ExpiryEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
