//! Credential attachment and dispatch

use std::sync::Arc;

use common::Secret;
use tracing::debug;

use crate::error::Result;
use crate::request::{ApiRequest, ApiResponse};
use crate::session::SessionStore;
use crate::transport::Transport;

/// Result of one dispatch attempt.
///
/// Carries the credential that was attached and the session generation it
/// was read under, so a 401 can be attributed to the right token and episode.
#[derive(Debug)]
pub struct Dispatched {
    pub response: ApiResponse,
    pub credential: Option<Secret<String>>,
    pub generation: u64,
}

/// Attaches the stored access token to a request and sends it.
pub struct RequestPipeline {
    session: Arc<SessionStore>,
    transport: Arc<dyn Transport>,
    auth_scheme: String,
}

impl RequestPipeline {
    pub fn new(
        session: Arc<SessionStore>,
        transport: Arc<dyn Transport>,
        auth_scheme: impl Into<String>,
    ) -> Self {
        Self {
            session,
            transport,
            auth_scheme: auth_scheme.into(),
        }
    }

    /// Send `request` with whatever access token the session holds.
    ///
    /// Reads the session exactly once. Without an access token the request
    /// goes out as the caller built it.
    pub async fn issue(&self, request: &ApiRequest) -> Result<Dispatched> {
        let (credential, generation) = self.session.credential().await;
        self.dispatch(request, credential, generation).await
    }

    /// Send `request` with an explicitly supplied token, skipping the session lookup.
    pub async fn dispatch(
        &self,
        request: &ApiRequest,
        credential: Option<Secret<String>>,
        generation: u64,
    ) -> Result<Dispatched> {
        let response = match &credential {
            Some(token) => {
                let mut outbound = request.clone();
                outbound.set_credential(&self.auth_scheme, token)?;
                self.transport.send(&outbound).await?
            }
            None => {
                debug!("no access token stored, dispatching without credentials");
                self.transport.send(request).await?
            }
        };

        Ok(Dispatched {
            response,
            credential,
            generation,
        })
    }
}
