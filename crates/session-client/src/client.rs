//! `SessionClient`: the request layer callers use
//!
//! Wires the store, pipeline, coordinator, retry executor and teardown
//! together and runs each logical request through its lifecycle.

use std::sync::Arc;
use std::time::Duration;

use common::Secret;
use session_auth::{
    DEFAULT_API_PREFIX, DEFAULT_AUTH_SCHEME, DEFAULT_BASE_URL, DEFAULT_REDIRECT, DEFAULT_TIMEOUT,
    HttpTokenExchange, LOGIN_PATH, REFRESH_PATH, REGISTER_PATH, TokenExchange, TokenPair,
    TokenStore, api_url,
};
use tracing::{debug, instrument};

use crate::classify::{Classification, classify_response};
use crate::coordinator::RefreshCoordinator;
use crate::error::{Error, Result};
use crate::pipeline::RequestPipeline;
use crate::request::{ApiRequest, ApiResponse};
use crate::retry::RetryExecutor;
use crate::session::{SessionSnapshot, SessionStore};
use crate::teardown::{ExpiryHandler, SessionTeardown};
use crate::transport::{HttpTransport, Transport};

/// Settings for a `SessionClient`.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Versioned prefix joined between base URL and request path
    pub api_prefix: String,
    /// Bound on every request and on the token exchange
    pub timeout: Duration,
    pub auth_scheme: String,
    pub refresh_path: String,
    pub login_path: String,
    pub register_path: String,
    /// Sign-in entry point carried by expiry events
    pub redirect_to: String,
    pub default_headers: Vec<(String, String)>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            timeout: DEFAULT_TIMEOUT,
            auth_scheme: DEFAULT_AUTH_SCHEME.to_string(),
            refresh_path: REFRESH_PATH.to_string(),
            login_path: LOGIN_PATH.to_string(),
            register_path: REGISTER_PATH.to_string(),
            redirect_to: DEFAULT_REDIRECT.to_string(),
            default_headers: vec![("content-type".to_string(), "application/json".to_string())],
        }
    }
}

impl ClientConfig {
    pub fn refresh_url(&self) -> String {
        api_url(&self.base_url, &self.api_prefix, &self.refresh_path)
    }

    pub fn login_url(&self) -> String {
        api_url(&self.base_url, &self.api_prefix, &self.login_path)
    }

    pub fn register_url(&self) -> String {
        api_url(&self.base_url, &self.api_prefix, &self.register_path)
    }

    /// Token endpoint client for sign-in, registration and refresh.
    pub fn token_exchange(&self, client: reqwest::Client) -> HttpTokenExchange {
        HttpTokenExchange::new(client, self.refresh_url(), self.login_url(), self.timeout)
            .with_register_url(self.register_url())
    }
}

/// Session-aware HTTP client.
pub struct SessionClient {
    config: ClientConfig,
    session: Arc<SessionStore>,
    pipeline: Arc<RequestPipeline>,
    coordinator: RefreshCoordinator,
    retry: RetryExecutor,
    teardown: Arc<SessionTeardown>,
}

impl SessionClient {
    /// Build a client over explicit collaborators and load the stored session.
    pub async fn new(
        config: ClientConfig,
        store: Arc<dyn TokenStore>,
        transport: Arc<dyn Transport>,
        exchange: Arc<dyn TokenExchange>,
        handler: Arc<dyn ExpiryHandler>,
    ) -> Result<Self> {
        let session = Arc::new(SessionStore::open(store).await?);
        let teardown = Arc::new(SessionTeardown::new(
            session.clone(),
            handler,
            config.redirect_to.clone(),
        ));
        let pipeline = Arc::new(RequestPipeline::new(
            session.clone(),
            transport,
            config.auth_scheme.clone(),
        ));
        let coordinator = RefreshCoordinator::new(
            session.clone(),
            exchange,
            teardown.clone(),
            config.timeout,
        );
        let retry = RetryExecutor::new(pipeline.clone(), session.clone(), teardown.clone());

        Ok(Self {
            config,
            session,
            pipeline,
            coordinator,
            retry,
            teardown,
        })
    }

    /// Build a client that talks HTTP to `config.base_url`.
    pub async fn http(
        config: ClientConfig,
        store: Arc<dyn TokenStore>,
        handler: Arc<dyn ExpiryHandler>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;
        let transport = HttpTransport::new(
            client.clone(),
            config.base_url.clone(),
            config.api_prefix.clone(),
            config.timeout,
        )
        .with_default_headers(&config.default_headers);
        let exchange = config.token_exchange(client);
        Self::new(config, store, Arc::new(transport), Arc::new(exchange), handler).await
    }

    /// Send a request, refreshing and retrying once on an expired access token.
    ///
    /// Non-401 responses, error statuses included, are returned unchanged.
    #[instrument(
        skip_all,
        fields(
            request_id = %new_request_id(),
            method = %request.method(),
            path = %request.path(),
        )
    )]
    pub async fn issue(&self, request: ApiRequest) -> Result<ApiResponse> {
        let result = self.run(&request).await;
        crate::metrics::record_request(crate::metrics::request_outcome(&result));
        result
    }

    async fn run(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let dispatched = self.pipeline.issue(request).await?;
        let refresh_available = self.session.has_refresh_token().await;

        match classify_response(&dispatched.response, request, refresh_available) {
            Classification::Success => Ok(dispatched.response),
            Classification::Recoverable => {
                debug!("access token rejected, refreshing");
                let token = self
                    .coordinator
                    .refresh(dispatched.credential.as_ref(), dispatched.generation)
                    .await?;
                self.retry.retry(request, token).await
            }
            Classification::Terminal => {
                // Nothing can recover this request, whoever ended the session
                let reason = "request rejected and no refresh token is stored";
                self.teardown.expire(dispatched.generation, reason).await;
                Err(Error::SessionExpired(reason.to_string()))
            }
        }
    }

    /// Start a session with a pair obtained from the login endpoint.
    pub async fn sign_in(&self, pair: TokenPair) -> Result<()> {
        self.session.sign_in(pair).await.map(|_| ())
    }

    /// End the session without emitting an expiry event.
    pub async fn sign_out(&self) -> Result<()> {
        self.session.sign_out().await
    }

    /// Whether an access token is stored.
    pub async fn is_authenticated(&self) -> bool {
        self.session.access_token().await.is_some()
    }

    pub async fn access_token(&self) -> Option<Secret<String>> {
        self.session.access_token().await
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot().await
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

fn new_request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().as_simple())
}
