//! Wire dispatch for API requests
//!
//! `Transport` is the seam between the session logic and the network. The
//! pipeline hands it a request whose Authorization header is already set;
//! the transport resolves the URL, applies default headers and the timeout,
//! and buffers the response.

use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use session_auth::api_url;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::request::{ApiRequest, ApiResponse};

/// Sends one attempt of a request and returns the buffered response.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn Transport>`).
pub trait Transport: Send + Sync {
    fn send<'a>(
        &'a self,
        request: &'a ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse>> + Send + 'a>>;
}

/// `reqwest`-backed transport rooted at `{base_url}{api_prefix}`.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    api_prefix: String,
    timeout: Duration,
    default_headers: HeaderMap,
}

impl HttpTransport {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_prefix: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_prefix: api_prefix.into(),
            timeout,
            default_headers: HeaderMap::new(),
        }
    }

    /// Headers sent with every request unless the request sets its own value.
    ///
    /// Invalid names or values are skipped with a warning. Authorization is
    /// never accepted here; it belongs to the session.
    pub fn with_default_headers(mut self, headers: &[(String, String)]) -> Self {
        for (name, value) in headers {
            let name = match HeaderName::from_str(name) {
                Ok(n) => n,
                Err(e) => {
                    warn!(header = %name, error = %e, "skipping invalid header name");
                    continue;
                }
            };
            if name == reqwest::header::AUTHORIZATION {
                warn!(header = %name, "refusing to set authorization as a default header");
                continue;
            }
            let value = match HeaderValue::from_str(value) {
                Ok(v) => v,
                Err(e) => {
                    warn!(header = %name, error = %e, "skipping invalid header value");
                    continue;
                }
            };
            self.default_headers.insert(name, value);
        }
        self
    }

    pub fn default_headers(&self) -> &HeaderMap {
        &self.default_headers
    }

    pub fn url_for(&self, request: &ApiRequest) -> String {
        api_url(&self.base_url, &self.api_prefix, request.path())
    }

    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let url = self.url_for(request);

        let mut headers = self.default_headers.clone();
        for (name, value) in request.headers() {
            headers.insert(name.clone(), value.clone());
        }

        let mut builder = self
            .client
            .request(request.method().clone(), &url)
            .headers(headers)
            .timeout(self.timeout);
        if !request.query_pairs().is_empty() {
            builder = builder.query(request.query_pairs());
        }
        if let Some(body) = request.payload() {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| self.send_error(e))?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| self.send_error(e))?;

        debug!(%url, status = status.as_u16(), bytes = body.len(), "response received");
        Ok(ApiResponse::new(status, headers, body))
    }

    fn send_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout(format!("no response within {}s: {e}", self.timeout.as_secs()))
        } else {
            Error::Network(e.to_string())
        }
    }
}

impl Transport for HttpTransport {
    fn send<'a>(
        &'a self,
        request: &'a ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse>> + Send + 'a>> {
        Box::pin(self.execute(request))
    }
}
