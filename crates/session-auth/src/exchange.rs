//! Token endpoint client
//!
//! Handles the token endpoint interactions:
//! 1. Password sign-in (`POST {prefix}/auth/login`)
//! 2. Account registration (`POST {prefix}/auth/register`)
//! 3. Token refresh (`POST {prefix}/auth/refresh`)
//!
//! All of them return the same `TokenResponse` body. The refresh route rotates the
//! refresh token on every use, so a refresh token must never be exchanged twice.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::tokens::{TokenPair, TokenResponse};

/// The refresh half of the token endpoint, as seen by the refresh coordinator.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn TokenExchange>`).
pub trait TokenExchange: Send + Sync {
    /// Trade a refresh token for a new access/refresh pair.
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenPair>> + Send + 'a>>;
}

/// Build a full endpoint URL from base, versioned prefix and route.
pub fn api_url(base_url: &str, api_prefix: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let prefix = api_prefix.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{prefix}{path}")
    } else {
        format!("{base}{prefix}/{path}")
    }
}

#[derive(Serialize)]
struct RefreshBody<'a> {
    refresh_token: &'a str,
}

#[derive(Serialize)]
struct LoginBody<'a> {
    username: &'a str,
    password: &'a str,
}

/// A new account. Registering signs the account in.
#[derive(Serialize)]
pub struct Registration<'a> {
    pub email: &'a str,
    pub username: &'a str,
    pub password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<&'a str>,
}

/// Exchange a refresh token for a new pair.
///
/// 401/403 means the refresh token is revoked, expired or already rotated.
pub async fn refresh_token(
    client: &reqwest::Client,
    url: &str,
    refresh: &str,
    timeout: Duration,
) -> Result<TokenPair> {
    let response = client
        .post(url)
        .timeout(timeout)
        .json(&RefreshBody {
            refresh_token: refresh,
        })
        .send()
        .await
        .map_err(|e| send_error("token refresh", e))?;

    read_token_response(response, "token refresh").await
}

/// Sign in with username and password.
pub async fn login(
    client: &reqwest::Client,
    url: &str,
    username: &str,
    password: &str,
    timeout: Duration,
) -> Result<TokenPair> {
    let response = client
        .post(url)
        .timeout(timeout)
        .json(&LoginBody { username, password })
        .send()
        .await
        .map_err(|e| send_error("login", e))?;

    read_token_response(response, "login").await
}

/// Create an account and receive its first pair.
///
/// The backend rejects duplicate users and weak passwords with 400, which
/// surfaces as `TokenExchange` with the backend's detail message.
pub async fn register(
    client: &reqwest::Client,
    url: &str,
    registration: &Registration<'_>,
    timeout: Duration,
) -> Result<TokenPair> {
    let response = client
        .post(url)
        .timeout(timeout)
        .json(registration)
        .send()
        .await
        .map_err(|e| send_error("registration", e))?;

    read_token_response(response, "registration").await
}

fn send_error(operation: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(format!("{operation} request timed out: {e}"))
    } else {
        Error::Http(format!("{operation} request failed: {e}"))
    }
}

async fn read_token_response(response: reqwest::Response, operation: &str) -> Result<TokenPair> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::InvalidCredentials(format!(
                "{operation} rejected ({status}): {body}"
            )));
        }

        return Err(Error::TokenExchange(format!(
            "{operation} returned {status}: {body}"
        )));
    }

    let token = response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid {operation} response: {e}")))?;
    debug!(operation, "token endpoint issued new pair");
    Ok(TokenPair::from(token))
}

/// `TokenExchange` over HTTP, also used for password sign-in.
#[derive(Clone)]
pub struct HttpTokenExchange {
    client: reqwest::Client,
    refresh_url: String,
    login_url: String,
    register_url: Option<String>,
    timeout: Duration,
}

impl HttpTokenExchange {
    pub fn new(
        client: reqwest::Client,
        refresh_url: impl Into<String>,
        login_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            refresh_url: refresh_url.into(),
            login_url: login_url.into(),
            register_url: None,
            timeout,
        }
    }

    pub fn with_register_url(mut self, url: impl Into<String>) -> Self {
        self.register_url = Some(url.into());
        self
    }

    pub fn refresh_url(&self) -> &str {
        &self.refresh_url
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair> {
        login(&self.client, &self.login_url, username, password, self.timeout).await
    }

    pub async fn register(&self, registration: &Registration<'_>) -> Result<TokenPair> {
        let url = self
            .register_url
            .as_deref()
            .ok_or_else(|| Error::TokenExchange("no registration endpoint configured".into()))?;
        register(&self.client, url, registration, self.timeout).await
    }
}

impl TokenExchange for HttpTokenExchange {
    fn refresh<'a>(
        &'a self,
        token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenPair>> + Send + 'a>> {
        Box::pin(refresh_token(
            &self.client,
            &self.refresh_url,
            token,
            self.timeout,
        ))
    }
}
