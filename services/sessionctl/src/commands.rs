//! Command handlers
//!
//! Each handler writes its human-facing output to `out` and reports an
//! `Outcome`, which `main` turns into the process exit code.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use common::Secret;
use reqwest::Method;
use session_auth::{HttpTokenExchange, Registration};
use session_client::{ApiRequest, SessionClient};
use tracing::{info, warn};

/// How a command finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// The request completed with a non-2xx status
    Failed,
    /// The session is gone; the operator has to sign in again
    SessionExpired,
}

impl Outcome {
    pub fn exit_code(self) -> u8 {
        match self {
            Outcome::Success => 0,
            Outcome::Failed => 1,
            Outcome::SessionExpired => 2,
        }
    }
}

/// Sign in with username and password and store the issued pair.
pub async fn login(
    client: &SessionClient,
    exchange: &HttpTokenExchange,
    username: &str,
    password: &Secret<String>,
    out: &mut dyn Write,
) -> Result<Outcome> {
    let pair = exchange
        .login(username, password.expose_str())
        .await
        .context("sign-in failed")?;
    client.sign_in(pair).await.context("failed to store session")?;
    info!(username, "signed in");
    writeln!(out, "signed in as {username}")?;
    Ok(Outcome::Success)
}

/// Create an account and store the pair the backend issues for it.
pub async fn register(
    client: &SessionClient,
    exchange: &HttpTokenExchange,
    registration: &Registration<'_>,
    out: &mut dyn Write,
) -> Result<Outcome> {
    let pair = exchange
        .register(registration)
        .await
        .context("registration failed")?;
    client.sign_in(pair).await.context("failed to store session")?;
    info!(username = registration.username, "registered and signed in");
    writeln!(out, "registered and signed in as {}", registration.username)?;
    Ok(Outcome::Success)
}

pub async fn logout(client: &SessionClient, out: &mut dyn Write) -> Result<Outcome> {
    client.sign_out().await.context("failed to clear session")?;
    writeln!(out, "signed out")?;
    Ok(Outcome::Success)
}

/// Print the stored session state as JSON. Token values are never shown.
pub async fn status(
    client: &SessionClient,
    store_path: &Path,
    out: &mut dyn Write,
) -> Result<Outcome> {
    let snapshot = client.snapshot().await;
    let report = serde_json::json!({
        "authenticated": snapshot.access_token.is_some(),
        "refresh_token": snapshot.refresh_token.is_some(),
        "base_url": client.config().base_url,
        "store": store_path.display().to_string(),
    });
    writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
    Ok(Outcome::Success)
}

/// Send one API request and print the response body.
pub async fn request(
    client: &SessionClient,
    method: Method,
    path: &str,
    body: Option<&serde_json::Value>,
    out: &mut dyn Write,
) -> Result<Outcome> {
    let mut request = ApiRequest::new(method, path);
    if let Some(body) = body {
        request = request.json(body)?;
    }

    match client.issue(request).await {
        Ok(response) => {
            let status = response.status();
            writeln!(out, "{status}")?;
            let text = response.text();
            if !text.is_empty() {
                writeln!(out, "{text}")?;
            }
            Ok(if status.is_success() {
                Outcome::Success
            } else {
                Outcome::Failed
            })
        }
        Err(e) if e.is_session_expired() => {
            warn!(error = %e, "session expired");
            writeln!(out, "session expired, sign in again with `sessionctl login <USERNAME>`")?;
            Ok(Outcome::SessionExpired)
        }
        Err(e) => Err(e).context(format!("{path} failed")),
    }
}
