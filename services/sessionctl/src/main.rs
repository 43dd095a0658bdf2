//! sessionctl
//!
//! Operator CLI for a bearer-token API:
//! 1. Loads configuration and the stored session
//! 2. Signs in, registers, signs out, or reports the session state
//! 3. Sends API requests through the session layer, which refreshes an
//!    expired access token and retries once
//!
//! Exits with status 2 when the session has expired and a new sign-in is needed.

mod cli;
mod commands;
mod config;
mod error;
mod metrics;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use common::Secret;
use session_auth::{FileTokenStore, Registration};
use session_client::{LogExpiryHandler, SessionClient};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Command};
use crate::commands::Outcome;
use crate::config::Config;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support.
    // Logs go to stderr so command output stays clean.
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    // Exit code 2 is reserved for an expired session, so usage errors use 64
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(64)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(cli).await {
        Ok(outcome) => ExitCode::from(outcome.exit_code()),
        Err(e) => {
            error!(error = %format!("{e:#}"), "command failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<Outcome> {
    // Install the recorder before any session metrics are emitted
    let prometheus = if cli.metrics {
        Some(metrics::install_recorder()?)
    } else {
        None
    };

    let (config_path, explicit) = Config::resolve_path(cli.config.as_deref());
    let config = Config::load_or_default(&config_path, explicit)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    info!(
        path = %config_path.display(),
        base_url = %config.api.base_url,
        store = %config.session.store_path.display(),
        headers = config.headers.len(),
        "configuration loaded"
    );

    let store_path = config.session.store_path.clone();
    if let Some(parent) = store_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let client_config = config.client_config();
    let store = Arc::new(FileTokenStore::new(&store_path));
    let client = SessionClient::http(client_config.clone(), store, Arc::new(LogExpiryHandler))
        .await
        .context("failed to open session")?;

    let mut out = std::io::stdout();
    let outcome = match cli.command {
        Command::Login { username } => {
            let password = password_from_env()?;
            let exchange = client_config.token_exchange(reqwest::Client::new());
            commands::login(&client, &exchange, &username, &password, &mut out).await?
        }
        Command::Register { username, email } => {
            let password = password_from_env()?;
            let exchange = client_config.token_exchange(reqwest::Client::new());
            let registration = Registration {
                email: &email,
                username: &username,
                password: password.expose_str(),
                full_name: None,
                phone_number: None,
            };
            commands::register(&client, &exchange, &registration, &mut out).await?
        }
        Command::Logout => commands::logout(&client, &mut out).await?,
        Command::Status => commands::status(&client, &store_path, &mut out).await?,
        Command::Request { method, path, body } => {
            commands::request(&client, method, &path, body.as_ref(), &mut out).await?
        }
    };

    if let Some(handle) = prometheus {
        eprint!("{}", handle.render());
    }
    Ok(outcome)
}

fn password_from_env() -> Result<Secret<String>> {
    let password = std::env::var("SESSIONCTL_PASSWORD")
        .map(Secret::new)
        .map_err(|_| crate::error::Error::MissingPassword)?;
    Ok(password)
}
