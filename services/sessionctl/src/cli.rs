//! Argument parsing

use clap::{Parser, Subcommand};
use reqwest::Method;

#[derive(Parser, Debug)]
#[command(name = "sessionctl")]
#[command(about = "Session-aware client for a bearer-token API")]
#[command(version)]
pub struct Cli {
    /// Config file (defaults to SESSIONCTL_CONFIG, then ./sessionctl.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<String>,

    /// Print session counters in Prometheus format to stderr on exit
    #[arg(long, global = true)]
    pub metrics: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sign in (password from SESSIONCTL_PASSWORD)
    Login { username: String },

    /// Create an account and sign in (password from SESSIONCTL_PASSWORD)
    Register {
        username: String,
        #[arg(long)]
        email: String,
    },

    /// Clear the stored session
    Logout,

    /// Show the stored session state
    Status,

    /// Send an authenticated API request
    Request {
        #[arg(value_parser = parse_method)]
        method: Method,
        /// Path below the API prefix, e.g. /users/me
        #[arg(value_parser = parse_path)]
        path: String,
        /// JSON request body
        #[arg(value_parser = parse_body)]
        body: Option<serde_json::Value>,
    },
}

fn parse_method(raw: &str) -> Result<Method, String> {
    Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
        .map_err(|_| format!("invalid HTTP method: {raw}"))
}

fn parse_path(raw: &str) -> Result<String, String> {
    if raw.starts_with('/') {
        Ok(raw.to_string())
    } else {
        Err(format!("path must start with '/': {raw}"))
    }
}

fn parse_body(raw: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("request body is not valid JSON: {e}"))
}
