//! Backend endpoint defaults
//!
//! The backend mounts every route under a versioned prefix. Token routes live
//! under `/auth` beneath that prefix.

use std::time::Duration;

/// Base URL used when neither config nor environment provide one
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Versioned API prefix prepended to every request path
pub const DEFAULT_API_PREFIX: &str = "/api/v1";

/// Token exchange route (refresh token for a new pair)
pub const REFRESH_PATH: &str = "/auth/refresh";

/// Password sign-in route
pub const LOGIN_PATH: &str = "/auth/login";

/// Account registration route; answers with a first pair like sign-in
pub const REGISTER_PATH: &str = "/auth/register";

/// Per-request timeout for API and token calls
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Authorization scheme placed before the access token
pub const DEFAULT_AUTH_SCHEME: &str = "Bearer";

/// Where the user is sent once the session cannot be recovered
pub const DEFAULT_REDIRECT: &str = "/login";
