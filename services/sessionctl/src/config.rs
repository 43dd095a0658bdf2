//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Tokens are never read from the TOML; they live in the session file.

use serde::Deserialize;
use session_auth::{
    DEFAULT_API_PREFIX, DEFAULT_AUTH_SCHEME, DEFAULT_BASE_URL, DEFAULT_REDIRECT, LOGIN_PATH,
    REFRESH_PATH, REGISTER_PATH,
};
use session_client::ClientConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Env var that overrides `api.base_url`
pub const API_URL_ENV: &str = "SESSION_API_URL";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub headers: Vec<HeaderConfig>,
}

/// Backend API settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_auth_scheme")]
    pub auth_scheme: String,
}

/// Session persistence and token endpoint settings
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    #[serde(default = "default_login_path")]
    pub login_path: String,
    #[serde(default = "default_register_path")]
    pub register_path: String,
    #[serde(default = "default_redirect")]
    pub redirect_to: String,
}

/// Static header sent with every request
#[derive(Debug, Clone, Deserialize)]
pub struct HeaderConfig {
    pub name: String,
    pub value: String,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_prefix() -> String {
    DEFAULT_API_PREFIX.to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_auth_scheme() -> String {
    DEFAULT_AUTH_SCHEME.to_string()
}

fn default_store_path() -> PathBuf {
    PathBuf::from("sessionctl-session.json")
}

fn default_refresh_path() -> String {
    REFRESH_PATH.to_string()
}

fn default_login_path() -> String {
    LOGIN_PATH.to_string()
}

fn default_register_path() -> String {
    REGISTER_PATH.to_string()
}

fn default_redirect() -> String {
    DEFAULT_REDIRECT.to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            prefix: default_prefix(),
            timeout_secs: default_timeout(),
            auth_scheme: default_auth_scheme(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            refresh_path: default_refresh_path(),
            login_path: default_login_path(),
            register_path: default_register_path(),
            redirect_to: default_redirect(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.finish()
    }

    /// Load `path` if it exists. A missing file is only an error when the
    /// path was given explicitly.
    pub fn load_or_default(path: &Path, explicit: bool) -> common::Result<Self> {
        if explicit || path.exists() {
            Self::load(path)
        } else {
            Config::default().finish()
        }
    }

    fn finish(mut self) -> common::Result<Self> {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            self.api.base_url = url;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> common::Result<()> {
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if self.api.auth_scheme.trim().is_empty() {
            return Err(common::Error::Config("auth_scheme must not be empty".into()));
        }

        for (name, value) in [
            ("prefix", &self.api.prefix),
            ("refresh_path", &self.session.refresh_path),
            ("login_path", &self.session.login_path),
            ("register_path", &self.session.register_path),
        ] {
            if !value.is_empty() && !value.starts_with('/') {
                return Err(common::Error::Config(format!(
                    "{name} must start with '/', got: {value}"
                )));
            }
        }

        Ok(())
    }

    /// Resolve config file path from CLI arg or SESSIONCTL_CONFIG env var.
    ///
    /// The flag reports whether the path was chosen explicitly.
    pub fn resolve_path(cli_path: Option<&str>) -> (PathBuf, bool) {
        if let Some(p) = cli_path {
            return (PathBuf::from(p), true);
        }
        if let Ok(p) = std::env::var("SESSIONCTL_CONFIG") {
            return (PathBuf::from(p), true);
        }
        (PathBuf::from("sessionctl.toml"), false)
    }

    pub fn client_config(&self) -> ClientConfig {
        let mut client = ClientConfig {
            base_url: self.api.base_url.clone(),
            api_prefix: self.api.prefix.clone(),
            timeout: Duration::from_secs(self.api.timeout_secs),
            auth_scheme: self.api.auth_scheme.clone(),
            refresh_path: self.session.refresh_path.clone(),
            login_path: self.session.login_path.clone(),
            register_path: self.session.register_path.clone(),
            redirect_to: self.session.redirect_to.clone(),
            ..ClientConfig::default()
        };
        client.default_headers.extend(
            self.headers
                .iter()
                .map(|h| (h.name.clone(), h.value.clone())),
        );
        client
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serializes tests that read or mutate environment variables.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("sessionctl.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn full_toml() -> &'static str {
        r#"
[api]
base_url = "https://portal.example.net"
prefix = "/api/v2"
timeout_secs = 10
auth_scheme = "Token"

[session]
store_path = "/var/lib/sessionctl/session.json"
refresh_path = "/auth/token/refresh"
redirect_to = "/signin"

[[headers]]
name = "x-client"
value = "sessionctl"
"#
    }

    #[test]
    fn load_full_config() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env(API_URL_ENV) };
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, full_toml());

        let config = Config::load(&path).unwrap();
        assert_eq!(config.api.base_url, "https://portal.example.net");
        assert_eq!(config.api.prefix, "/api/v2");
        assert_eq!(config.api.timeout_secs, 10);
        assert_eq!(config.api.auth_scheme, "Token");
        assert_eq!(
            config.session.store_path,
            PathBuf::from("/var/lib/sessionctl/session.json")
        );
        assert_eq!(config.session.refresh_path, "/auth/token/refresh");
        assert_eq!(config.session.login_path, "/auth/login");
        assert_eq!(config.session.register_path, "/auth/register");
        assert_eq!(config.headers.len(), 1);
    }

    #[test]
    fn empty_file_uses_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env(API_URL_ENV) };
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "");

        let config = Config::load(&path).unwrap();
        assert_eq!(config.api.base_url, "http://localhost:8000");
        assert_eq!(config.api.prefix, "/api/v1");
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.session.redirect_to, "/login");
        assert!(config.headers.is_empty());
    }

    #[test]
    fn env_overrides_base_url() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, full_toml());

        unsafe { set_env(API_URL_ENV, "http://10.0.0.5:8000") };
        let config = Config::load(&path).unwrap();
        unsafe { remove_env(API_URL_ENV) };

        assert_eq!(config.api.base_url, "http://10.0.0.5:8000");
    }

    #[test]
    fn invalid_base_url_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env(API_URL_ENV) };
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "[api]\nbase_url = \"portal.example.net\"\n");

        let err = Config::load(&path).unwrap_err().to_string();
        assert!(
            err.contains("base_url must start with http"),
            "error message should explain the issue, got: {err}"
        );
    }

    #[test]
    fn zero_timeout_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env(API_URL_ENV) };
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "[api]\ntimeout_secs = 0\n");

        assert!(Config::load(&path).is_err(), "timeout_secs = 0 must be rejected");
    }

    #[test]
    fn relative_route_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env(API_URL_ENV) };
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "[session]\nrefresh_path = \"auth/refresh\"\n");

        let err = Config::load(&path).unwrap_err().to_string();
        assert!(err.contains("refresh_path must start with '/'"), "got: {err}");
    }

    #[test]
    fn invalid_toml_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "not valid {{{{ toml");
        assert!(matches!(
            Config::load(&path),
            Err(common::Error::Toml(_))
        ));
    }

    #[test]
    fn missing_file_only_fails_when_explicit() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env(API_URL_ENV) };
        let missing = Path::new("/nonexistent/sessionctl.toml");

        assert!(Config::load_or_default(missing, true).is_err());
        let config = Config::load_or_default(missing, false).unwrap();
        assert_eq!(config.api.base_url, "http://localhost:8000");
    }

    #[test]
    fn resolve_path_precedence() {
        let _lock = ENV_MUTEX.lock().unwrap();

        unsafe { set_env("SESSIONCTL_CONFIG", "/env/sessionctl.toml") };
        assert_eq!(
            Config::resolve_path(Some("/cli/wins.toml")),
            (PathBuf::from("/cli/wins.toml"), true),
            "CLI arg must take precedence over SESSIONCTL_CONFIG"
        );
        assert_eq!(
            Config::resolve_path(None),
            (PathBuf::from("/env/sessionctl.toml"), true)
        );

        unsafe { remove_env("SESSIONCTL_CONFIG") };
        assert_eq!(
            Config::resolve_path(None),
            (PathBuf::from("sessionctl.toml"), false)
        );
    }

    #[test]
    fn client_config_carries_settings_and_headers() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env(API_URL_ENV) };
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, full_toml());

        let client = Config::load(&path).unwrap().client_config();
        assert_eq!(
            client.refresh_url(),
            "https://portal.example.net/api/v2/auth/token/refresh"
        );
        assert_eq!(client.timeout, Duration::from_secs(10));
        assert_eq!(client.auth_scheme, "Token");
        assert_eq!(client.redirect_to, "/signin");
        assert!(
            client
                .default_headers
                .contains(&("content-type".to_string(), "application/json".to_string()))
        );
        assert!(
            client
                .default_headers
                .contains(&("x-client".to_string(), "sessionctl".to_string()))
        );
    }
}
