//! Configuration management for the gateway

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Minimum session secret length in bytes
pub const MIN_SECRET_LEN: usize = 16;

/// A login allowed to use the admin surface (and, per access mode, bypass the gate)
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct UserAccount {
    pub username: String,

    /// Hex-encoded SHA-256 of the password
    pub password_sha256: String,

    /// Role names; `administrator` grants settings access
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Full-page cache invalidation endpoint
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PurgeConfig {
    /// URL that receives the purge request
    pub url: String,

    /// HTTP method of the purge request
    #[serde(default = "default_purge_method")]
    pub method: String,

    /// Sent as `Authorization: Bearer <token>` when present
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// Attempts before giving up on one purge
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Per-attempt timeout in seconds
    #[serde(default = "default_purge_timeout_secs")]
    pub timeout_secs: u64,
}

impl PurgeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Gateway configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    /// Bind address for HTTP server
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Real site that visitors reach when the gate lets them through
    pub upstream_url: String,

    /// YAML file backing the settings store; in-memory when absent
    #[serde(default)]
    pub settings_path: Option<PathBuf>,

    /// HMAC key for session cookies (hex-encoded)
    pub session_secret: String,

    /// Session lifetime in seconds
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    /// Accounts that can log in
    #[serde(default)]
    pub users: Vec<UserAccount>,

    /// Value of the `[site_name]` shortcode
    #[serde(default = "default_site_name")]
    pub site_name: String,

    /// HTTP status of notice responses
    #[serde(default = "default_notice_status")]
    pub notice_status: u16,

    /// Mark the session cookie `Secure`; enable when clients reach the gateway over HTTPS
    #[serde(default)]
    pub secure_cookies: bool,

    /// Login attempts allowed per source address per minute
    #[serde(default = "default_login_rate_limit")]
    pub login_rate_limit_per_minute: u32,

    /// Cache purge target; purging is skipped when absent
    #[serde(default)]
    pub purge: Option<PurgeConfig>,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

impl GatewayConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config: Self = ::config::Config::builder()
            .add_source(::config::File::from(path))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config: Self = envy::prefixed("UC_")
            .from_env()
            .map_err(|e| Error::Config(format!("Failed to parse environment variables: {}", e)))?;

        // A single admin account can be supplied as two plain variables
        if let (Ok(username), Ok(hash)) = (
            std::env::var("UC_ADMIN_USER"),
            std::env::var("UC_ADMIN_PASSWORD_SHA256"),
        ) {
            config.users.push(UserAccount {
                username: username.trim().to_string(),
                password_sha256: hash.trim().to_string(),
                roles: vec![crate::ADMIN_ROLE.to_string()],
            });
        }

        if let Ok(url) = std::env::var("UC_PURGE_URL") {
            config.purge = Some(PurgeConfig {
                url: url.trim().to_string(),
                method: std::env::var("UC_PURGE_METHOD").unwrap_or_else(|_| default_purge_method()),
                bearer_token: std::env::var("UC_PURGE_BEARER_TOKEN").ok(),
                max_retries: std::env::var("UC_PURGE_MAX_RETRIES")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or_else(default_max_retries),
                timeout_secs: default_purge_timeout_secs(),
            });
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.listen_address
            .parse::<SocketAddr>()
            .map_err(|e| Error::Config(format!("Invalid listen_address: {}", e)))?;

        let upstream = Url::parse(&self.upstream_url)
            .map_err(|e| Error::Config(format!("Invalid upstream_url: {}", e)))?;
        if !matches!(upstream.scheme(), "http" | "https") {
            return Err(Error::Config(
                "upstream_url must use http or https".to_string(),
            ));
        }

        if self.session_key()?.len() < MIN_SECRET_LEN {
            return Err(Error::Config(format!(
                "session_secret must be at least {} bytes",
                MIN_SECRET_LEN
            )));
        }

        if self.session_ttl_secs == 0 {
            return Err(Error::Config("session_ttl_secs must be > 0".to_string()));
        }

        if !(200..=599).contains(&self.notice_status) {
            return Err(Error::Config(format!(
                "notice_status {} is not a valid response status",
                self.notice_status
            )));
        }

        let mut seen = HashSet::new();
        for user in &self.users {
            if user.username.is_empty() {
                return Err(Error::Config("usernames cannot be empty".to_string()));
            }
            if !seen.insert(user.username.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate user '{}'",
                    user.username
                )));
            }
            let valid_hash = user.password_sha256.len() == 64
                && user.password_sha256.chars().all(|c| c.is_ascii_hexdigit());
            if !valid_hash {
                return Err(Error::Config(format!(
                    "password_sha256 of '{}' must be 64 hex characters",
                    user.username
                )));
            }
        }

        if let Some(purge) = &self.purge {
            Url::parse(&purge.url)
                .map_err(|e| Error::Config(format!("Invalid purge url: {}", e)))?;
            reqwest::Method::from_bytes(purge.method.as_bytes())
                .map_err(|_| Error::Config(format!("Invalid purge method '{}'", purge.method)))?;
        }

        Ok(())
    }

    /// Decoded session secret
    pub fn session_key(&self) -> Result<Vec<u8>> {
        hex::decode(self.session_secret.trim())
            .map_err(|e| Error::Config(format!("session_secret must be hex-encoded: {}", e)))
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        // Capped at ten years to stay inside chrono's range
        let secs = self.session_ttl_secs.min(10 * 365 * 24 * 60 * 60);
        chrono::Duration::seconds(secs as i64)
    }
}

// Default value functions
fn default_listen_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_session_ttl_secs() -> u64 {
    12 * 60 * 60
}

fn default_site_name() -> String {
    "My Site".to_string()
}

fn default_notice_status() -> u16 {
    200
}

fn default_login_rate_limit() -> u32 {
    10
}

fn default_purge_method() -> String {
    "PURGE".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_purge_timeout_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}
