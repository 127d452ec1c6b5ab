//! Signed viewer sessions, CSRF tokens and password checks
//!
//! Token format: `base64url(json claims) "." hex(hmac_sha256(key, base64 part))`.
//! Anything that fails to decode, verify or is past its expiry reads as an
//! anonymous viewer; session problems never surface as errors to visitors.

use crate::config::UserAccount;
use crate::gate::Viewer;
use crate::{Error, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "uc_session";

/// What a session token asserts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub user: String,
    pub roles: Vec<String>,
    /// Expiry as a UNIX timestamp (seconds)
    pub exp: i64,
}

impl SessionClaims {
    pub fn viewer(&self) -> Viewer {
        Viewer::authenticated(self.roles.iter().cloned())
    }
}

/// HMAC signer for session and CSRF tokens
#[derive(Clone)]
pub struct SessionSigner {
    key: Vec<u8>,
}

impl SessionSigner {
    /// Create a new signer with the given secret key
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    /// Generate a random secret key
    pub fn generate_key() -> Vec<u8> {
        use rand::Rng;
        let mut key = vec![0u8; 32];
        rand::thread_rng().fill(&mut key[..]);
        key
    }

    /// Sign data and return HMAC-SHA256 signature
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| Error::Session(format!("Invalid key length: {}", e)))?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    /// Verify HMAC-SHA256 signature using constant-time comparison
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        match HmacSha256::new_from_slice(&self.key) {
            Ok(mut mac) => {
                mac.update(data);
                mac.verify_slice(signature).is_ok()
            }
            Err(_) => false,
        }
    }

    /// Issue a token for `account`, valid for `ttl` from `now`
    pub fn issue(&self, account: &UserAccount, ttl: Duration, now: DateTime<Utc>) -> Result<String> {
        let claims = SessionClaims {
            user: account.username.clone(),
            roles: account.roles.clone(),
            exp: (now + ttl).timestamp(),
        };
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
        let signature = self.sign(payload.as_bytes())?;
        Ok(format!("{}.{}", payload, hex::encode(signature)))
    }

    /// Claims of a valid, unexpired token
    pub fn verify_token(&self, token: &str, now: DateTime<Utc>) -> Option<SessionClaims> {
        let (payload, signature) = token.split_once('.')?;
        let signature = hex::decode(signature).ok()?;
        if !self.verify(payload.as_bytes(), &signature) {
            return None;
        }

        let json = URL_SAFE_NO_PAD.decode(payload).ok()?;
        let claims: SessionClaims = serde_json::from_slice(&json).ok()?;
        (claims.exp > now.timestamp()).then_some(claims)
    }

    /// Viewer behind an optional session token
    pub fn viewer(&self, token: Option<&str>, now: DateTime<Utc>) -> Viewer {
        token
            .and_then(|t| self.verify_token(t, now))
            .map(|claims| claims.viewer())
            .unwrap_or_else(Viewer::anonymous)
    }

    /// CSRF token bound to one session token
    pub fn csrf_token(&self, session_token: &str) -> Result<String> {
        let signature = self.sign(format!("csrf:{}", session_token).as_bytes())?;
        Ok(hex::encode(signature))
    }

    pub fn verify_csrf(&self, session_token: &str, csrf_token: &str) -> bool {
        match hex::decode(csrf_token) {
            Ok(signature) => {
                self.verify(format!("csrf:{}", session_token).as_bytes(), &signature)
            }
            Err(_) => false,
        }
    }
}

/// Hex-encoded SHA-256 of a password, as stored in `password_sha256`
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Constant-time comparison of a password against a stored hash
pub fn verify_password(password: &str, expected_sha256: &str) -> bool {
    let Ok(expected) = hex::decode(expected_sha256.trim()) else {
        return false;
    };
    let actual = Sha256::digest(password.as_bytes());
    actual.as_slice().ct_eq(&expected).into()
}

/// Account matching the credentials, if any
pub fn authenticate<'a>(
    users: &'a [UserAccount],
    username: &str,
    password: &str,
) -> Option<&'a UserAccount> {
    let account = users.iter().find(|u| u.username == username)?;
    verify_password(password, &account.password_sha256).then_some(account)
}
