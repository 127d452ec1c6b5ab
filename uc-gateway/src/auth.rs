//! Viewer identity, cookies and login throttling

use axum::http::{header, HeaderMap, HeaderValue};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use uc_core::{session::SESSION_COOKIE, Viewer};

use crate::AppState;

/// Value of cookie `name` across all `Cookie` headers
pub fn cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// Session token carried by the request, if any
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    cookie(headers, SESSION_COOKIE).filter(|token| !token.is_empty())
}

/// Who is making the request
pub fn viewer(state: &AppState, headers: &HeaderMap) -> Viewer {
    state
        .signer
        .viewer(session_token(headers).as_deref(), Utc::now())
}

/// Peer address as the gate compares it; empty when the server did not record one
pub fn source_ip(peer: Option<SocketAddr>) -> String {
    peer.map(|addr| addr.ip().to_string()).unwrap_or_default()
}

/// `Set-Cookie` value that stores a session; `secure` limits it to HTTPS
pub fn session_cookie(token: &str, max_age_secs: u64, secure: bool) -> HeaderValue {
    HeaderValue::from_str(&cookie_attributes(token, max_age_secs, secure))
        .unwrap_or_else(|_| clear_session_cookie(secure))
}

/// `Set-Cookie` value that removes the session
pub fn clear_session_cookie(secure: bool) -> HeaderValue {
    if secure {
        HeaderValue::from_static("uc_session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0; Secure")
    } else {
        HeaderValue::from_static("uc_session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
    }
}

fn cookie_attributes(token: &str, max_age_secs: u64, secure: bool) -> String {
    let mut value = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, max_age_secs
    );
    if secure {
        value.push_str("; Secure");
    }
    value
}

/// Buckets idle long enough to have refilled are dropped at most this often
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Token-bucket rate limiter keyed by client address
pub struct RateLimiter {
    state: RwLock<LimiterState>,
    capacity: f64,
    refill_per_sec: f64,
}

struct LimiterState {
    buckets: HashMap<String, TokenBucket>,
    last_sweep: Instant,
}

struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Allow `limit` attempts per minute per key, with bursts up to `limit`
    pub fn per_minute(limit: u32) -> Self {
        Self {
            state: RwLock::new(LimiterState {
                buckets: HashMap::new(),
                last_sweep: Instant::now(),
            }),
            capacity: f64::from(limit),
            refill_per_sec: f64::from(limit) / 60.0,
        }
    }

    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    /// Number of clients currently holding a bucket
    pub fn tracked_clients(&self) -> usize {
        self.state.read().buckets.len()
    }

    fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut state = self.state.write();
        if now.duration_since(state.last_sweep) >= SWEEP_INTERVAL {
            self.sweep(&mut state.buckets, now);
            state.last_sweep = now;
        }

        let bucket = state
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket {
                tokens: self.capacity,
                last_refill: now,
            });

        // Refill tokens based on elapsed time
        bucket.tokens = self.refilled(bucket, now);
        bucket.last_refill = now;

        // Try to consume a token
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refilled(&self, bucket: &TokenBucket, now: Instant) -> f64 {
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity)
    }

    /// A full bucket behaves exactly like a missing one, so it can go
    fn sweep(&self, buckets: &mut HashMap<String, TokenBucket>, now: Instant) {
        buckets.retain(|_, bucket| self.refilled(bucket, now) < self.capacity);
    }
}
