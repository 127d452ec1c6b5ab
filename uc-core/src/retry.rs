//! Retry logic with exponential backoff and jitter

use crate::Result;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Add jitter to prevent thundering herd
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Policy allowing `max_attempts` tries with the default backoff curve
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }

    /// Call `operation` until it succeeds, fails permanently or runs out of attempts.
    /// `endpoint` names what is being called and only appears in logs.
    pub async fn execute<F, Fut, T>(&self, endpoint: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut delay = self.initial_backoff;
        let mut attempt = 1;

        loop {
            let err = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!("{} reached on attempt {}", endpoint, attempt);
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !err.is_retryable() {
                debug!("{} refused the call, not retrying: {}", endpoint, err);
                return Err(err);
            }
            if attempt >= self.max_attempts {
                warn!("{} still failing after {} attempts: {}", endpoint, attempt, err);
                return Err(err);
            }

            warn!(
                "{} unavailable ({}), attempt {} of {}, next try in {:?}",
                endpoint, err, attempt, self.max_attempts, delay
            );
            sleep(delay).await;
            delay = self.next_delay(delay);
            attempt += 1;
        }
    }

    /// Grow `current` by the multiplier, capped at `max_backoff`
    fn next_delay(&self, current: Duration) -> Duration {
        let grown = current.mul_f64(self.multiplier).min(self.max_backoff);
        if self.jitter {
            self.add_jitter(grown)
        } else {
            grown
        }
    }

    fn add_jitter(&self, duration: Duration) -> Duration {
        use rand::Rng;
        let jitter_ms = rand::thread_rng().gen_range(0..=duration.as_millis() / 4);
        duration + Duration::from_millis(jitter_ms as u64)
    }
}
