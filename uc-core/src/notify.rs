//! Settings change notification and full-page cache purging
//!
//! The notice a visitor gets depends on mutable settings, so any full-page cache in
//! front of the site has to be emptied whenever a gating option changes. The purge
//! target is optional: without one, notifications only log.

use crate::config::PurgeConfig;
use crate::metrics::Metrics;
use crate::retry::RetryPolicy;
use crate::settings::{GateSettings, SettingKey};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, Method};
use std::sync::Arc;
use tracing::{debug, error, info};
use url::Url;

/// A full-page cache that can be emptied
#[async_trait]
pub trait CachePurger: Send + Sync {
    /// Invalidate every cached page
    async fn purge_all(&self) -> Result<()>;

    /// Short description for logs
    fn describe(&self) -> String;
}

/// Purges a cache by sending one HTTP request to a configured endpoint
pub struct HttpPurger {
    client: Client,
    url: Url,
    method: Method,
    bearer_token: Option<String>,
    retry_policy: RetryPolicy,
}

impl HttpPurger {
    pub fn new(config: &PurgeConfig) -> Result<Self> {
        let url = Url::parse(&config.url)
            .map_err(|e| Error::Config(format!("Invalid purge url: {}", e)))?;
        let method = Method::from_bytes(config.method.as_bytes())
            .map_err(|_| Error::Config(format!("Invalid purge method '{}'", config.method)))?;
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(Error::Network)?;

        Ok(Self {
            client,
            url,
            method,
            bearer_token: config.bearer_token.clone(),
            retry_policy: RetryPolicy::with_attempts(config.max_retries),
        })
    }

    /// Replace the retry policy
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    async fn purge_once(&self) -> Result<()> {
        let mut request = self.client.request(self.method.clone(), self.url.clone());
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout
            } else {
                Error::Network(e)
            }
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::UpstreamStatus(status.as_u16()));
        }

        debug!("Purge endpoint answered {}", status);
        Ok(())
    }
}

#[async_trait]
impl CachePurger for HttpPurger {
    async fn purge_all(&self) -> Result<()> {
        debug!("Purging cache: {} {}", self.method, self.url);
        self.retry_policy
            .execute(self.url.as_str(), || self.purge_once())
            .await
    }

    fn describe(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}

/// Calls the purger when gating settings change
#[derive(Clone)]
pub struct ChangeNotifier {
    purger: Option<Arc<dyn CachePurger>>,
    metrics: Metrics,
}

impl ChangeNotifier {
    pub fn new(purger: Option<Arc<dyn CachePurger>>, metrics: Metrics) -> Self {
        Self { purger, metrics }
    }

    /// Notifier with nothing to purge
    pub fn disabled(metrics: Metrics) -> Self {
        Self::new(None, metrics)
    }

    pub fn has_purger(&self) -> bool {
        self.purger.is_some()
    }

    /// React to one option changing value.
    ///
    /// Returns whether an invalidation was requested, i.e. whether the value changed.
    /// Purge failures are logged and counted, never returned.
    pub async fn on_setting_changed(&self, key: SettingKey, old: &str, new: &str) -> bool {
        if old == new {
            return false;
        }

        info!("Setting {} changed, invalidating cached pages", key);

        let Some(purger) = &self.purger else {
            debug!("No cache purger configured");
            return true;
        };

        match purger.purge_all().await {
            Ok(()) => {
                self.metrics.record_purge();
                info!("Purged full-page cache via {}", purger.describe());
            }
            Err(e) => {
                self.metrics.record_purge_failure();
                error!("Cache purge via {} failed: {}", purger.describe(), e);
            }
        }
        true
    }

    /// React to a settings form save; returns the number of invalidations requested
    pub async fn on_settings_saved(&self, old: &GateSettings, new: &GateSettings) -> usize {
        let mut invalidations = 0;
        for key in SettingKey::GATING {
            if self
                .on_setting_changed(key, &old.value_of(key), &new.value_of(key))
                .await
            {
                invalidations += 1;
            }
        }
        invalidations
    }
}
