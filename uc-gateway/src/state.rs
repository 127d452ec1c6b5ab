//! Shared application state

use crate::auth::RateLimiter;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uc_core::{
    config::GatewayConfig,
    markup::{MarkupExpander, ShortcodeExpander},
    metrics::Metrics,
    notify::{CachePurger, ChangeNotifier, HttpPurger},
    session::SessionSigner,
    store::{FileStore, MemoryStore, SettingsStore},
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub store: Arc<dyn SettingsStore>,
    pub notifier: ChangeNotifier,
    pub expander: Arc<dyn MarkupExpander>,
    pub signer: SessionSigner,
    pub metrics: Metrics,
    pub login_limiter: Arc<RateLimiter>,
    pub http_client: reqwest::Client,
}

impl AppState {
    /// Wire up the store and purger named by the configuration
    pub fn from_config(config: GatewayConfig) -> Result<Self> {
        let store: Arc<dyn SettingsStore> = match &config.settings_path {
            Some(path) => {
                info!("Settings file: {:?}", path);
                Arc::new(FileStore::open(path).context("Failed to open settings file")?)
            }
            None => {
                info!("No settings_path configured, settings are kept in memory");
                Arc::new(MemoryStore::new())
            }
        };

        let purger: Option<Arc<dyn CachePurger>> = match &config.purge {
            Some(purge) => {
                let purger = HttpPurger::new(purge).context("Failed to create cache purger")?;
                info!("Cache purge target: {}", purger.describe());
                Some(Arc::new(purger))
            }
            None => {
                info!("No cache purge target configured");
                None
            }
        };

        Self::new(config, store, purger)
    }

    /// Assemble state from explicit collaborators
    pub fn new(
        config: GatewayConfig,
        store: Arc<dyn SettingsStore>,
        purger: Option<Arc<dyn CachePurger>>,
    ) -> Result<Self> {
        let key = config.session_key().context("Invalid session secret")?;
        let metrics = Metrics::new();

        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create upstream HTTP client")?;

        Ok(Self {
            notifier: ChangeNotifier::new(purger, metrics.clone()),
            expander: Arc::new(ShortcodeExpander::new(config.site_name.clone())),
            signer: SessionSigner::new(key),
            login_limiter: Arc::new(RateLimiter::per_minute(config.login_rate_limit_per_minute)),
            metrics,
            store,
            http_client,
            config: Arc::new(config),
        })
    }
}
