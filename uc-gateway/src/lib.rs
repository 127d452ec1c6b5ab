//! Under Construction Gateway
//!
//! Public-facing HTTP front for a website. Every page request passes through the
//! maintenance gate; visitors who are not allowed to bypass it receive the notice,
//! everyone else is proxied to the real site.
//!
//! # Routes
//!
//! - `GET|POST /uc-admin/login`, `POST /uc-admin/logout`: session management
//! - `GET|POST /uc-admin/settings`: the settings form (administrators only)
//! - `GET /health`: liveness and gate status
//! - `GET /metrics`: Prometheus metrics
//! - anything else: gated, then proxied to the upstream site

pub mod admin;
pub mod auth;
pub mod gate;
pub mod proxy;
pub mod state;

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::error;

pub use state::AppState;

/// Path prefix of the administrative surface
pub const ADMIN_PREFIX: &str = "/uc-admin";

/// Build the full router with gate middleware and admin routes
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/uc-admin/login", get(admin::login_page).post(admin::login))
        .route("/uc-admin/logout", post(admin::logout))
        .route(
            "/uc-admin/settings",
            get(admin::settings_page).post(admin::save_settings),
        )
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics))
        .fallback(proxy::forward)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            gate::gate_requests,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: &'static str,
    version: &'static str,
    gate_enabled: bool,
    settings_store: &'static str,
    uptime_seconds: u64,
}

/// GET /health - Liveness plus the current gate state
async fn health_check(State(state): State<AppState>) -> Response {
    match state.store.load() {
        Ok(settings) => Json(HealthStatus {
            status: "ok",
            version: uc_core::VERSION,
            gate_enabled: settings.enabled,
            settings_store: state.store.kind(),
            uptime_seconds: state.metrics.uptime_seconds(),
        })
        .into_response(),
        Err(e) => {
            error!("Health check could not read settings: {}", e);
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

/// GET /metrics - Prometheus metrics
async fn get_metrics(State(state): State<AppState>) -> Response {
    if !state.config.metrics_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }
    state.metrics.prometheus_format().into_response()
}
