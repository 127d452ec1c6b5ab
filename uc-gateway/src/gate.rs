//! Gate middleware
//!
//! Runs before routing for every request. The admin surface and the
//! operational endpoints are never gated so an administrator can always reach
//! the settings form to switch the notice off.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use tracing::{debug, error};
use uc_core::gate::{decide, Action, RequestInfo};

use crate::{auth, AppState, ADMIN_PREFIX};

/// Paths served without consulting the gate
const EXEMPT_PATHS: &[&str] = &["/health", "/metrics"];

pub fn is_exempt(path: &str) -> bool {
    let admin = path == ADMIN_PREFIX
        || path
            .strip_prefix(ADMIN_PREFIX)
            .is_some_and(|rest| rest.starts_with('/'));
    admin || EXEMPT_PATHS.contains(&path)
}

pub async fn gate_requests(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    req: Request,
    next: Next,
) -> Response {
    if is_exempt(req.uri().path()) {
        return next.run(req).await;
    }

    let settings = match state.store.load() {
        Ok(settings) => settings,
        Err(e) => {
            // Unreadable settings must not take the site down
            error!("Failed to load gate settings, passing request through: {}", e);
            return next.run(req).await;
        }
    };

    let viewer = auth::viewer(&state, req.headers());
    let request = RequestInfo::new(auth::source_ip(connect.map(|ConnectInfo(addr)| addr)));
    let decision = decide(&request, &settings, &viewer);
    state.metrics.record_decision(decision);

    debug!(
        path = %req.uri().path(),
        source_ip = %request.source_ip,
        decision = decision.as_str(),
        "Gate evaluated"
    );

    match decision.into_action(&settings, state.expander.as_ref()) {
        Action::PassThrough => next.run(req).await,
        Action::ServeNotice(body) => notice_response(state.config.notice_status, body),
    }
}

/// Complete response for a blocked visitor
pub fn notice_response(status: u16, body: String) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
    let mut response = (status, body).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    if status == StatusCode::SERVICE_UNAVAILABLE {
        headers.insert(header::RETRY_AFTER, HeaderValue::from_static("3600"));
    }
    response
}
