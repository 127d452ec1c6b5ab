//! Reverse proxy to the real site

use axum::{
    body::{to_bytes, Body},
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use tracing::{debug, error};
use uc_core::session::SESSION_COOKIE;

use crate::AppState;

/// Largest request body forwarded upstream
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Headers that describe one connection and must not be forwarded
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Fallback handler: forward the request to `upstream_url`
pub async fn forward(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    req: Request,
) -> Response {
    let (parts, body) = req.into_parts();
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let target = upstream_target(&state.config.upstream_url, path);

    let body = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!("Rejected request body: {}", e);
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    let mut headers = strip_hop_by_hop(&parts.headers);
    headers.remove(header::HOST);
    strip_session_cookie(&mut headers);
    if let Some(ConnectInfo(addr)) = connect {
        append_forwarded_for(&mut headers, &addr.ip().to_string());
    }

    debug!(method = %parts.method, target = %target, "Proxying request");

    let upstream = state
        .http_client
        .request(parts.method, &target)
        .headers(headers)
        .body(body)
        .send()
        .await;

    match upstream {
        Ok(resp) => {
            let status = resp.status();
            let headers = strip_hop_by_hop(resp.headers());
            let mut response = Response::new(Body::from_stream(resp.bytes_stream()));
            *response.status_mut() = status;
            *response.headers_mut() = headers;
            response
        }
        Err(e) => {
            error!("Upstream request to {} failed: {}", target, e);
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}

/// Join the upstream base URL and the incoming path and query
pub fn upstream_target(upstream_url: &str, path_and_query: &str) -> String {
    format!("{}{}", upstream_url.trim_end_matches('/'), path_and_query)
}

/// Copy of `headers` without hop-by-hop entries, including those named in `Connection`
pub fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut connection_listed: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();
    connection_listed.extend(HOP_BY_HOP.iter().map(|name| name.to_string()));

    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !connection_listed.iter().any(|hop| hop == name.as_str()) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

/// Drop the gateway's own session from `Cookie` so the site never sees it
pub fn strip_session_cookie(headers: &mut HeaderMap) {
    if !headers.contains_key(header::COOKIE) {
        return;
    }
    let kept: Vec<String> = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .filter(|pair| pair.split('=').next() != Some(SESSION_COOKIE))
        .map(str::to_string)
        .collect();

    headers.remove(header::COOKIE);
    if kept.is_empty() {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(&kept.join("; ")) {
        headers.insert(header::COOKIE, value);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, ip: &str) {
    let name = HeaderName::from_static("x-forwarded-for");
    let value = match headers.get(&name).and_then(|v| v.to_str().ok()) {
        Some(existing) => format!("{}, {}", existing, ip),
        None => ip.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(name, value);
    }
}
