//! HTTP-level tests for the gateway: gating, proxying and the settings form.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use tower::ServiceExt;
use uc_core::config::{GatewayConfig, UserAccount};
use uc_core::notify::CachePurger;
use uc_core::session::{hash_password, SESSION_COOKIE};
use uc_core::store::{MemoryStore, SettingsStore};
use uc_core::{AccessMode, GateSettings, ADMIN_ROLE};
use uc_gateway::{build_router, AppState};

const VISITOR_IP: &str = "203.0.113.7";

// ── Fixtures ───────────────────────────────────────────────────

#[derive(Default)]
struct CountingPurger {
    calls: AtomicUsize,
}

#[async_trait]
impl CachePurger for CountingPurger {
    async fn purge_all(&self) -> uc_core::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "counting".to_string()
    }
}

struct BrokenStore;

impl SettingsStore for BrokenStore {
    fn load(&self) -> uc_core::Result<GateSettings> {
        Err(uc_core::Error::Store("disk unavailable".to_string()))
    }

    fn save(&self, _settings: &GateSettings) -> uc_core::Result<GateSettings> {
        Err(uc_core::Error::Store("disk unavailable".to_string()))
    }

    fn kind(&self) -> &'static str {
        "broken"
    }
}

fn account(username: &str, roles: &[&str]) -> UserAccount {
    UserAccount {
        username: username.to_string(),
        password_sha256: hash_password("password"),
        roles: roles.iter().map(|r| r.to_string()).collect(),
    }
}

fn test_config(upstream_url: &str) -> GatewayConfig {
    GatewayConfig {
        listen_address: "127.0.0.1:0".to_string(),
        upstream_url: upstream_url.to_string(),
        settings_path: None,
        session_secret: "00112233445566778899aabbccddeeff".to_string(),
        session_ttl_secs: 3600,
        users: vec![
            account("admin", &[ADMIN_ROLE]),
            account("reader", &["subscriber"]),
        ],
        site_name: "Example".to_string(),
        notice_status: 503,
        secure_cookies: false,
        login_rate_limit_per_minute: 10,
        purge: None,
        metrics_enabled: true,
    }
}

fn gated(mode: AccessMode) -> GateSettings {
    GateSettings {
        enabled: true,
        access_mode: mode,
        content: "<p>Back soon</p>".to_string(),
        ..Default::default()
    }
}

struct Harness {
    app: Router,
    state: AppState,
    store: Arc<MemoryStore>,
    purger: Arc<CountingPurger>,
}

fn harness_with(config: GatewayConfig, settings: &GateSettings) -> Harness {
    let store = Arc::new(MemoryStore::with_settings(settings));
    let purger = Arc::new(CountingPurger::default());
    let state = AppState::new(config, store.clone(), Some(purger.clone())).unwrap();
    let peer: SocketAddr = format!("{}:40000", VISITOR_IP).parse().unwrap();
    let app = build_router(state.clone()).layer(MockConnectInfo(peer));
    Harness {
        app,
        state,
        store,
        purger,
    }
}

fn harness(upstream_url: &str, settings: &GateSettings) -> Harness {
    harness_with(test_config(upstream_url), settings)
}

impl Harness {
    fn session_for(&self, username: &str) -> String {
        let account = self
            .state
            .config
            .users
            .iter()
            .find(|u| u.username == username)
            .unwrap();
        self.state
            .signer
            .issue(account, Duration::hours(1), Utc::now())
            .unwrap()
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn get_with_session(uri: &str, session: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::COOKIE, format!("{}={}", SESSION_COOKIE, session))
        .body(Body::empty())
        .unwrap()
}

fn post_form(uri: &str, session: Option<&str>, body: String) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(session) = session {
        builder = builder.header(header::COOKIE, format!("{}={}", SESSION_COOKIE, session));
    }
    builder.body(Body::from(body)).unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn location(response: &Response) -> &str {
    response.headers()[header::LOCATION].to_str().unwrap()
}

// ── Gating ─────────────────────────────────────────────────────

#[tokio::test]
async fn disabled_gate_proxies_to_upstream() {
    let mut upstream = mockito::Server::new_async().await;
    let page = upstream
        .mock("GET", mockito::Matcher::Regex("^/about".to_string()))
        .match_query(mockito::Matcher::UrlEncoded(
            "lang".to_string(),
            "en".to_string(),
        ))
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body("real site")
        .expect(1)
        .create_async()
        .await;

    let h = harness(&upstream.url(), &GateSettings::default());
    let response = h.send(get("/about?lang=en")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "real site");
    page.assert_async().await;
}

#[tokio::test]
async fn gateway_session_stays_on_the_gateway() {
    let mut upstream = mockito::Server::new_async().await;
    let page = upstream
        .mock("GET", "/")
        .match_header("cookie", "theme=dark")
        .with_body("real site")
        .expect(1)
        .create_async()
        .await;

    let h = harness(&upstream.url(), &gated(AccessMode::Administrators));
    let admin = h.session_for("admin");
    let request = Request::builder()
        .uri("/")
        .header(header::COOKIE, format!("theme=dark; {}={}", SESSION_COOKIE, admin))
        .body(Body::empty())
        .unwrap();

    let response = h.send(request).await;
    assert_eq!(body_text(response).await, "real site");
    page.assert_async().await;
}

#[tokio::test]
async fn anonymous_visitor_gets_notice_and_upstream_is_not_called() {
    let mut upstream = mockito::Server::new_async().await;
    let page = upstream.mock("GET", "/").expect(0).create_async().await;

    let h = harness(&upstream.url(), &gated(AccessMode::Administrators));
    let response = h.send(get("/")).await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/html; charset=utf-8"
    );
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    assert_eq!(body_text(response).await, "<p>Back soon</p>");
    page.assert_async().await;
    assert_eq!(h.state.metrics.notices_served(), 1);
}

#[tokio::test]
async fn empty_content_serves_fallback_message() {
    let mut settings = gated(AccessMode::Administrators);
    settings.content.clear();
    let h = harness("http://127.0.0.1:9", &settings);

    let body = body_text(h.send(get("/")).await).await;
    assert!(body.contains("Under Construction. Please check back later."));
}

#[tokio::test]
async fn shortcodes_expand_only_when_enabled() {
    let mut settings = gated(AccessMode::Administrators);
    settings.content = "<h1>[site_name]</h1>".to_string();
    let h = harness("http://127.0.0.1:9", &settings);
    assert_eq!(body_text(h.send(get("/")).await).await, "<h1>[site_name]</h1>");

    settings.process_dynamic_markup = true;
    let h = harness("http://127.0.0.1:9", &settings);
    assert_eq!(body_text(h.send(get("/")).await).await, "<h1>Example</h1>");
}

#[tokio::test]
async fn whitelisted_address_is_proxied() {
    let mut upstream = mockito::Server::new_async().await;
    let page = upstream
        .mock("GET", "/")
        .with_body("real site")
        .expect(1)
        .create_async()
        .await;

    let mut settings = gated(AccessMode::Administrators);
    settings.ip_whitelist = format!("10.0.0.1, {}", VISITOR_IP);
    let h = harness(&upstream.url(), &settings);

    let response = h.send(get("/")).await;
    assert_eq!(body_text(response).await, "real site");
    page.assert_async().await;
}

#[tokio::test]
async fn administrators_mode_bypasses_only_admins() {
    let mut upstream = mockito::Server::new_async().await;
    let page = upstream
        .mock("GET", "/")
        .with_body("real site")
        .expect(1)
        .create_async()
        .await;

    let h = harness(&upstream.url(), &gated(AccessMode::Administrators));

    let admin = h.session_for("admin");
    let response = h.send(get_with_session("/", &admin)).await;
    assert_eq!(body_text(response).await, "real site");

    let reader = h.session_for("reader");
    let response = h.send(get_with_session("/", &reader)).await;
    assert_eq!(body_text(response).await, "<p>Back soon</p>");

    page.assert_async().await;
}

#[tokio::test]
async fn all_users_mode_bypasses_any_login() {
    let mut upstream = mockito::Server::new_async().await;
    let page = upstream
        .mock("GET", "/")
        .with_body("real site")
        .expect(1)
        .create_async()
        .await;

    let h = harness(&upstream.url(), &gated(AccessMode::AllUsers));

    let reader = h.session_for("reader");
    let response = h.send(get_with_session("/", &reader)).await;
    assert_eq!(body_text(response).await, "real site");

    let response = h.send(get_with_session("/", "forged.token")).await;
    assert_eq!(body_text(response).await, "<p>Back soon</p>");

    page.assert_async().await;
}

#[tokio::test]
async fn unreadable_settings_pass_requests_through() {
    let mut upstream = mockito::Server::new_async().await;
    let page = upstream
        .mock("GET", "/")
        .with_body("real site")
        .expect(1)
        .create_async()
        .await;

    let state = AppState::new(test_config(&upstream.url()), Arc::new(BrokenStore), None).unwrap();
    let app = build_router(state);

    let response = app.oneshot(get("/")).await.unwrap();
    assert_eq!(body_text(response).await, "real site");
    page.assert_async().await;
}

#[tokio::test]
async fn unreachable_upstream_is_bad_gateway() {
    let h = harness("http://127.0.0.1:9", &GateSettings::default());
    let response = h.send(get("/")).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn admin_and_operational_routes_are_never_gated() {
    let h = harness("http://127.0.0.1:9", &gated(AccessMode::Administrators));

    let response = h.send(get("/uc-admin/login")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Log In"));

    let response = h.send(get("/health")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let health: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["gate_enabled"], true);

    let response = h.send(get("/metrics")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("uc_requests_total 0"));
}

#[tokio::test]
async fn metrics_can_be_disabled() {
    let mut config = test_config("http://127.0.0.1:9");
    config.metrics_enabled = false;
    let h = harness_with(config, &GateSettings::default());

    let response = h.send(get("/metrics")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ── Login ──────────────────────────────────────────────────────

#[tokio::test]
async fn admin_login_sets_session_cookie() {
    let h = harness("http://127.0.0.1:9", &gated(AccessMode::Administrators));

    let response = h
        .send(post_form(
            "/uc-admin/login",
            None,
            "username=admin&password=password".to_string(),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/uc-admin/settings");
    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("uc_session="));
    assert!(cookie.contains("HttpOnly"));
}

#[tokio::test]
async fn non_admin_login_returns_to_site() {
    let h = harness("http://127.0.0.1:9", &GateSettings::default());

    let response = h
        .send(post_form(
            "/uc-admin/login",
            None,
            "username=reader&password=password".to_string(),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn bad_password_is_rejected() {
    let h = harness("http://127.0.0.1:9", &GateSettings::default());

    let response = h
        .send(post_form(
            "/uc-admin/login",
            None,
            "username=admin&password=wrong".to_string(),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/uc-admin/login?error=1");
    assert!(!response.headers().contains_key(header::SET_COOKIE));
    assert_eq!(h.state.metrics.logins_failed(), 1);
}

#[tokio::test]
async fn login_attempts_are_rate_limited() {
    let mut config = test_config("http://127.0.0.1:9");
    config.login_rate_limit_per_minute = 2;
    let h = harness_with(config, &GateSettings::default());

    for _ in 0..2 {
        let response = h
            .send(post_form(
                "/uc-admin/login",
                None,
                "username=admin&password=wrong".to_string(),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }

    let response = h
        .send(post_form(
            "/uc-admin/login",
            None,
            "username=admin&password=password".to_string(),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn logout_clears_cookie() {
    let h = harness("http://127.0.0.1:9", &GateSettings::default());
    let admin = h.session_for("admin");
    let csrf = h.state.signer.csrf_token(&admin).unwrap();

    let response = h
        .send(post_form(
            "/uc-admin/logout",
            Some(&admin),
            format!("_token={}", csrf),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/uc-admin/login");
    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn logout_without_form_token_is_refused() {
    let h = harness("http://127.0.0.1:9", &GateSettings::default());
    let admin = h.session_for("admin");

    let response = h
        .send(post_form("/uc-admin/logout", Some(&admin), String::new()))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(response.headers().get(header::SET_COOKIE).is_none());

    // No live session means nothing to protect
    let response = h
        .send(post_form("/uc-admin/logout", None, String::new()))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn secure_cookies_are_marked_secure() {
    let mut config = test_config("http://127.0.0.1:9");
    config.secure_cookies = true;
    let h = harness_with(config, &GateSettings::default());

    let response = h
        .send(post_form(
            "/uc-admin/login",
            None,
            "username=admin&password=password".to_string(),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("uc_session="));
    assert!(cookie.ends_with("; Secure"));
}

// ── Settings form ──────────────────────────────────────────────

#[tokio::test]
async fn settings_page_requires_admin() {
    let h = harness("http://127.0.0.1:9", &GateSettings::default());

    let response = h.send(get("/uc-admin/settings")).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/uc-admin/login");

    let reader = h.session_for("reader");
    let response = h.send(get_with_session("/uc-admin/settings", &reader)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let admin = h.session_for("admin");
    let response = h.send(get_with_session("/uc-admin/settings", &admin)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains(r#"name="uc_enabled""#));
    let csrf = h.state.signer.csrf_token(&admin).unwrap();
    assert!(html.contains(&format!(
        r#"action="/uc-admin/logout"><input type="hidden" name="_token" value="{}">"#,
        csrf
    )));
    assert!(html.contains(r#"name="uc_html_content""#));
    assert!(html.contains("Reset to Default"));
}

#[tokio::test]
async fn saving_settings_purges_once_per_changed_gating_field() {
    let h = harness("http://127.0.0.1:9", &GateSettings::default());
    let admin = h.session_for("admin");
    let csrf = h.state.signer.csrf_token(&admin).unwrap();

    // enabled, content and whitelist change; rich editor is UI-only
    let body = format!(
        "_token={}&uc_enabled=1&uc_access_mode=administrators&uc_rich_editor=1\
         &uc_ip_whitelist=1.2.3.4&uc_html_content=%3Cp%3EBack+soon%3C%2Fp%3E",
        csrf
    );
    let response = h
        .send(post_form("/uc-admin/settings", Some(&admin), body.clone()))
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/uc-admin/settings?updated=1");

    let saved = h.store.load().unwrap();
    assert!(saved.enabled);
    assert!(saved.rich_editor);
    assert!(!saved.process_dynamic_markup);
    assert_eq!(saved.ip_whitelist, "1.2.3.4");
    assert_eq!(saved.content, "<p>Back soon</p>");
    assert_eq!(h.purger.calls.load(Ordering::SeqCst), 3);
    assert_eq!(h.state.metrics.settings_saves(), 1);

    // Saving the same form again changes nothing
    let response = h
        .send(post_form("/uc-admin/settings", Some(&admin), body))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(h.purger.calls.load(Ordering::SeqCst), 3);

    // The saved notice is live immediately
    let response = h.send(get("/")).await;
    assert_eq!(body_text(response).await, "<p>Back soon</p>");
}

#[tokio::test]
async fn unchecked_switches_turn_the_gate_off() {
    let h = harness("http://127.0.0.1:9", &gated(AccessMode::AllUsers));
    let admin = h.session_for("admin");
    let csrf = h.state.signer.csrf_token(&admin).unwrap();

    let body = format!(
        "_token={}&uc_access_mode=all_users&uc_ip_whitelist=&uc_html_content=%3Cp%3EBack+soon%3C%2Fp%3E",
        csrf
    );
    let response = h
        .send(post_form("/uc-admin/settings", Some(&admin), body))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    assert!(!h.store.load().unwrap().enabled);
    assert_eq!(h.purger.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn settings_save_rejects_bad_csrf_token() {
    let h = harness("http://127.0.0.1:9", &GateSettings::default());
    let admin = h.session_for("admin");
    let other_session = h.session_for("reader");
    let foreign_csrf = h.state.signer.csrf_token(&other_session).unwrap();

    let body = format!("_token={}&uc_enabled=1&uc_access_mode=administrators", foreign_csrf);
    let response = h
        .send(post_form("/uc-admin/settings", Some(&admin), body))
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(!h.store.load().unwrap().enabled);
    assert_eq!(h.purger.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn settings_save_requires_admin_session() {
    let h = harness("http://127.0.0.1:9", &GateSettings::default());
    let reader = h.session_for("reader");
    let csrf = h.state.signer.csrf_token(&reader).unwrap();

    let body = format!("_token={}&uc_enabled=1", csrf);
    let response = h
        .send(post_form("/uc-admin/settings", Some(&reader), body))
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(!h.store.load().unwrap().enabled);
}

#[tokio::test]
async fn file_backed_settings_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config("http://127.0.0.1:9");
    config.settings_path = Some(dir.path().join("settings.yaml"));

    let state = AppState::from_config(config.clone()).unwrap();
    assert_eq!(state.store.kind(), "file");
    let account = state.config.users[0].clone();
    let admin = state
        .signer
        .issue(&account, Duration::hours(1), Utc::now())
        .unwrap();
    let csrf = state.signer.csrf_token(&admin).unwrap();
    let app = build_router(state);

    let body = format!(
        "_token={}&uc_enabled=1&uc_access_mode=administrators&uc_html_content=Closed",
        csrf
    );
    let response = app
        .oneshot(post_form("/uc-admin/settings", Some(&admin), body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    // A fresh gateway over the same file serves the saved notice
    let app = build_router(AppState::from_config(config).unwrap());
    let response = app.oneshot(get("/")).await.unwrap();
    assert_eq!(body_text(response).await, "Closed");
}
