//! Administrative surface: login and the settings form

use axum::{
    extract::{ConnectInfo, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use chrono::Utc;
use serde::Deserialize;
use std::net::SocketAddr;
use tracing::{error, info, warn};
use uc_core::{
    notice::{escape_html, DEFAULT_CONTENT},
    session::authenticate,
    AccessMode, GateSettings, Viewer,
};

use crate::{auth, AppState};

const LOGIN_PATH: &str = "/uc-admin/login";
const SETTINGS_PATH: &str = "/uc-admin/settings";

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
pub struct LogoutForm {
    #[serde(rename = "_token", default)]
    token: String,
}

#[derive(Debug, Deserialize)]
pub struct SettingsQuery {
    updated: Option<String>,
}

/// Settings form as posted; unchecked switches are simply absent
#[derive(Debug, Deserialize)]
pub struct SettingsForm {
    #[serde(rename = "_token", default)]
    token: String,
    #[serde(rename = "uc_enabled")]
    enabled: Option<String>,
    #[serde(rename = "uc_access_mode")]
    access_mode: Option<String>,
    #[serde(rename = "uc_rich_editor")]
    rich_editor: Option<String>,
    #[serde(rename = "uc_process_shortcodes")]
    process_shortcodes: Option<String>,
    #[serde(rename = "uc_ip_whitelist", default)]
    ip_whitelist: String,
    #[serde(rename = "uc_html_content", default)]
    html_content: String,
}

impl SettingsForm {
    pub fn into_settings(self) -> GateSettings {
        let checked = |field: Option<String>| field.is_some_and(|v| v.trim() == "1");
        GateSettings {
            enabled: checked(self.enabled),
            access_mode: self
                .access_mode
                .as_deref()
                .map(str::trim)
                .filter(|mode| !mode.is_empty())
                .map(AccessMode::parse)
                .unwrap_or_default(),
            ip_whitelist: self.ip_whitelist,
            content: self.html_content,
            process_dynamic_markup: checked(self.process_shortcodes),
            rich_editor: checked(self.rich_editor),
        }
    }
}

/// GET /uc-admin/login
pub async fn login_page(Query(query): Query<LoginQuery>) -> Html<String> {
    let message = if query.error.is_some() {
        r#"<p class="error">Invalid username or password.</p>"#
    } else {
        ""
    };
    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"><title>Log In</title></head>
<body>
<h1>Log In</h1>
{message}
<form method="post" action="{LOGIN_PATH}">
<p><label>Username <input type="text" name="username" autocomplete="username"></label></p>
<p><label>Password <input type="password" name="password" autocomplete="current-password"></label></p>
<p><button type="submit">Log In</button></p>
</form>
</body>
</html>
"#
    ))
}

/// POST /uc-admin/login
pub async fn login(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    Form(form): Form<LoginForm>,
) -> Response {
    let source_ip = auth::source_ip(connect.map(|ConnectInfo(addr)| addr));
    if !state.login_limiter.check(&source_ip) {
        warn!("Login rate limit exceeded for {}", source_ip);
        return StatusCode::TOO_MANY_REQUESTS.into_response();
    }

    let Some(account) = authenticate(&state.config.users, &form.username, &form.password) else {
        state.metrics.record_login_failure();
        warn!(user = %form.username, source_ip = %source_ip, "Rejected login");
        return Redirect::to(&format!("{}?error=1", LOGIN_PATH)).into_response();
    };

    let ttl = state.config.session_ttl();
    let token = match state.signer.issue(account, ttl, Utc::now()) {
        Ok(token) => token,
        Err(e) => {
            error!("Failed to issue session: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    info!(user = %account.username, "Logged in");

    let viewer = Viewer::authenticated(account.roles.iter().cloned());
    let destination = if viewer.is_admin() { SETTINGS_PATH } else { "/" };
    let cookie = auth::session_cookie(
        &token,
        ttl.num_seconds().max(0) as u64,
        state.config.secure_cookies,
    );
    ([(header::SET_COOKIE, cookie)], Redirect::to(destination)).into_response()
}

/// POST /uc-admin/logout
///
/// A live session must come with its form token; anything else is just cleared.
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<LogoutForm>,
) -> Response {
    if let Some(session) = auth::session_token(&headers) {
        let live = auth::viewer(&state, &headers).is_authenticated();
        if live && !state.signer.verify_csrf(&session, &form.token) {
            warn!("Logout submitted with an invalid token");
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    (
        [(
            header::SET_COOKIE,
            auth::clear_session_cookie(state.config.secure_cookies),
        )],
        Redirect::to(LOGIN_PATH),
    )
        .into_response()
}

/// Session token of an administrator, or the response that turns the request away
fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<String, Response> {
    let viewer = auth::viewer(state, headers);
    if !viewer.is_authenticated() {
        return Err(Redirect::to(LOGIN_PATH).into_response());
    }
    if !viewer.is_admin() {
        return Err(StatusCode::FORBIDDEN.into_response());
    }
    auth::session_token(headers).ok_or_else(|| Redirect::to(LOGIN_PATH).into_response())
}

/// GET /uc-admin/settings
pub async fn settings_page(
    State(state): State<AppState>,
    Query(query): Query<SettingsQuery>,
    headers: HeaderMap,
) -> Response {
    let session = match require_admin(&state, &headers) {
        Ok(session) => session,
        Err(response) => return response,
    };

    let settings = match state.store.load() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load settings: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let csrf = match state.signer.csrf_token(&session) {
        Ok(csrf) => csrf,
        Err(e) => {
            error!("Failed to create form token: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    Html(render_settings_form(&settings, &csrf, query.updated.is_some())).into_response()
}

/// POST /uc-admin/settings
pub async fn save_settings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<SettingsForm>,
) -> Response {
    let session = match require_admin(&state, &headers) {
        Ok(session) => session,
        Err(response) => return response,
    };

    if !state.signer.verify_csrf(&session, &form.token) {
        warn!("Settings form submitted with an invalid token");
        return StatusCode::FORBIDDEN.into_response();
    }

    let settings = form.into_settings();
    let previous = match state.store.save(&settings) {
        Ok(previous) => previous,
        Err(e) => {
            error!("Failed to save settings: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    state.metrics.record_settings_save();

    let changed = previous.changed_keys(&settings);
    let invalidations = state.notifier.on_settings_saved(&previous, &settings).await;
    info!(
        enabled = settings.enabled,
        access_mode = settings.access_mode.as_str(),
        changed = changed.len(),
        invalidations,
        "Settings saved"
    );

    Redirect::to(&format!("{}?updated=1", SETTINGS_PATH)).into_response()
}

/// Text for a `<script>` string literal holding the default template
fn default_content_js() -> String {
    serde_json::to_string(DEFAULT_CONTENT)
        .unwrap_or_else(|_| "\"\"".to_string())
        .replace("</", "<\\/")
}

fn switch(name: &str, status_id: &str, on: bool) -> String {
    let checked = if on { " checked" } else { "" };
    let status = if on { "Enabled" } else { "Disabled" };
    format!(
        r#"<label class="switch">
<input type="checkbox" name="{name}" value="1"{checked} onchange="document.getElementById('{status_id}').textContent = this.checked ? 'Enabled' : 'Disabled'">
<span class="slider round"></span>
</label>
<span id="{status_id}" class="status">{status}</span>"#
    )
}

fn access_mode_options(current: &AccessMode) -> String {
    let mut options = String::new();
    for (mode, label) in [
        (AccessMode::Administrators, "Only Administrators"),
        (AccessMode::AllUsers, "All Logged In Users"),
    ] {
        let selected = if &mode == current { " selected" } else { "" };
        options.push_str(&format!(
            "<option value=\"{}\"{}>{}</option>\n",
            mode.as_str(),
            selected,
            label
        ));
    }
    // Keep a stored value the form does not know so saving does not silently change it
    if let AccessMode::Other(value) = current {
        let value = escape_html(value);
        options.push_str(&format!(
            "<option value=\"{value}\" selected>{value}</option>\n"
        ));
    }
    options
}

pub fn render_settings_form(settings: &GateSettings, csrf: &str, updated: bool) -> String {
    let content = if settings.content.is_empty() {
        DEFAULT_CONTENT
    } else {
        settings.content.as_str()
    };
    let updated = if updated {
        r#"<div class="notice"><p>Settings saved.</p></div>"#
    } else {
        ""
    };
    let editor = if settings.rich_editor { "rich" } else { "plain" };

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="UTF-8">
<title>Under Construction Settings</title>
<style>
.switch {{ position: relative; display: inline-block; width: 40px; height: 24px; }}
.switch input {{ opacity: 0; width: 0; height: 0; }}
.slider {{ position: absolute; cursor: pointer; top: 0; left: 0; right: 0; bottom: 0; background-color: #ccc; transition: .4s; }}
.slider:before {{ position: absolute; content: ""; height: 16px; width: 16px; left: 4px; bottom: 4px; background-color: white; transition: .4s; }}
input:checked + .slider {{ background-color: #2196F3; }}
input:focus + .slider {{ box-shadow: 0 0 1px #2196F3; }}
input:checked + .slider:before {{ transform: translateX(16px); }}
.slider.round {{ border-radius: 24px; }}
.slider.round:before {{ border-radius: 50%; }}
.description {{ margin-top: 5px; }}
.status {{ vertical-align: middle; margin-left: 7px; font-weight: 500; }}
</style>
</head>
<body>
<h1>Under Construction Settings</h1>
{updated}
<form method="post" action="{SETTINGS_PATH}">
<input type="hidden" name="_token" value="{csrf}">
<table class="form-table">
<tr><th scope="row">Under Construction Page</th><td>
{enabled}
</td></tr>
<tr><th scope="row">Bypass under construction page</th><td>
<select name="uc_access_mode">
{access_modes}</select>
<p class="description">Select who can access the original site content when the under construction page is enabled.</p>
</td></tr>
<tr><th scope="row">Enable Rich Text Editor</th><td>
{rich_editor}
<p class="description">Enable this to use a rich text editor instead of plain HTML editing.</p>
</td></tr>
<tr><th scope="row">Process Shortcodes</th><td>
{shortcodes}
<p class="description">Enable this to process shortcodes such as [year], [date] and [site_name] in your HTML content.</p>
</td></tr>
<tr><th scope="row">Whitelisted IP Addresses</th><td>
<input type="text" name="uc_ip_whitelist" value="{whitelist}" size="50">
<p class="description">Comma-separated list of IP addresses to bypass the under construction page.</p>
</td></tr>
<tr><th scope="row">HTML Content</th><td>
<textarea id="uc_html_content" name="uc_html_content" rows="16" cols="80" class="large-text code" data-editor="{editor}">{content}</textarea>
<p class="description">Enter the (HTML) content to display on the under construction page. <button type="button" id="reset-html-content">Reset to Default</button></p>
</td></tr>
</table>
<p><button type="submit">Save Changes</button></p>
</form>
<form method="post" action="/uc-admin/logout"><input type="hidden" name="_token" value="{csrf}"><button type="submit">Log Out</button></form>
<script>
document.getElementById('reset-html-content').addEventListener('click', function () {{
    var defaultContent = {default_content};
    if (!confirm('Are you sure you want to reset the HTML content to default?')) {{
        return;
    }}
    document.getElementById('uc_html_content').value = defaultContent;
}});
</script>
</body>
</html>
"#,
        enabled = switch("uc_enabled", "uc-status", settings.enabled),
        access_modes = access_mode_options(&settings.access_mode),
        rich_editor = switch("uc_rich_editor", "uc-rich-editor-status", settings.rich_editor),
        shortcodes = switch(
            "uc_process_shortcodes",
            "uc-shortcodes-status",
            settings.process_dynamic_markup
        ),
        whitelist = escape_html(&settings.ip_whitelist),
        content = escape_html(content),
        default_content = default_content_js(),
    )
}
