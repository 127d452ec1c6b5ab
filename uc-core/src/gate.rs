//! Access-gating policy
//!
//! Decides, for one page request, whether the visitor sees the real site or the
//! maintenance notice. The decision is a pure function of the settings snapshot,
//! the viewer and the request; nothing is retained between calls.
//!
//! Bypass rules are OR'd:
//! - role: administrators mode lets admin viewers through, all-users mode lets any
//!   authenticated viewer through
//! - IP: the request's source address equals one of the whitelist entries, compared
//!   as trimmed strings with no CIDR or address normalization

use crate::markup::MarkupExpander;
use crate::notice;
use crate::settings::{AccessMode, GateSettings};
use crate::ADMIN_ROLE;
use std::collections::BTreeSet;

/// Who is asking, as far as the gate is concerned
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Viewer {
    authenticated: bool,
    roles: BTreeSet<String>,
}

impl Viewer {
    /// A visitor with no valid session
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A logged-in visitor holding the given roles
    pub fn authenticated<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            authenticated: true,
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn is_admin(&self) -> bool {
        self.authenticated && self.has_role(ADMIN_ROLE)
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(String::as_str)
    }
}

/// Request attributes the gate consumes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestInfo {
    /// Peer address exactly as the server saw it; empty when unknown
    pub source_ip: String,
}

impl RequestInfo {
    pub fn new(source_ip: impl Into<String>) -> Self {
        Self {
            source_ip: source_ip.into(),
        }
    }
}

/// Which rule settled the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The gate is switched off
    Disabled,
    /// The viewer's login or role bypasses the gate
    RoleBypass,
    /// The source address is whitelisted
    IpBypass,
    /// No bypass applies; the notice is served
    Blocked,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::RoleBypass => "role",
            Self::IpBypass => "ip",
            Self::Blocked => "blocked",
        }
    }

    /// Turn the decision into what the server should do
    pub fn into_action(self, settings: &GateSettings, expander: &dyn MarkupExpander) -> Action {
        match self {
            Self::Blocked => Action::ServeNotice(render_notice(settings, expander)),
            _ => Action::PassThrough,
        }
    }
}

/// What the server should do with the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Continue to the real site
    PassThrough,
    /// Send this HTML and stop; nothing else may run for the request
    ServeNotice(String),
}

impl Action {
    pub fn is_pass_through(&self) -> bool {
        matches!(self, Self::PassThrough)
    }
}

/// Evaluate the gate for one request
pub fn evaluate(
    request: &RequestInfo,
    settings: &GateSettings,
    viewer: &Viewer,
    expander: &dyn MarkupExpander,
) -> Action {
    decide(request, settings, viewer).into_action(settings, expander)
}

/// Apply the bypass rules without rendering anything
pub fn decide(request: &RequestInfo, settings: &GateSettings, viewer: &Viewer) -> Decision {
    if !settings.enabled {
        return Decision::Disabled;
    }

    let role_bypass = match settings.access_mode {
        AccessMode::Administrators => viewer.is_admin(),
        AccessMode::AllUsers => viewer.is_authenticated(),
        AccessMode::Other(_) => false,
    };
    if role_bypass {
        return Decision::RoleBypass;
    }

    if is_whitelisted(&settings.ip_whitelist, &request.source_ip) {
        return Decision::IpBypass;
    }

    Decision::Blocked
}

/// Split a comma-separated whitelist into trimmed, non-empty entries
pub fn whitelist_entries(whitelist: &str) -> impl Iterator<Item = &str> {
    whitelist
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
}

/// Exact string membership of `ip` in the whitelist
pub fn is_whitelisted(whitelist: &str, ip: &str) -> bool {
    !ip.is_empty() && whitelist_entries(whitelist).any(|entry| entry == ip)
}

/// Body for a blocked visitor; never empty
pub fn render_notice(settings: &GateSettings, expander: &dyn MarkupExpander) -> String {
    if settings.content.is_empty() {
        return notice::fallback_document();
    }

    let body = if settings.process_dynamic_markup {
        expander.expand(&settings.content)
    } else {
        settings.content.clone()
    };

    if body.is_empty() {
        notice::fallback_document()
    } else {
        body
    }
}
