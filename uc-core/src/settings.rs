//! The gate's configuration record and its key/value encoding
//!
//! Settings are persisted as a flat map of string options, the way the admin form
//! posts them. Every read goes through [`GateSettings::from_map`], which defaults
//! each missing or malformed value so that an empty store means a disabled gate.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Raw persisted form: option key to string value
pub type SettingsMap = BTreeMap<String, String>;

/// Option keys as they appear in the store and in the settings form
pub mod keys {
    pub const ENABLED: &str = "uc_enabled";
    pub const ACCESS_MODE: &str = "uc_access_mode";
    pub const IP_WHITELIST: &str = "uc_ip_whitelist";
    pub const CONTENT: &str = "uc_html_content";
    pub const PROCESS_SHORTCODES: &str = "uc_process_shortcodes";
    pub const RICH_EDITOR: &str = "uc_rich_editor";
}

/// One persisted option
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    Enabled,
    AccessMode,
    IpWhitelist,
    Content,
    ProcessDynamicMarkup,
    RichEditor,
}

impl SettingKey {
    /// Every option the settings form writes
    pub const ALL: [SettingKey; 6] = [
        SettingKey::Enabled,
        SettingKey::AccessMode,
        SettingKey::RichEditor,
        SettingKey::ProcessDynamicMarkup,
        SettingKey::IpWhitelist,
        SettingKey::Content,
    ];

    /// Options whose value changes what visitors see
    pub const GATING: [SettingKey; 5] = [
        SettingKey::Enabled,
        SettingKey::Content,
        SettingKey::AccessMode,
        SettingKey::ProcessDynamicMarkup,
        SettingKey::IpWhitelist,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enabled => keys::ENABLED,
            Self::AccessMode => keys::ACCESS_MODE,
            Self::IpWhitelist => keys::IP_WHITELIST,
            Self::Content => keys::CONTENT,
            Self::ProcessDynamicMarkup => keys::PROCESS_SHORTCODES,
            Self::RichEditor => keys::RICH_EDITOR,
        }
    }

    /// Whether a change to this option must invalidate cached pages
    pub fn is_gating(&self) -> bool {
        !matches!(self, Self::RichEditor)
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which authenticated visitors bypass the gate
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// Only viewers holding the administrator role
    #[default]
    Administrators,
    /// Any logged-in viewer
    AllUsers,
    /// A stored value that names neither tier; grants no role-based bypass
    Other(String),
}

impl AccessMode {
    pub fn parse(s: &str) -> Self {
        match s {
            "administrators" => Self::Administrators,
            "all_users" => Self::AllUsers,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Administrators => "administrators",
            Self::AllUsers => "all_users",
            Self::Other(s) => s,
        }
    }
}

impl Serialize for AccessMode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AccessMode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

/// Snapshot of the gate configuration, read once per request
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GateSettings {
    /// Master switch for the gate
    pub enabled: bool,
    /// Which authenticated tier bypasses
    pub access_mode: AccessMode,
    /// Comma-separated IP literals that always bypass
    pub ip_whitelist: String,
    /// HTML served to blocked visitors
    pub content: String,
    /// Expand shortcodes in `content` before serving it
    pub process_dynamic_markup: bool,
    /// Admin form preference only; never affects gating
    pub rich_editor: bool,
}

impl GateSettings {
    /// Decode settings from persisted options, defaulting anything missing
    pub fn from_map(map: &SettingsMap) -> Self {
        let get = |key: &str| map.get(key).map(String::as_str);

        Self {
            enabled: get(keys::ENABLED).map(parse_flag).unwrap_or(false),
            access_mode: get(keys::ACCESS_MODE)
                .map(AccessMode::parse)
                .unwrap_or_default(),
            ip_whitelist: get(keys::IP_WHITELIST).unwrap_or_default().to_string(),
            content: get(keys::CONTENT).unwrap_or_default().to_string(),
            process_dynamic_markup: get(keys::PROCESS_SHORTCODES)
                .map(parse_flag)
                .unwrap_or(false),
            rich_editor: get(keys::RICH_EDITOR).map(parse_flag).unwrap_or(false),
        }
    }

    /// Encode every option into its persisted string form
    pub fn to_map(&self) -> SettingsMap {
        SettingKey::ALL
            .iter()
            .map(|key| (key.as_str().to_string(), self.value_of(*key)))
            .collect()
    }

    /// Persisted string form of a single option
    pub fn value_of(&self, key: SettingKey) -> String {
        match key {
            SettingKey::Enabled => flag(self.enabled),
            SettingKey::AccessMode => self.access_mode.as_str().to_string(),
            SettingKey::IpWhitelist => self.ip_whitelist.clone(),
            SettingKey::Content => self.content.clone(),
            SettingKey::ProcessDynamicMarkup => flag(self.process_dynamic_markup),
            SettingKey::RichEditor => flag(self.rich_editor),
        }
    }

    /// Options whose persisted value differs between `self` and `other`
    pub fn changed_keys(&self, other: &GateSettings) -> Vec<SettingKey> {
        SettingKey::ALL
            .into_iter()
            .filter(|key| self.value_of(*key) != other.value_of(*key))
            .collect()
    }
}

/// Stored flags are on only when they read as the integer 1
fn parse_flag(value: &str) -> bool {
    value.trim().parse::<i64>().map(|v| v == 1).unwrap_or(false)
}

fn flag(on: bool) -> String {
    let value = if on { "1" } else { "0" };
    value.to_string()
}
