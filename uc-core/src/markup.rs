//! Shortcode expansion for notice content
//!
//! Recognizes self-closing shortcodes of the form `[tag attr="value" other=x]`.
//! A doubled bracket `[[tag]]` is an escape and renders as the literal `[tag]`.
//! Tags with no registered handler are left in the output verbatim.

use crate::notice::escape_html;
use chrono::{DateTime, Datelike, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;
use std::sync::Arc;

/// Parsed shortcode attributes
pub type Attributes = BTreeMap<String, String>;

/// Renders one shortcode occurrence
pub type ShortcodeHandler = Arc<dyn Fn(&Attributes) -> String + Send + Sync>;

/// Anything that can macro-expand notice content
pub trait MarkupExpander: Send + Sync {
    fn expand(&self, html: &str) -> String;
}

/// Registry of shortcode handlers
#[derive(Clone)]
pub struct ShortcodeExpander {
    handlers: HashMap<String, ShortcodeHandler>,
}

const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

impl ShortcodeExpander {
    /// Expander with the built-in `year`, `date` and `site_name` tags
    pub fn new(site_name: impl Into<String>) -> Self {
        Self::with_clock(site_name, Utc::now)
    }

    /// Same as [`ShortcodeExpander::new`] with an injectable clock
    pub fn with_clock(site_name: impl Into<String>, now: fn() -> DateTime<Utc>) -> Self {
        let site_name = escape_html(&site_name.into());
        let mut expander = Self::empty();

        expander.register("year", move |_| now().year().to_string());
        expander.register("date", move |attrs| {
            let format = attrs
                .get("format")
                .map(String::as_str)
                .unwrap_or(DEFAULT_DATE_FORMAT);
            format_date(now(), format)
        });
        expander.register("site_name", move |_| site_name.clone());
        expander
    }

    /// Expander with no tags registered
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register or replace the handler for `tag`
    pub fn register<F>(&mut self, tag: impl Into<String>, handler: F)
    where
        F: Fn(&Attributes) -> String + Send + Sync + 'static,
    {
        self.handlers.insert(tag.into(), Arc::new(handler));
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.handlers.contains_key(tag)
    }

    fn render(&self, inner: &str) -> Option<String> {
        let (tag, rest) = split_tag(inner)?;
        let handler = self.handlers.get(tag)?;
        Some(handler(&parse_attributes(rest)))
    }
}

impl MarkupExpander for ShortcodeExpander {
    fn expand(&self, html: &str) -> String {
        let mut out = String::with_capacity(html.len());
        let mut rest = html;

        while let Some(open) = rest.find('[') {
            out.push_str(&rest[..open]);
            let candidate = &rest[open..];

            if let Some(escaped) = candidate.strip_prefix("[[") {
                if let Some(close) = escaped.find("]]") {
                    out.push('[');
                    out.push_str(&escaped[..close]);
                    out.push(']');
                    rest = &escaped[close + 2..];
                    continue;
                }
            }

            let Some(close) = candidate[1..].find(']') else {
                out.push_str(candidate);
                rest = "";
                break;
            };
            let inner = &candidate[1..close + 1];
            // A nested '[' means this bracket did not open a shortcode
            if inner.contains('[') {
                out.push('[');
                rest = &candidate[1..];
                continue;
            }

            match self.render(inner) {
                Some(rendered) => out.push_str(&rendered),
                None => out.push_str(&candidate[..close + 2]),
            }
            rest = &candidate[close + 2..];
        }

        out.push_str(rest);
        out
    }
}

/// Split `tag attrs...` into the tag name and the attribute text
fn split_tag(inner: &str) -> Option<(&str, &str)> {
    let end = inner
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
        .unwrap_or(inner.len());
    if end == 0 {
        return None;
    }
    let (tag, rest) = inner.split_at(end);
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) && rest.trim() != "/" {
        return None;
    }
    Some((tag, rest.trim().trim_end_matches('/')))
}

/// Parse `key="v" key='v' key=v` pairs; bare words become flags with empty values
fn parse_attributes(text: &str) -> Attributes {
    let mut attrs = Attributes::new();
    let mut rest = text.trim_start();

    while !rest.is_empty() {
        let name_end = rest
            .find(|c: char| c == '=' || c.is_whitespace())
            .unwrap_or(rest.len());
        let name = rest[..name_end].to_ascii_lowercase();
        rest = rest[name_end..].trim_start();

        let value = if let Some(after_eq) = rest.strip_prefix('=') {
            let after_eq = after_eq.trim_start();
            let (value, remaining) = match after_eq.chars().next() {
                Some(quote @ ('"' | '\'')) => {
                    let body = &after_eq[1..];
                    match body.find(quote) {
                        Some(end) => (&body[..end], &body[end + 1..]),
                        None => (body, ""),
                    }
                }
                _ => {
                    let end = after_eq.find(char::is_whitespace).unwrap_or(after_eq.len());
                    (&after_eq[..end], &after_eq[end..])
                }
            };
            rest = remaining;
            value.to_string()
        } else {
            String::new()
        };

        if !name.is_empty() {
            attrs.insert(name, value);
        }
        rest = rest.trim_start();
    }

    attrs
}

fn format_date(now: DateTime<Utc>, format: &str) -> String {
    let mut out = String::new();
    match write!(out, "{}", now.format(format)) {
        Ok(()) => escape_html(&out),
        Err(_) => now.format(DEFAULT_DATE_FORMAT).to_string(),
    }
}
