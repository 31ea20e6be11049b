use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::common::constants::{
    DEFAULT_AD_DATA_SCHEMA, DEFAULT_PAGE_DATA_SCHEMA, DEFAULT_SCREEN_DATA_SCHEMA,
    DEFAULT_U2S_DATA_SCHEMA, DEFAULT_USER_DATA_SCHEMA,
};

const IGLU_PREFIX: &str = "iglu:";

/// A `vendor/name/format/version` schema URI.
///
/// Two identifiers are equal when vendor and name match; format and version
/// are informational because trackers bump versions independently of us.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchemaIdentifier {
    pub vendor: String,
    pub name: String,
    pub format: String,
    pub version: String,
}

impl SchemaIdentifier {
    /// Parses `iglu:vendor/name/format/version`. The `iglu:` prefix and the
    /// trailing parts are optional. Returns `None` when vendor or name is missing.
    pub fn parse(uri: &str) -> Option<Self> {
        let trimmed = uri.trim();
        let body = trimmed.strip_prefix(IGLU_PREFIX).unwrap_or(trimmed);
        let mut parts = body.split('/');
        let vendor = parts.next().filter(|s| !s.is_empty())?;
        let name = parts.next().filter(|s| !s.is_empty())?;
        Some(Self {
            vendor: vendor.to_string(),
            name: name.to_string(),
            format: parts.next().unwrap_or_default().to_string(),
            version: parts.next().unwrap_or_default().to_string(),
        })
    }

    /// `vendor/name`, the part used for registry lookups.
    pub fn key(&self) -> String {
        format!("{}/{}", self.vendor, self.name)
    }
}

impl PartialEq for SchemaIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.vendor == other.vendor && self.name == other.name
    }
}

impl Eq for SchemaIdentifier {}

impl Hash for SchemaIdentifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.vendor.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Display for SchemaIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}/{}/{}", IGLU_PREFIX, self.vendor, self.name, self.format, self.version)
    }
}

/// The semantic slot a resolved context lands in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Bucket {
    Page,
    User,
    Screen,
    Ad,
    WebPage,
    Session,
    Mobile,
    Application,
    MobileScreen,
    Browser,
    Geolocation,
    AmpSession,
    AmpId,
    AmpWebPage,
    Static,
    BrowserPerf,
    ClientHints,
    GaCookies,
    /// Known supplementary data attached to the unstructured event under a fixed key.
    Attachment(&'static str),
    /// Unrecognized schema; the payload is kept in `extra` under the schema name.
    Extra(String),
}

impl Bucket {
    pub fn name(&self) -> Cow<'_, str> {
        let name = match self {
            Bucket::Page => "page",
            Bucket::User => "user",
            Bucket::Screen => "screen",
            Bucket::Ad => "ad",
            Bucket::WebPage => "webpage",
            Bucket::Session => "session",
            Bucket::Mobile => "mobile",
            Bucket::Application => "application",
            Bucket::MobileScreen => "mobile_screen",
            Bucket::Browser => "browser",
            Bucket::Geolocation => "geolocation",
            Bucket::AmpSession => "amp_session",
            Bucket::AmpId => "amp_id",
            Bucket::AmpWebPage => "amp_web_page",
            Bucket::Static => "static",
            Bucket::BrowserPerf => "browser_perf",
            Bucket::ClientHints => "client_hints",
            Bucket::GaCookies => "ga_cookies",
            Bucket::Attachment(key) => return Cow::Owned(format!("attachment:{key}")),
            Bucket::Extra(name) => return Cow::Owned(format!("extra:{name}")),
        };
        Cow::Borrowed(name)
    }
}

/// How an unstructured event payload is folded into the row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Carries structured-event fields (action, category, ...).
    Structured,
    /// Mobile screen view, rewritten to a page view.
    ScreenView,
    /// AMP page ping, rewritten to a page ping.
    AmpPagePing,
    /// Any other event, stored as `{name: payload}`.
    Named(String),
}

/// vendor/name pairs of the collector's own context schemas.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CustomSchemas {
    pub page_data: String,
    pub user_data: String,
    pub screen_data: String,
    pub ad_data: String,
    pub u2s_data: String,
}

impl Default for CustomSchemas {
    fn default() -> Self {
        Self {
            page_data: DEFAULT_PAGE_DATA_SCHEMA.to_string(),
            user_data: DEFAULT_USER_DATA_SCHEMA.to_string(),
            screen_data: DEFAULT_SCREEN_DATA_SCHEMA.to_string(),
            ad_data: DEFAULT_AD_DATA_SCHEMA.to_string(),
            u2s_data: DEFAULT_U2S_DATA_SCHEMA.to_string(),
        }
    }
}

const BUILTIN_CONTEXTS: &[(&str, Bucket)] = &[
    ("com.snowplowanalytics.snowplow/web_page", Bucket::WebPage),
    ("com.snowplowanalytics.snowplow/client_session", Bucket::Session),
    ("com.snowplowanalytics.snowplow/mobile_context", Bucket::Mobile),
    ("com.snowplowanalytics.mobile/application", Bucket::Application),
    ("com.snowplowanalytics.mobile/screen", Bucket::MobileScreen),
    ("com.snowplowanalytics.snowplow/browser_context", Bucket::Browser),
    ("com.snowplowanalytics.snowplow/geolocation_context", Bucket::Geolocation),
    ("dev.amp.snowplow/amp_session", Bucket::AmpSession),
    ("dev.amp.snowplow/amp_id", Bucket::AmpId),
    ("dev.amp.snowplow/amp_web_page", Bucket::AmpWebPage),
    ("com.acme/static_context", Bucket::Static),
    ("org.w3/PerformanceTiming", Bucket::BrowserPerf),
    ("org.ietf/http_client_hints", Bucket::ClientHints),
    ("com.google.analytics/cookies", Bucket::GaCookies),
    ("com.google.ga4/cookies", Bucket::GaCookies),
    ("com.snowplowanalytics.mobile/screen_summary", Bucket::Attachment("screen_summary")),
    ("com.snowplowanalytics.mobile/application_lifecycle", Bucket::Attachment("app_lifecycle")),
    ("com.android.installreferrer.api/referrer_details", Bucket::Attachment("install_referrer")),
    ("org.w3/PerformanceNavigationTiming", Bucket::Attachment("performance_navigation_timing")),
    ("com.snowplowanalytics.mobile/deep_link_received", Bucket::Attachment("deep_link_received")),
    ("com.snowplowanalytics.mobile/message_notification", Bucket::Attachment("message_notification")),
];

const BUILTIN_EVENTS: &[(&str, EventKind)] = &[
    ("com.snowplowanalytics.mobile/screen_view", EventKind::ScreenView),
    ("com.snowplowanalytics.snowplow/screen_view", EventKind::ScreenView),
    ("dev.amp.snowplow/amp_page_ping", EventKind::AmpPagePing),
];

/// Static lookup from schema identifiers to buckets and event kinds.
///
/// Built once at startup and shared read-only; adding a recognized context
/// type is a matter of registering it here.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    contexts: HashMap<String, Bucket>,
    events: HashMap<String, EventKind>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new(&CustomSchemas::default())
    }
}

impl SchemaRegistry {
    /// Builds the registry from the built-in tables plus the configured
    /// custom schemas.
    pub fn new(custom: &CustomSchemas) -> Self {
        let mut registry = Self {
            contexts: HashMap::new(),
            events: HashMap::new(),
        };

        for (key, bucket) in BUILTIN_CONTEXTS {
            registry.register_context(key, bucket.clone());
        }
        for (key, kind) in BUILTIN_EVENTS {
            registry.register_event(key, kind.clone());
        }

        registry.register_context(&custom.page_data, Bucket::Page);
        registry.register_context(&custom.user_data, Bucket::User);
        registry.register_context(&custom.screen_data, Bucket::Screen);
        registry.register_context(&custom.ad_data, Bucket::Ad);
        registry.register_event(&custom.u2s_data, EventKind::Structured);

        registry
    }

    /// Register a context schema. `schema` may be `vendor/name` or a full URI.
    pub fn register_context(&mut self, schema: &str, bucket: Bucket) {
        if let Some(id) = SchemaIdentifier::parse(schema) {
            self.contexts.insert(id.key(), bucket);
        }
    }

    /// Register an unstructured event schema.
    pub fn register_event(&mut self, schema: &str, kind: EventKind) {
        if let Some(id) = SchemaIdentifier::parse(schema) {
            self.events.insert(id.key(), kind);
        }
    }

    /// Bucket for a context schema, falling back to [`Bucket::Extra`].
    pub fn resolve_context(&self, id: &SchemaIdentifier) -> Bucket {
        self.contexts
            .get(&id.key())
            .cloned()
            .unwrap_or_else(|| Bucket::Extra(id.name.clone()))
    }

    pub fn resolve_event(&self, id: &SchemaIdentifier) -> EventKind {
        self.events
            .get(&id.key())
            .cloned()
            .unwrap_or_else(|| EventKind::Named(id.name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_uri() {
        let id = SchemaIdentifier::parse(
            "iglu:com.snowplowanalytics.snowplow/web_page/jsonschema/1-0-0",
        )
        .unwrap();
        assert_eq!(id.vendor, "com.snowplowanalytics.snowplow");
        assert_eq!(id.name, "web_page");
        assert_eq!(id.format, "jsonschema");
        assert_eq!(id.version, "1-0-0");
    }

    #[test]
    fn test_parse_rejects_missing_name() {
        assert!(SchemaIdentifier::parse("iglu:com.acme").is_none());
        assert!(SchemaIdentifier::parse("").is_none());
    }

    #[test]
    fn test_equality_ignores_version() {
        let a = SchemaIdentifier::parse("iglu:dev.snowplow.simple/page_data/jsonschema/1-0-0");
        let b = SchemaIdentifier::parse("dev.snowplow.simple/page_data/jsonschema/2-1-0");
        assert_eq!(a, b);
    }

    #[test]
    fn test_builtin_and_custom_lookup() {
        let registry = SchemaRegistry::default();
        let page = SchemaIdentifier::parse("iglu:dev.snowplow.simple/page_data/jsonschema/1-0-0")
            .unwrap();
        assert_eq!(registry.resolve_context(&page), Bucket::Page);

        let hints = SchemaIdentifier::parse("iglu:org.ietf/http_client_hints/jsonschema/1-0-0")
            .unwrap();
        assert_eq!(registry.resolve_context(&hints), Bucket::ClientHints);
    }

    #[test]
    fn test_unknown_schema_falls_back_to_extra() {
        let registry = SchemaRegistry::default();
        let id = SchemaIdentifier::parse("iglu:io.example/cart_state/jsonschema/1-0-0").unwrap();
        assert_eq!(registry.resolve_context(&id), Bucket::Extra("cart_state".to_string()));
    }

    #[test]
    fn test_configured_schemas_override_defaults() {
        let custom = CustomSchemas {
            page_data: "io.example/page/jsonschema/1-0-0".to_string(),
            ..CustomSchemas::default()
        };
        let registry = SchemaRegistry::new(&custom);
        let id = SchemaIdentifier::parse("iglu:io.example/page/jsonschema/1-0-0").unwrap();
        assert_eq!(registry.resolve_context(&id), Bucket::Page);

        let u2s = SchemaIdentifier::parse("iglu:dev.snowplow.simple/u2s_data/jsonschema/1-0-0")
            .unwrap();
        assert_eq!(registry.resolve_event(&u2s), EventKind::Structured);
    }

    #[test]
    fn test_event_kind_fallback_uses_name() {
        let registry = SchemaRegistry::default();
        let id = SchemaIdentifier::parse("iglu:com.acme/link_click/jsonschema/1-0-1").unwrap();
        assert_eq!(registry.resolve_event(&id), EventKind::Named("link_click".to_string()));
    }
}
