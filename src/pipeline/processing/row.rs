use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use uuid::Uuid;

/// Platform the tracked application runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Web,
    Mob,
    Pc,
    Srv,
    App,
    Tv,
    Cnsl,
    Iot,
}

impl Platform {
    pub fn code(&self) -> &'static str {
        match self {
            Platform::Web => "web",
            Platform::Mob => "mob",
            Platform::Pc => "pc",
            Platform::Srv => "srv",
            Platform::App => "app",
            Platform::Tv => "tv",
            Platform::Cnsl => "cnsl",
            Platform::Iot => "iot",
        }
    }
}

impl FromStr for Platform {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "web" => Ok(Platform::Web),
            "mob" => Ok(Platform::Mob),
            "pc" => Ok(Platform::Pc),
            "srv" => Ok(Platform::Srv),
            "app" => Ok(Platform::App),
            "tv" => Ok(Platform::Tv),
            "cnsl" => Ok(Platform::Cnsl),
            "iot" => Ok(Platform::Iot),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Kind of tracked event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "pv")]
    PageView,
    #[serde(rename = "pp")]
    PagePing,
    #[serde(rename = "ue")]
    Unstructured,
    #[serde(rename = "se")]
    Structured,
    #[serde(rename = "tr")]
    Transaction,
    #[serde(rename = "ti")]
    TransactionItem,
    #[serde(rename = "s")]
    Session,
}

impl EventType {
    pub fn code(&self) -> &'static str {
        match self {
            EventType::PageView => "pv",
            EventType::PagePing => "pp",
            EventType::Unstructured => "ue",
            EventType::Structured => "se",
            EventType::Transaction => "tr",
            EventType::TransactionItem => "ti",
            EventType::Session => "s",
        }
    }
}

impl FromStr for EventType {
    type Err = ();

    /// Accepts the protocol codes and the long names newer trackers send.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pv" | "page_view" => Ok(EventType::PageView),
            "pp" | "page_ping" => Ok(EventType::PagePing),
            "ue" | "unstruct" => Ok(EventType::Unstructured),
            "se" | "struct" => Ok(EventType::Structured),
            "tr" | "transaction" => Ok(EventType::Transaction),
            "ti" | "transaction_item" => Ok(EventType::TransactionItem),
            "s" | "session" => Ok(EventType::Session),
            _ => Err(()),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Epoch start, used where the schema needs a non-null date.
pub fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(0, 0).single().unwrap_or_default()
}

pub fn empty_object() -> Value {
    Value::Object(Map::new())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AppInfo {
    pub version: String,
    pub build: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    pub event_index: u64,
    pub previous_session_id: Uuid,
    pub first_event_id: Uuid,
    pub first_event_time: DateTime<Utc>,
    pub storage_mechanism: String,
    pub unstructured: Value,
}

impl Default for SessionInfo {
    fn default() -> Self {
        Self {
            event_index: 0,
            previous_session_id: Uuid::nil(),
            first_event_id: Uuid::nil(),
            first_event_time: epoch(),
            storage_mechanism: String::new(),
            unstructured: empty_object(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeExtra {
    pub received: DateTime<Utc>,
    pub sent: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrowserInfo {
    pub family: String,
    pub version: String,
    pub version_parts: Vec<String>,
    /// Reported by the client, never inferred.
    pub cookies: bool,
    pub extra: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OsInfo {
    pub family: String,
    pub version: String,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub brand: String,
    pub model: String,
    pub extra: Value,
}

/// Boolean device facets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeviceFlags {
    pub mobile: bool,
    pub tablet: bool,
    pub touch: bool,
    pub pc: bool,
    pub bot: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub browser: String,
    pub viewport: String,
    pub page: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventInfo {
    pub action: String,
    pub category: String,
    pub label: String,
    pub property: Value,
    pub value: f32,
    pub unstructured: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackerInfo {
    pub version: String,
    pub namespace: String,
}

/// One accepted event in the destination's fixed wide shape.
///
/// Every field is populated: UUIDs default to the nil UUID, JSON blobs to an
/// empty object, counters to zero, strings to empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRow {
    pub app_id: String,
    pub platform: Platform,
    pub app_info: AppInfo,
    pub page: String,
    pub referer: String,
    pub event_type: EventType,
    pub event_id: Uuid,
    pub view_id: Uuid,
    pub session_id: Uuid,
    pub visit_count: u64,
    pub session: SessionInfo,
    pub amp: Value,
    pub device_id: Uuid,
    pub user_id: String,
    pub time: DateTime<Utc>,
    pub time_extra: TimeExtra,
    pub timezone: String,
    pub title: String,
    pub screen: Value,
    pub page_data: Value,
    pub user_data: Value,
    pub user_ip: Ipv4Addr,
    pub geolocation: Value,
    pub user_agent: String,
    pub browser: BrowserInfo,
    pub os: OsInfo,
    pub device: DeviceInfo,
    pub device_is: DeviceFlags,
    pub resolution: Resolution,
    pub color_depth: u32,
    pub event: EventInfo,
    pub extra: Value,
    pub tracker: TrackerInfo,
    /// Tracker namespace for mobile apps, app id otherwise.
    pub app: String,
}
