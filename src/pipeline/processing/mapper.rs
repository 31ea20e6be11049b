//! Maps a decoded event and its resolved contexts onto the destination row.
//!
//! Mapping happens in two phases. A [`Draft`] collects values from the
//! protocol fields, then the context buckets, then the unstructured event,
//! each later source overriding earlier ones. [`Draft::finish`] then coerces
//! the collected values and builds the row in one go, or rejects the event.

use serde_json::{json, Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use super::coerce::{decode_url, parse_count, parse_timestamp, parse_uuid, value_text};
use super::context::{ContextResolution, ResolvedUnstructured};
use super::request_meta::{amp_linker_device_id, RequestMeta};
use super::row::{
    epoch, AppInfo, BrowserInfo, DeviceFlags, DeviceInfo, EventInfo, EventType, NormalizedRow,
    OsInfo, Platform, Resolution, SessionInfo, TimeExtra, TrackerInfo,
};
use super::schema_registry::{Bucket, EventKind};
use super::useragent::UaClassification;
use crate::common::constants::*;
use crate::error::EventError;
use crate::pipeline::ingestion::envelope::{Envelope, FieldValue, Fields};

const UNDEFINED_APP_ID: &str = "undefined";
const FALLBACK_APP_ID: &str = "other";
const UNKNOWN_SCREEN: &str = "Unknown";

/// Builds [`NormalizedRow`]s. Holds no state; one instance serves all requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowMapper;

impl RowMapper {
    pub fn new() -> Self {
        Self
    }

    /// Maps one event. Fails only on a missing required field or an
    /// unrecognized event type / platform code.
    pub fn map(
        &self,
        envelope: &Envelope,
        resolution: &ContextResolution,
        user_agent: &UaClassification,
        meta: &RequestMeta,
    ) -> Result<NormalizedRow, EventError> {
        let fields = &envelope.fields;
        let mut draft = Draft::from_fields(fields, user_agent);

        for (bucket, value) in resolution.contexts.iter() {
            draft.apply_context(bucket, value);
        }
        if let Some(unstructured) = &resolution.unstructured {
            draft.apply_unstructured(unstructured);
        }
        draft.apply_request_meta(meta);

        draft.finish(fields, user_agent, meta)
    }
}

/// Working set of a row under construction.
struct Draft {
    event_type: Option<String>,
    url: String,
    referer: String,
    view_id: Option<String>,
    session_id: Option<String>,
    visit_count: u64,
    device_id: Option<String>,
    user_id: String,
    action: String,
    category: String,
    label: String,
    property: Option<Value>,
    value: Option<Value>,
    resolution: String,
    viewport: String,
    document_size: String,
    app_info: AppInfo,
    session: SessionInfo,
    os: Option<(String, String)>,
    device: Option<(String, String)>,
    flags: DeviceFlags,
    amp: Map<String, Value>,
    screen: Map<String, Value>,
    page_data: Map<String, Value>,
    user_data: Map<String, Value>,
    geolocation: Map<String, Value>,
    browser_extra: Map<String, Value>,
    device_extra: Map<String, Value>,
    unstructured: Map<String, Value>,
    extra: Map<String, Value>,
}

impl Draft {
    fn from_fields(fields: &Fields, user_agent: &UaClassification) -> Self {
        let text = |key: &str| fields.text(key).map(|v| v.into_owned());

        let mut extra = Map::new();
        let is_page_ping = text(EVENT_TYPE).and_then(|e| e.parse::<EventType>().ok()) == Some(EventType::PagePing);
        if is_page_ping {
            let offset = |key: &str| text(key).map(|v| parse_count(&v)).unwrap_or(0);
            extra.insert(
                "page_ping".to_string(),
                json!({
                    "min_x": offset(PING_MIN_X),
                    "max_x": offset(PING_MAX_X),
                    "min_y": offset(PING_MIN_Y),
                    "max_y": offset(PING_MAX_Y),
                }),
            );
        }

        Self {
            event_type: text(EVENT_TYPE),
            url: text(PAGE_URL).map(|u| decode_url(&u)).unwrap_or_default(),
            referer: text(PAGE_REFERRER).map(|u| decode_url(&u)).unwrap_or_default(),
            view_id: None,
            session_id: text(SESSION_ID),
            visit_count: text(VISIT_COUNT).map(|v| parse_count(&v)).unwrap_or(0),
            device_id: text(DEVICE_ID),
            user_id: text(USER_ID).unwrap_or_default(),
            action: text(STRUCT_ACTION).unwrap_or_default(),
            category: text(STRUCT_CATEGORY).unwrap_or_default(),
            label: text(STRUCT_LABEL).unwrap_or_default(),
            property: text(STRUCT_PROPERTY).map(Value::String),
            value: fields.get(STRUCT_VALUE).map(field_json),
            resolution: text(RESOLUTION).unwrap_or_default(),
            viewport: text(VIEWPORT).unwrap_or_else(|| "0x0".to_string()),
            document_size: text(DOCUMENT_SIZE).unwrap_or_else(|| "0x0".to_string()),
            app_info: AppInfo::default(),
            session: SessionInfo::default(),
            os: None,
            device: None,
            flags: user_agent.flags,
            amp: Map::new(),
            screen: Map::new(),
            page_data: Map::new(),
            user_data: Map::new(),
            geolocation: Map::new(),
            browser_extra: Map::new(),
            device_extra: Map::new(),
            unstructured: Map::new(),
            extra,
        }
    }

    fn apply_context(&mut self, bucket: &Bucket, value: &Value) {
        let mut data = value.as_object().cloned().unwrap_or_default();

        match bucket {
            Bucket::Page => self.page_data.extend(data),
            Bucket::User => self.user_data.extend(data),
            Bucket::Screen => self.screen.extend(data),
            Bucket::Ad => {
                self.unstructured.insert("ad_data".to_string(), Value::Object(data));
            }
            Bucket::WebPage => {
                if let Some(id) = data.get("id").and_then(value_text) {
                    self.view_id = Some(id);
                }
            }
            Bucket::Session => self.apply_session(data),
            Bucket::Mobile => {
                self.device = Some((take_text(&mut data, "deviceManufacturer"), take_text(&mut data, "deviceModel")));
                self.os = Some((take_text(&mut data, "osType"), take_text(&mut data, "osVersion")));
                self.flags = DeviceFlags {
                    mobile: true,
                    tablet: false,
                    touch: true,
                    pc: false,
                    bot: false,
                };
                self.device_extra = data;
            }
            Bucket::Application => {
                if let Some(Value::String(version)) = data.get("version") {
                    self.app_info.version = version.clone();
                }
                if let Some(Value::String(build)) = data.get("build") {
                    self.app_info.build = build.clone();
                }
            }
            Bucket::MobileScreen => {
                if let Some(name) = data.remove("name").as_ref().and_then(value_text) {
                    self.url = name;
                }
                if let Some(id) = data.remove("id").as_ref().and_then(value_text) {
                    self.view_id = Some(id);
                }
                self.screen.extend(data);
            }
            Bucket::Browser => {
                if let Some(res) = data.remove("resolution").as_ref().and_then(value_text) {
                    self.resolution = res;
                }
                if let Some(vp) = data.remove("viewport").as_ref().and_then(value_text) {
                    self.viewport = vp;
                }
                if let Some(ds) = data.remove("documentSize").as_ref().and_then(value_text) {
                    self.document_size = ds;
                }
                self.browser_extra = data;
            }
            Bucket::Geolocation => self.geolocation = data,
            Bucket::AmpSession | Bucket::AmpId | Bucket::AmpWebPage => self.amp.extend(data),
            Bucket::Static => self.extra.extend(data),
            Bucket::BrowserPerf => {
                self.extra.insert("performance_timing".to_string(), Value::Object(data));
            }
            Bucket::ClientHints => {
                if let Some(is_mobile) = data.get("isMobile").and_then(Value::as_bool) {
                    self.flags.mobile = is_mobile;
                    self.flags.pc = !is_mobile;
                }
                self.extra.insert("client_hints".to_string(), Value::Object(data));
            }
            Bucket::GaCookies => {
                self.extra.insert("ga_cookies".to_string(), Value::Object(data));
            }
            Bucket::Attachment(key) => {
                self.unstructured.insert(key.to_string(), Value::Object(data));
            }
            Bucket::Extra(name) => {
                self.extra.insert(name.clone(), value.clone());
            }
        }
    }

    fn apply_session(&mut self, mut data: Map<String, Value>) {
        let index = data.remove("sessionIndex").as_ref().and_then(value_text).map(|v| parse_count(&v));
        if let Some(index) = index.filter(|i| *i > 0) {
            self.visit_count = index;
        }
        if let Some(id) = data.remove("sessionId").as_ref().and_then(value_text) {
            self.session_id = Some(id);
        }
        if let Some(id) = data.remove("userId").as_ref().and_then(value_text) {
            self.device_id = Some(id);
        }

        let text = |data: &mut Map<String, Value>, key: &str| data.remove(key).as_ref().and_then(value_text);
        self.session = SessionInfo {
            event_index: text(&mut data, "eventIndex").map(|v| parse_count(&v)).unwrap_or(0),
            previous_session_id: text(&mut data, "previousSessionId")
                .and_then(|v| parse_uuid("previousSessionId", &v))
                .unwrap_or_else(Uuid::nil),
            first_event_id: text(&mut data, "firstEventId")
                .and_then(|v| parse_uuid("firstEventId", &v))
                .unwrap_or_else(Uuid::nil),
            first_event_time: text(&mut data, "firstEventTimestamp")
                .and_then(|v| parse_timestamp(&v))
                .unwrap_or_else(epoch),
            storage_mechanism: text(&mut data, "storageMechanism").unwrap_or_default(),
            unstructured: Value::Object(data),
        };
    }

    fn apply_unstructured(&mut self, event: &ResolvedUnstructured) {
        let mut data = event.data.as_object().cloned().unwrap_or_default();

        match &event.kind {
            EventKind::Structured => {
                self.event_type = Some(EventType::Structured.code().to_string());
                let mut pick = |long: &str, short: &str| data.remove(long).or_else(|| data.remove(short));
                if let Some(v) = pick("action", STRUCT_ACTION).as_ref().and_then(value_text) {
                    self.action = v;
                }
                if let Some(v) = pick("category", STRUCT_CATEGORY).as_ref().and_then(value_text) {
                    self.category = v;
                }
                if let Some(v) = pick("label", STRUCT_LABEL).as_ref().and_then(value_text) {
                    self.label = v;
                }
                if let Some(v) = pick("property", STRUCT_PROPERTY) {
                    self.property = Some(v);
                }
                if let Some(v) = pick("value", STRUCT_VALUE) {
                    self.value = Some(v);
                }
            }
            EventKind::ScreenView => {
                self.event_type = Some(EventType::PageView.code().to_string());
                if let Some(id) = data.remove("id").as_ref().and_then(value_text) {
                    self.view_id = Some(id);
                }
                if let Some(name) = data.remove("name").as_ref().and_then(value_text) {
                    self.url = name;
                }
                self.referer = data
                    .remove("previousName")
                    .as_ref()
                    .and_then(value_text)
                    .filter(|name| name != UNKNOWN_SCREEN)
                    .unwrap_or_default();
                self.screen.extend(data);
            }
            EventKind::AmpPagePing => {
                self.event_type = Some(EventType::PagePing.code().to_string());
                self.extra.insert("amp_page_ping".to_string(), Value::Object(data));
            }
            EventKind::Named(name) => {
                self.unstructured.insert(name.clone(), event.data.clone());
            }
        }
    }

    fn apply_request_meta(&mut self, meta: &RequestMeta) {
        if let Some(Value::String(user_id)) = self.amp.remove("userId") {
            self.user_id = user_id;
        }
        if let Some(Value::String(device_id)) = self.amp.remove("domainUserid") {
            self.device_id = Some(device_id);
        }
        if let Some(device_id) = amp_linker_device_id(&self.url) {
            self.amp.insert("device_id".to_string(), Value::String(device_id));
        }
        if self.device_id.is_none() {
            if let Some(device_id) = &meta.cookie_device_id {
                debug!("Device id taken from tracker cookie");
                self.device_id = Some(device_id.clone());
            }
        }
        if let Some(name) = self.screen.remove("screen_name").as_ref().and_then(value_text) {
            self.url = name;
        }
    }

    fn finish(
        self,
        fields: &Fields,
        user_agent: &UaClassification,
        meta: &RequestMeta,
    ) -> Result<NormalizedRow, EventError> {
        let text = |key: &str| fields.text(key).map(|v| v.into_owned());

        let event_type = match self.event_type {
            Some(raw) => raw.parse::<EventType>().map_err(|_| EventError::UnknownEnumValue {
                field: EVENT_TYPE,
                value: raw.clone(),
            })?,
            None => return Err(EventError::MissingRequiredField { field: EVENT_TYPE }),
        };
        let tracker_version = text(TRACKER_VERSION).ok_or(EventError::MissingRequiredField {
            field: TRACKER_VERSION,
        })?;
        let platform = match text(PLATFORM) {
            Some(raw) => raw.parse::<Platform>().map_err(|_| EventError::UnknownEnumValue {
                field: PLATFORM,
                value: raw.clone(),
            })?,
            None => Platform::Web,
        };

        let app_id = match text(APP_ID) {
            Some(aid) if aid == UNDEFINED_APP_ID => FALLBACK_APP_ID.to_string(),
            Some(aid) => aid,
            None => String::new(),
        };
        let namespace = text(TRACKER_NAMESPACE).unwrap_or_default();
        let app = if platform == Platform::Mob { namespace.clone() } else { app_id.clone() };

        let event_id = text(EVENT_ID)
            .and_then(|v| parse_uuid(EVENT_ID, &v))
            .unwrap_or_else(Uuid::new_v4);
        let uuid_or_nil = |field: &str, raw: Option<String>| {
            raw.and_then(|v| parse_uuid(field, &v)).unwrap_or_else(Uuid::nil)
        };

        let received = text(COLLECTOR_RECEIVED_TIME)
            .and_then(|v| timestamp(COLLECTOR_RECEIVED_TIME, &v))
            .unwrap_or(meta.received_at);
        let sent = text(DEVICE_SENT_TIME)
            .and_then(|v| timestamp(DEVICE_SENT_TIME, &v))
            .unwrap_or(meta.received_at);
        let time = text(DEVICE_CREATED_TIME)
            .and_then(|v| timestamp(DEVICE_CREATED_TIME, &v))
            .unwrap_or(meta.received_at);

        let (property, value) = structured_property(self.property, self.value);
        let (os_family, os_version) = self
            .os
            .unwrap_or_else(|| (user_agent.os.family.clone(), user_agent.os.version_string.clone()));
        let (brand, model) = self
            .device
            .unwrap_or_else(|| (user_agent.device.brand.clone(), user_agent.device.model.clone()));

        Ok(NormalizedRow {
            app_id,
            platform,
            app_info: self.app_info,
            page: self.url,
            referer: self.referer,
            event_type,
            event_id,
            view_id: uuid_or_nil("view_id", self.view_id),
            session_id: uuid_or_nil(SESSION_ID, self.session_id),
            visit_count: self.visit_count,
            session: self.session,
            amp: Value::Object(self.amp),
            device_id: uuid_or_nil(DEVICE_ID, self.device_id),
            user_id: self.user_id,
            time,
            time_extra: TimeExtra { received, sent },
            timezone: text(TIMEZONE).unwrap_or_default(),
            title: text(PAGE_TITLE).unwrap_or_default(),
            screen: Value::Object(self.screen),
            page_data: Value::Object(self.page_data),
            user_data: Value::Object(self.user_data),
            user_ip: meta.client_ip,
            geolocation: Value::Object(self.geolocation),
            user_agent: meta.user_agent.clone().unwrap_or_default(),
            browser: BrowserInfo {
                family: user_agent.browser.family.clone(),
                version: user_agent.browser.version_string.clone(),
                version_parts: user_agent.browser.version.clone(),
                cookies: user_agent.browser.cookies,
                extra: Value::Object(self.browser_extra),
            },
            os: OsInfo {
                family: os_family,
                version: os_version,
                language: user_agent.os.language.clone(),
            },
            device: DeviceInfo {
                brand,
                model,
                extra: Value::Object(self.device_extra),
            },
            device_is: self.flags,
            resolution: Resolution {
                browser: self.resolution,
                viewport: self.viewport,
                page: self.document_size,
            },
            color_depth: text(COLOR_DEPTH)
                .and_then(|v| u32::try_from(parse_count(&v)).ok())
                .unwrap_or(0),
            event: EventInfo {
                action: self.action,
                category: self.category,
                label: self.label,
                property,
                value,
                unstructured: Value::Object(self.unstructured),
            },
            extra: Value::Object(self.extra),
            tracker: TrackerInfo {
                version: tracker_version,
                namespace,
            },
            app,
        })
    }
}

fn field_json(value: &FieldValue) -> Value {
    match value {
        FieldValue::Text(s) => Value::String(s.clone()),
        FieldValue::Number(n) => Value::Number(n.clone()),
        FieldValue::Bool(b) => Value::Bool(*b),
    }
}

fn take_text(data: &mut Map<String, Value>, key: &str) -> String {
    data.remove(key).as_ref().and_then(value_text).unwrap_or_default()
}

fn timestamp(field: &str, raw: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    let parsed = parse_timestamp(raw);
    if parsed.is_none() {
        warn!("Unparsable timestamp in '{}': {}", field, raw);
    }
    parsed
}

/// Coerces the structured event property to an object and the value to a
/// float. Unparsable values are kept under `ex-property` / `ex-value`.
fn structured_property(property: Option<Value>, value: Option<Value>) -> (Value, f32) {
    let mut property = match property {
        None => Map::new(),
        Some(Value::Object(map)) => map,
        Some(Value::String(raw)) if raw.is_empty() => Map::new(),
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => single("ex-property", Value::String(raw)),
        },
        Some(other) => single("ex-property", other),
    };

    let value = match value {
        None | Some(Value::Null) => 0.0,
        Some(Value::Number(n)) => match n.as_f64().map(|v| v as f32) {
            Some(v) if v.is_finite() => v,
            _ => {
                property.insert("ex-value".to_string(), Value::Number(n));
                0.0
            }
        },
        Some(Value::String(raw)) if raw.trim().is_empty() => 0.0,
        Some(Value::String(raw)) => match raw.trim().parse::<f32>() {
            Ok(v) if v.is_finite() => v,
            _ => {
                property.insert("ex-value".to_string(), Value::String(raw));
                0.0
            }
        },
        Some(other) => {
            property.insert("ex-value".to_string(), other);
            0.0
        }
    };

    (Value::Object(property), value)
}

fn single(key: &str, value: Value) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    map
}
