/// Protocol field names used by the tracker wire format.
/// Abbreviations follow the tracker protocol so they can be matched directly
/// against query parameters and JSON body keys.

// Tracker and application
pub const TRACKER_VERSION: &str = "tv";
pub const TRACKER_NAMESPACE: &str = "tna";
pub const APP_ID: &str = "aid";
pub const PLATFORM: &str = "p";

// Event
pub const EVENT_TYPE: &str = "e";
pub const EVENT_ID: &str = "eid";
pub const STRUCT_ACTION: &str = "se_ac";
pub const STRUCT_CATEGORY: &str = "se_ca";
pub const STRUCT_LABEL: &str = "se_la";
pub const STRUCT_PROPERTY: &str = "se_pr";
pub const STRUCT_VALUE: &str = "se_va";

// Identity and session
pub const DEVICE_ID: &str = "duid";
pub const USER_ID: &str = "uid";
pub const SESSION_ID: &str = "sid";
pub const VISIT_COUNT: &str = "vid";

// Timestamps
pub const DEVICE_CREATED_TIME: &str = "dtm";
pub const DEVICE_SENT_TIME: &str = "stm";
pub const COLLECTOR_RECEIVED_TIME: &str = "rtm";

// Page
pub const PAGE_URL: &str = "url";
pub const PAGE_REFERRER: &str = "refr";
pub const PAGE_TITLE: &str = "page";

// Browser and device
pub const TIMEZONE: &str = "tz";
pub const LANGUAGE: &str = "lang";
pub const CHARSET: &str = "cs";
pub const RESOLUTION: &str = "res";
pub const VIEWPORT: &str = "vp";
pub const DOCUMENT_SIZE: &str = "ds";
pub const COLOR_DEPTH: &str = "cd";
pub const COOKIE_ENABLED: &str = "cookie";

// Page ping offsets
pub const PING_MIN_X: &str = "pp_mix";
pub const PING_MAX_X: &str = "pp_max";
pub const PING_MIN_Y: &str = "pp_miy";
pub const PING_MAX_Y: &str = "pp_may";

// Context and unstructured event payloads (plain / base64)
pub const CONTEXTS: &str = "co";
pub const CONTEXTS_B64: &str = "cx";
pub const UNSTRUCT: &str = "ue_pr";
pub const UNSTRUCT_B64: &str = "ue_px";

/// GET parameter carrying the whole flat field mapping as base64 JSON.
pub const ENCODED_PAYLOAD: &str = "px";

/// Key under which a POST body carries its batch of events.
pub const BATCH_KEY: &str = "data";

/// Name of the first-party tracker cookie holding the device id.
pub const TRACKER_COOKIE_PREFIX: &str = "_sp_id";

/// Page URL query parameter used by AMP pages to forward the device id.
pub const AMP_LINKER_PARAM: &str = "sp_amp_linker";

// Default vendor/name pairs for the collector's own context schemas
pub const DEFAULT_PAGE_DATA_SCHEMA: &str = "dev.snowplow.simple/page_data";
pub const DEFAULT_USER_DATA_SCHEMA: &str = "dev.snowplow.simple/user_data";
pub const DEFAULT_SCREEN_DATA_SCHEMA: &str = "dev.snowplow.simple/screen_data";
pub const DEFAULT_AD_DATA_SCHEMA: &str = "dev.snowplow.simple/ad_data";
pub const DEFAULT_U2S_DATA_SCHEMA: &str = "dev.snowplow.simple/u2s_data";

/// 1x1 transparent GIF returned to pixel requests.
pub const PIXEL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0xff, 0xff,
    0xff, 0x00, 0x00, 0x00, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];
