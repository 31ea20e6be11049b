//! Turns raw tracker requests into envelopes.
//!
//! Accepted transports:
//! - GET with protocol fields as query parameters, optionally with the whole
//!   field mapping base64-encoded in `px`
//! - POST with a single JSON event, a `{"schema": .., "data": [..]}` batch or
//!   a bare JSON array
//! - POST with a form-encoded body, read like a query string
//!
//! Context (`co`/`cx`) and unstructured event (`ue_pr`/`ue_px`) payloads are
//! unwrapped here but their schemas are left uninterpreted.

use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::form_urlencoded;

use super::envelope::{Envelope, FieldValue, Fields, RawContext, RawPayload};
use super::request::{HttpMethod, RawRequest};
use crate::common::constants::{
    BATCH_KEY, CONTEXTS, CONTEXTS_B64, ENCODED_PAYLOAD, EVENT_TYPE, TRACKER_VERSION, UNSTRUCT,
    UNSTRUCT_B64,
};
use crate::common::encoding::decode_base64;
use crate::error::{DecodeError, EventError};
use crate::pipeline::processing::json_repair::repair_json;

/// Outcome of decoding one event of a request.
pub type DecodedEvent = Result<Envelope, EventError>;

/// Fields every envelope must carry, checked in this order.
const REQUIRED_FIELDS: &[&str] = &[EVENT_TYPE, TRACKER_VERSION];

#[derive(Debug, Clone, Copy, Default)]
pub struct RequestDecoder;

impl RequestDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decodes a request into one entry per event, in submission order.
    ///
    /// A malformed transport (bad base64, unparsable body) fails the whole
    /// request. Per-event problems are returned in place so siblings in a
    /// batch still go through.
    pub fn decode(&self, request: &RawRequest) -> Result<Vec<DecodedEvent>, DecodeError> {
        let events = match request.method {
            HttpMethod::Get => vec![self.decode_query(&request.query)?],
            HttpMethod::Post if request.is_form_encoded() => {
                let body = std::str::from_utf8(&request.body).map_err(|_| DecodeError::Utf8 {
                    field: "body".to_string(),
                })?;
                vec![self.decode_query(body)?]
            }
            HttpMethod::Post => self.decode_json_body(&request.body)?,
        };

        debug!("Decoded {} event(s) from {:?} request", events.len(), request.method);
        Ok(events)
    }

    fn decode_query(&self, query: &str) -> Result<DecodedEvent, DecodeError> {
        let mut fields: Fields = form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), FieldValue::Text(v.into_owned())))
            .collect();

        if let Some(encoded) = fields.remove(ENCODED_PAYLOAD) {
            for (key, value) in decode_encoded_payload(&encoded.as_text())? {
                if let Some(value) = FieldValue::from_json(&value) {
                    fields.insert(key, value);
                }
            }
        }

        envelope_from_fields(fields)
    }

    fn decode_json_body(&self, body: &[u8]) -> Result<Vec<DecodedEvent>, DecodeError> {
        let text = std::str::from_utf8(body).map_err(|_| DecodeError::Utf8 {
            field: "body".to_string(),
        })?;
        let parsed: Value = serde_json::from_str(text).map_err(|e| DecodeError::Json {
            field: "body".to_string(),
            reason: e.to_string(),
        })?;

        let items = match parsed {
            Value::Object(mut map) => match map.remove(BATCH_KEY) {
                Some(Value::Array(items)) => items,
                Some(other) => {
                    // A single event that happens to carry a `data` field.
                    map.insert(BATCH_KEY.to_string(), other);
                    vec![Value::Object(map)]
                }
                None => vec![Value::Object(map)],
            },
            Value::Array(items) => items,
            _ => return Err(DecodeError::UnexpectedBody),
        };

        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::Object(map) => {
                    let fields = map
                        .iter()
                        .filter_map(|(k, v)| FieldValue::from_json(v).map(|v| (k.clone(), v)))
                        .collect();
                    envelope_from_fields(fields)
                }
                _ => {
                    warn!("Batch item {} is not a JSON object", index);
                    Ok(Err(EventError::NotAnObject))
                }
            })
            .collect()
    }
}

/// Decodes the `px` parameter into a flat field mapping.
fn decode_encoded_payload(encoded: &str) -> Result<Map<String, Value>, DecodeError> {
    let text = decode_text(ENCODED_PAYLOAD, encoded)?;
    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(DecodeError::Json {
            field: ENCODED_PAYLOAD.to_string(),
            reason: "expected a JSON object".to_string(),
        }),
        Err(e) => Err(DecodeError::Json {
            field: ENCODED_PAYLOAD.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn decode_text(field: &str, encoded: &str) -> Result<String, DecodeError> {
    let bytes = decode_base64(encoded).map_err(|e| DecodeError::Base64 {
        field: field.to_string(),
        reason: e.to_string(),
    })?;
    String::from_utf8(bytes).map_err(|_| DecodeError::Utf8 {
        field: field.to_string(),
    })
}

/// Pulls a payload that may come plain or base64-encoded. The plain form
/// wins when both are present; both keys are removed from the fields.
fn take_payload(fields: &mut Fields, plain: &str, encoded: &str) -> Result<Option<String>, DecodeError> {
    let plain_value = fields.remove(plain).map(|v| v.as_text().into_owned());
    let encoded_value = fields.remove(encoded).map(|v| v.as_text().into_owned());

    match (plain_value.filter(|s| !s.trim().is_empty()), encoded_value) {
        (Some(text), _) => Ok(Some(text)),
        (None, Some(b64)) if !b64.trim().is_empty() => decode_text(encoded, &b64).map(Some),
        _ => Ok(None),
    }
}

fn envelope_from_fields(mut fields: Fields) -> Result<DecodedEvent, DecodeError> {
    let contexts = take_payload(&mut fields, CONTEXTS, CONTEXTS_B64)?
        .map(|text| unwrap_contexts(&text))
        .unwrap_or_default();
    let unstructured = take_payload(&mut fields, UNSTRUCT, UNSTRUCT_B64)?
        .and_then(|text| unwrap_unstructured(&text));

    if let Some(&field) = REQUIRED_FIELDS.iter().find(|f| fields.text(f).is_none()) {
        return Ok(Err(EventError::MissingRequiredField { field }));
    }

    Ok(Ok(Envelope {
        fields,
        contexts,
        unstructured,
    }))
}

/// Splits a contexts wrapper (`{"schema": .., "data": [..]}` or a bare array)
/// into individual self-describing blobs.
fn unwrap_contexts(text: &str) -> Vec<RawContext> {
    let (wrapper, ok) = repair_json(text);
    if !ok {
        warn!("Contexts payload is not recoverable JSON, ignoring it");
        return Vec::new();
    }

    let items = match wrapper {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => items,
            Some(data) if map.get("schema").is_some() => {
                // A lone context sent without the list wrapper.
                map.insert("data".to_string(), data);
                vec![Value::Object(map)]
            }
            _ => {
                warn!("Contexts payload has no data list");
                Vec::new()
            }
        },
        _ => {
            warn!("Contexts payload is neither an object nor a list");
            Vec::new()
        }
    };

    items.into_iter().filter_map(self_describing).collect()
}

/// Extracts the inner event of an unstructured event wrapper.
fn unwrap_unstructured(text: &str) -> Option<RawContext> {
    let (wrapper, ok) = repair_json(text);
    if !ok {
        warn!("Unstructured event payload is not recoverable JSON, ignoring it");
        return None;
    }

    match wrapper {
        Value::Object(mut map) => match map.remove("data") {
            Some(inner @ Value::Object(_)) if inner.get("schema").is_some() => self_describing(inner),
            Some(data) => {
                map.insert("data".to_string(), data);
                self_describing(Value::Object(map))
            }
            None => {
                warn!("Unstructured event payload has no data");
                None
            }
        },
        _ => {
            warn!("Unstructured event payload is not an object");
            None
        }
    }
}

fn self_describing(value: Value) -> Option<RawContext> {
    let Value::Object(mut map) = value else {
        warn!("Skipping context that is not an object");
        return None;
    };
    let schema = match map.remove("schema") {
        Some(Value::String(schema)) => schema,
        _ => {
            warn!("Skipping context without a schema");
            return None;
        }
    };
    let payload = match map.remove("data") {
        Some(Value::String(text)) => RawPayload::Text(text),
        Some(data) => RawPayload::Json(data),
        None => RawPayload::Json(Value::Null),
    };
    Some(RawContext { schema, payload })
}
