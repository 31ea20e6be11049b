use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::borrow::Cow;

/// A single protocol field value as the client sent it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
}

impl FieldValue {
    /// Converts a JSON body value. Nulls carry no information and are dropped;
    /// nested structures are kept as their JSON text.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(FieldValue::Text(s.clone())),
            Value::Number(n) => Some(FieldValue::Number(n.clone())),
            Value::Bool(b) => Some(FieldValue::Bool(*b)),
            other => Some(FieldValue::Text(other.to_string())),
        }
    }

    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            FieldValue::Text(s) => Cow::Borrowed(s.as_str()),
            FieldValue::Number(n) => Cow::Owned(n.to_string()),
            FieldValue::Bool(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

/// Insertion-ordered field mapping. Re-inserting a key replaces its value
/// but keeps its original position.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Fields {
    entries: IndexMap<String, FieldValue>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) {
        self.entries.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.entries.get(key)
    }

    /// Text form of a field, treating empty strings as absent.
    pub fn text(&self, key: &str) -> Option<Cow<'_, str>> {
        self.get(key).map(FieldValue::as_text).filter(|s| !s.is_empty())
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        self.entries.shift_remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>> FromIterator<(K, FieldValue)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, FieldValue)>>(iter: I) -> Self {
        let mut fields = Fields::new();
        for (k, v) in iter {
            fields.insert(k, v);
        }
        fields
    }
}

/// Payload of a self-describing blob, either already parsed or still text
/// that has to go through repair.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RawPayload {
    Json(Value),
    Text(String),
}

/// A self-describing attachment: schema URI plus its uninterpreted payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawContext {
    pub schema: String,
    pub payload: RawPayload,
}

impl RawContext {
    pub fn json(schema: impl Into<String>, data: Value) -> Self {
        Self {
            schema: schema.into(),
            payload: RawPayload::Json(data),
        }
    }

    pub fn text(schema: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            payload: RawPayload::Text(data.into()),
        }
    }
}

/// One decoded tracking event before context resolution and row mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Envelope {
    pub fields: Fields,
    pub contexts: Vec<RawContext>,
    pub unstructured: Option<RawContext>,
}
