use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use super::json_repair::repair_object;
use super::schema_registry::{Bucket, EventKind, SchemaIdentifier, SchemaRegistry};
use crate::pipeline::ingestion::envelope::{RawContext, RawPayload};

/// What to do when several contexts of one event resolve to the same bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// The last occurrence in the context list replaces earlier ones.
    #[default]
    LastWins,
    /// The first occurrence is kept, later ones are ignored.
    FirstWins,
    /// Objects are shallow-merged, later keys overriding earlier ones.
    Merge,
}

/// Resolved contexts of one event, at most one value per bucket.
///
/// Buckets iterate in the order their winning context appeared in the
/// client's list, so fields written by several buckets go to the later one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedContextSet {
    buckets: IndexMap<Bucket, Value>,
}

impl ResolvedContextSet {
    pub fn get(&self, bucket: &Bucket) -> Option<&Value> {
        self.buckets.get(bucket)
    }

    /// The bucket's object, or an empty object when absent.
    pub fn object(&self, bucket: &Bucket) -> Map<String, Value> {
        match self.buckets.get(bucket) {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Bucket, &Value)> {
        self.buckets.iter()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    fn put(&mut self, bucket: Bucket, value: Value, policy: DuplicatePolicy) {
        match policy {
            DuplicatePolicy::LastWins => {
                self.buckets.shift_remove(&bucket);
                self.buckets.insert(bucket, value);
            }
            DuplicatePolicy::FirstWins => {
                self.buckets.entry(bucket).or_insert(value);
            }
            DuplicatePolicy::Merge => match (self.buckets.shift_remove(&bucket), value) {
                (Some(Value::Object(mut existing)), Value::Object(incoming)) => {
                    existing.extend(incoming);
                    self.buckets.insert(bucket, Value::Object(existing));
                }
                (_, value) => {
                    self.buckets.insert(bucket, value);
                }
            },
        }
    }
}

/// The unstructured event after schema lookup and payload repair.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedUnstructured {
    pub schema: SchemaIdentifier,
    pub kind: EventKind,
    pub data: Value,
}

/// Counters describing how much of the client JSON had to be salvaged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolutionStats {
    pub repaired: usize,
    pub degraded: usize,
    pub unrecognized: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextResolution {
    pub contexts: ResolvedContextSet,
    pub unstructured: Option<ResolvedUnstructured>,
    pub stats: ResolutionStats,
}

/// Resolves raw context blobs against the schema registry.
///
/// Context data is supplementary to the tracked event, so nothing here fails:
/// malformed payloads are repaired or replaced by an empty object and
/// unrecognized schemas land in an `extra` bucket.
#[derive(Debug, Clone)]
pub struct ContextResolver {
    registry: Arc<SchemaRegistry>,
    policy: DuplicatePolicy,
}

impl ContextResolver {
    pub fn new(registry: Arc<SchemaRegistry>, policy: DuplicatePolicy) -> Self {
        Self { registry, policy }
    }

    pub fn resolve(
        &self,
        contexts: &[RawContext],
        unstructured: Option<&RawContext>,
    ) -> ContextResolution {
        let mut resolution = ContextResolution::default();

        for raw in contexts {
            let Some(schema) = SchemaIdentifier::parse(&raw.schema) else {
                warn!("Context with unparsable schema '{}' dropped", raw.schema);
                resolution.stats.degraded += 1;
                continue;
            };

            let bucket = self.registry.resolve_context(&schema);
            if matches!(bucket, Bucket::Extra(_)) {
                warn!("Schema has no bucket, keeping payload in extra: {}", schema);
                resolution.stats.unrecognized += 1;
            }

            let data = payload_object(&raw.payload, &schema, &mut resolution.stats);
            debug!("Resolved context {} into bucket {}", schema, bucket.name());
            resolution.contexts.put(bucket, data, self.policy);
        }

        if let Some(raw) = unstructured {
            match SchemaIdentifier::parse(&raw.schema) {
                Some(schema) => {
                    let data = payload_object(&raw.payload, &schema, &mut resolution.stats);
                    let kind = self.registry.resolve_event(&schema);
                    resolution.unstructured = Some(ResolvedUnstructured { schema, kind, data });
                }
                None => {
                    warn!("Unstructured event with unparsable schema '{}' dropped", raw.schema);
                    resolution.stats.degraded += 1;
                }
            }
        }

        resolution
    }
}

/// Turns a raw payload into a JSON object, repairing text on the way.
fn payload_object(payload: &RawPayload, schema: &SchemaIdentifier, stats: &mut ResolutionStats) -> Value {
    match payload {
        RawPayload::Json(value @ Value::Object(_)) => value.clone(),
        // Some trackers double-encode payloads as JSON strings.
        RawPayload::Json(Value::String(text)) | RawPayload::Text(text) => {
            repair_text(text, schema, stats)
        }
        RawPayload::Json(other) => {
            warn!("Payload for {} is not an object ({}), using empty object", schema, type_name(other));
            stats.degraded += 1;
            Value::Object(Map::new())
        }
    }
}

fn repair_text(text: &str, schema: &SchemaIdentifier, stats: &mut ResolutionStats) -> Value {
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(text) {
        return value;
    }
    let (value, ok) = repair_object(text);
    if ok {
        debug!("Repaired malformed payload for {}", schema);
        stats.repaired += 1;
    } else {
        warn!("Unrecoverable payload for {}, using empty object", schema);
        stats.degraded += 1;
    }
    value
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PAGE: &str = "iglu:dev.snowplow.simple/page_data/jsonschema/1-0-0";

    fn resolver(policy: DuplicatePolicy) -> ContextResolver {
        ContextResolver::new(Arc::new(SchemaRegistry::default()), policy)
    }

    #[test]
    fn test_duplicate_bucket_last_wins() {
        let contexts = vec![
            RawContext::json(PAGE, json!({"section": "news", "author": "a"})),
            RawContext::json(PAGE, json!({"section": "sport"})),
        ];
        let resolution = resolver(DuplicatePolicy::LastWins).resolve(&contexts, None);
        assert_eq!(resolution.contexts.get(&Bucket::Page), Some(&json!({"section": "sport"})));
        assert_eq!(resolution.contexts.len(), 1);
    }

    #[test]
    fn test_duplicate_bucket_first_wins_and_merge() {
        let contexts = vec![
            RawContext::json(PAGE, json!({"section": "news", "author": "a"})),
            RawContext::json(PAGE, json!({"section": "sport"})),
        ];
        let first = resolver(DuplicatePolicy::FirstWins).resolve(&contexts, None);
        assert_eq!(first.contexts.object(&Bucket::Page)["section"], json!("news"));

        let merged = resolver(DuplicatePolicy::Merge).resolve(&contexts, None);
        assert_eq!(
            merged.contexts.get(&Bucket::Page),
            Some(&json!({"section": "sport", "author": "a"}))
        );
    }

    #[test]
    fn test_buckets_keep_list_order() {
        const WEB_PAGE: &str = "iglu:com.snowplowanalytics.snowplow/web_page/jsonschema/1-0-0";
        const SCREEN: &str = "iglu:com.snowplowanalytics.mobile/screen/jsonschema/1-0-0";
        let contexts = vec![
            RawContext::json(SCREEN, json!({"id": "s"})),
            RawContext::json(PAGE, json!({"section": "news"})),
            RawContext::json(WEB_PAGE, json!({"id": "w"})),
            RawContext::json(PAGE, json!({"section": "sport"})),
        ];
        let order = |policy| {
            resolver(policy)
                .resolve(&contexts, None)
                .contexts
                .iter()
                .map(|(bucket, _)| bucket.clone())
                .collect::<Vec<_>>()
        };

        assert_eq!(
            order(DuplicatePolicy::LastWins),
            vec![Bucket::MobileScreen, Bucket::WebPage, Bucket::Page]
        );
        assert_eq!(
            order(DuplicatePolicy::FirstWins),
            vec![Bucket::MobileScreen, Bucket::Page, Bucket::WebPage]
        );
    }

    #[test]
    fn test_unrecognized_schema_goes_to_extra() {
        let contexts = vec![RawContext::json(
            "iglu:io.example/cart_state/jsonschema/1-0-0",
            json!({"items": 3}),
        )];
        let resolution = resolver(DuplicatePolicy::LastWins).resolve(&contexts, None);
        assert_eq!(
            resolution.contexts.get(&Bucket::Extra("cart_state".to_string())),
            Some(&json!({"items": 3}))
        );
        assert_eq!(resolution.stats.unrecognized, 1);
    }

    #[test]
    fn test_truncated_payload_is_repaired() {
        let contexts = vec![RawContext::text(PAGE, r#"{"a":1,"#)];
        let resolution = resolver(DuplicatePolicy::LastWins).resolve(&contexts, None);
        assert_eq!(resolution.contexts.get(&Bucket::Page), Some(&json!({"a": 1})));
        assert_eq!(resolution.stats.repaired, 1);
    }

    #[test]
    fn test_garbage_payload_degrades_to_empty_object() {
        let contexts = vec![
            RawContext::text(PAGE, "<<garbage>>"),
            RawContext::json("iglu:dev.snowplow.simple/user_data/jsonschema/1-0-0", json!([1, 2])),
        ];
        let resolution = resolver(DuplicatePolicy::LastWins).resolve(&contexts, None);
        assert_eq!(resolution.contexts.get(&Bucket::Page), Some(&json!({})));
        assert_eq!(resolution.contexts.get(&Bucket::User), Some(&json!({})));
        assert_eq!(resolution.stats.degraded, 2);
    }

    #[test]
    fn test_double_encoded_payload() {
        let contexts = vec![RawContext::json(PAGE, json!("{\"title\":\"Home\"}"))];
        let resolution = resolver(DuplicatePolicy::LastWins).resolve(&contexts, None);
        assert_eq!(resolution.contexts.get(&Bucket::Page), Some(&json!({"title": "Home"})));
    }

    #[test]
    fn test_unstructured_event_resolution() {
        let ue = RawContext::text(
            "iglu:com.acme/link_click/jsonschema/1-0-1",
            r#"{"targetUrl":"https://example.com""#,
        );
        let resolution = resolver(DuplicatePolicy::LastWins).resolve(&[], Some(&ue));
        let resolved = resolution.unstructured.unwrap();
        assert_eq!(resolved.kind, EventKind::Named("link_click".to_string()));
        assert_eq!(resolved.data, json!({"targetUrl": "https://example.com"}));
    }

    #[test]
    fn test_unparsable_schema_is_dropped() {
        let contexts = vec![RawContext::json("not-a-schema", json!({"a": 1}))];
        let resolution = resolver(DuplicatePolicy::LastWins).resolve(&contexts, None);
        assert!(resolution.contexts.is_empty());
        assert_eq!(resolution.stats.degraded, 1);
    }
}
