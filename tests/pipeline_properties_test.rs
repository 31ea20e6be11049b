use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::json;
use std::sync::Arc;
use tracker_collector::pipeline::collector::Collector;
use tracker_collector::pipeline::ingestion::decoder::RequestDecoder;
use tracker_collector::pipeline::ingestion::request::RawRequest;
use tracker_collector::pipeline::processing::context::DuplicatePolicy;
use tracker_collector::pipeline::processing::row::EventType;
use tracker_collector::pipeline::processing::schema_registry::SchemaRegistry;
use tracker_collector::pipeline::processing::useragent::{UaHints, UserAgentClassifier};
use uuid::Uuid;

const CHROME_DESKTOP: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/120.0.6099.109 Safari/537.36";

fn collector() -> Collector {
    Collector::new(Arc::new(SchemaRegistry::default()), DuplicatePolicy::LastWins)
}

fn contexts(items: serde_json::Value) -> String {
    json!({
        "schema": "iglu:com.snowplowanalytics.snowplow/contexts/jsonschema/1-0-0",
        "data": items
    })
    .to_string()
}

#[test]
fn test_encoded_payload_decodes_like_plain_query() {
    let plain = "e=pv&tv=js-3.1&aid=shop&url=https%3A%2F%2Fexample.com%2F&vid=2";
    let fields = json!({
        "e": "pv",
        "tv": "js-3.1",
        "aid": "shop",
        "url": "https://example.com/",
        "vid": "2"
    });
    let encoded = format!("px={}", STANDARD.encode(fields.to_string()));

    let decoder = RequestDecoder::new();
    let from_plain = decoder.decode(&RawRequest::get(plain)).unwrap();
    let from_encoded = decoder.decode(&RawRequest::get(encoded)).unwrap();
    assert_eq!(from_plain, from_encoded);
}

#[test]
fn test_batch_keeps_order_around_invalid_event() {
    let body = json!({
        "schema": "iglu:com.snowplowanalytics.snowplow/payload_data/jsonschema/1-0-4",
        "data": [
            {"e": "pv", "tv": "js-3", "aid": "one"},
            {"e": "pv", "aid": "two"},
            {"e": "pv", "tv": "js-3", "aid": "three"}
        ]
    });
    let batch = collector().process(&RawRequest::post(body.to_string())).unwrap();

    assert_eq!(batch.len(), 3);
    assert!(batch.outcomes[0].result.is_ok());
    assert!(batch.outcomes[1].result.is_err());
    assert!(batch.outcomes[2].result.is_ok());

    let app_ids: Vec<String> = batch.rows().into_iter().map(|r| r.app_id).collect();
    assert_eq!(app_ids, vec!["one".to_string(), "three".to_string()]);
    assert_eq!(batch.rejections()[0].index, 1);
}

#[test]
fn test_missing_session_gives_nil_uuid_and_zero_visits() {
    let batch = collector().process(&RawRequest::get("e=pv&tv=js-3")).unwrap();
    let row = &batch.rows()[0];
    assert_eq!(row.session_id, Uuid::nil());
    assert_eq!(row.visit_count, 0);
}

#[test]
fn test_unrecognized_context_lands_in_extra() {
    let co = contexts(json!([
        {"schema": "iglu:io.example/basket/jsonschema/1-0-0", "data": {"items": 3}}
    ]));
    let body = json!({"e": "pv", "tv": "js-3", "co": co});
    let batch = collector().process(&RawRequest::post(body.to_string())).unwrap();

    assert_eq!(batch.accepted(), 1);
    assert_eq!(batch.rows()[0].extra["basket"], json!({"items": 3}));
}

#[test]
fn test_truncated_context_never_rejects() {
    let co = contexts(json!([
        {"schema": "iglu:dev.snowplow.simple/page_data/jsonschema/1-0-0", "data": "{\"a\":1,"},
        {"schema": "iglu:dev.snowplow.simple/user_data/jsonschema/1-0-0", "data": "}}}{"}
    ]));
    let body = json!({"e": "pv", "tv": "js-3", "co": co});
    let batch = collector().process(&RawRequest::post(body.to_string())).unwrap();

    assert_eq!(batch.accepted(), 1);
    let row = &batch.rows()[0];
    assert_eq!(row.page_data, json!({"a": 1}));
    assert_eq!(row.user_data, json!({}));
}

#[test]
fn test_truncated_context_wrapper_never_rejects() {
    let cx = STANDARD.encode(r#"{"schema":"iglu:x/contexts/jsonschema/1-0-0","data":[{"schema":"iglu:dev.snowplow.simple/page_data/jsonschema/1-0-0","data":{"title":"Ho"#);
    let batch = collector()
        .process(&RawRequest::get(format!("e=pv&tv=js-3&cx={}", cx)))
        .unwrap();
    assert_eq!(batch.accepted(), 1);
    assert_eq!(batch.rows()[0].page_data, json!({"title": "Ho"}));
}

#[test]
fn test_duplicate_page_data_last_wins() {
    let co = contexts(json!([
        {"schema": "iglu:dev.snowplow.simple/page_data/jsonschema/1-0-0", "data": {"section": "news", "author": "a"}},
        {"schema": "iglu:dev.snowplow.simple/page_data/jsonschema/1-0-0", "data": {"section": "sport"}}
    ]));
    let body = json!({"e": "pv", "tv": "js-3", "co": co});
    let batch = collector().process(&RawRequest::post(body.to_string())).unwrap();
    assert_eq!(batch.rows()[0].page_data, json!({"section": "sport"}));
}

#[test]
fn test_desktop_chrome_classification() {
    let ua = UserAgentClassifier::new().classify(Some(CHROME_DESKTOP), &UaHints::default());
    assert_eq!(ua.browser.family, "Chrome");
    assert!(!ua.browser.version_string.is_empty());
    assert!(!ua.flags.bot);
    assert!(!ua.flags.mobile);
    assert!(ua.flags.pc);
}

#[test]
fn test_row_carries_request_metadata() {
    let request = RawRequest::get("e=page_view&tv=js-3&cookie=0")
        .with_user_agent(CHROME_DESKTOP)
        .with_client_ip("::ffff:203.0.113.50")
        .with_cookie("_sp_id.ab12=0f1e2d3c-4b5a-4968-8776-a5b4c3d2e1f0.1700000000.1.1700000000.1700000000.9e5c2d0a-6b1f-4f61-8c2e-0c1a2b3c4d5e");
    let row = collector().process(&request).unwrap().rows().remove(0);

    assert_eq!(row.event_type, EventType::PageView);
    assert_eq!(row.user_ip.to_string(), "203.0.113.50");
    assert_eq!(row.user_agent, CHROME_DESKTOP);
    assert_eq!(row.browser.family, "Chrome");
    assert_eq!(row.os.family, "Windows");
    assert!(!row.browser.cookies);
    assert_eq!(row.device_id.to_string(), "0f1e2d3c-4b5a-4968-8776-a5b4c3d2e1f0");
}

#[test]
fn test_wide_event_decodes_in_linear_time() {
    let mut event = serde_json::Map::new();
    event.insert("e".to_string(), json!("pv"));
    event.insert("tv".to_string(), json!("js-3"));
    for i in 0..50_000 {
        event.insert(format!("filler_{i}"), json!("x"));
    }
    let body = serde_json::Value::Object(event).to_string();
    let query = format!("e=pv&tv=js-3{}", (0..50_000).map(|i| format!("&q{i}=y")).collect::<String>());

    let started = std::time::Instant::now();
    let decoded = RequestDecoder::new().decode(&RawRequest::post(body)).unwrap();
    assert_eq!(decoded[0].as_ref().unwrap().fields.len(), 50_002);
    let decoded = RequestDecoder::new().decode(&RawRequest::get(query)).unwrap();
    assert_eq!(decoded[0].as_ref().unwrap().fields.len(), 50_002);
    assert!(started.elapsed() < std::time::Duration::from_secs(5), "took {:?}", started.elapsed());
}
