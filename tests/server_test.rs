use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use tracker_collector::config::ServerConfig;
use tracker_collector::pipeline::collector::Collector;
use tracker_collector::pipeline::processing::context::DuplicatePolicy;
use tracker_collector::pipeline::processing::schema_registry::SchemaRegistry;
use tracker_collector::pipeline::storage::InMemorySink;
use tracker_collector::server::{create_server, AppState};

const POST_PATH: &str = "/com.snowplowanalytics.snowplow/tp2";

fn app() -> (axum::Router, InMemorySink) {
    let sink = InMemorySink::new();
    let collector = Collector::new(Arc::new(SchemaRegistry::default()), DuplicatePolicy::LastWins);
    let state = AppState::new(collector, Arc::new(sink.clone()));
    (create_server(state, &ServerConfig::default()), sink)
}

fn post(path: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let (app, _) = app();
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "healthy");
}

#[tokio::test]
async fn test_get_pixel() {
    let (app, sink) = app();
    let request = Request::builder()
        .uri("/i?e=pv&tv=js-3&aid=site")
        .header("x-forwarded-for", "198.51.100.23, 10.0.0.1")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/gif");
    let rows = sink.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].user_ip.to_string(), "198.51.100.23");
}

#[tokio::test]
async fn test_get_pixel_rejects_bad_event() {
    let (app, sink) = app();
    let response = app
        .oneshot(Request::builder().uri("/i?e=zz&tv=js-3").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_post_all_accepted_is_no_content() {
    let (app, sink) = app();
    let body = json!({"data": [{"e": "pv", "tv": "js-3"}, {"e": "se", "tv": "js-3", "se_ac": "click"}]});
    let response = app.oneshot(post(POST_PATH, body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(sink.len(), 2);
}

#[tokio::test]
async fn test_post_partial_success_reports_rejections() {
    let (app, sink) = app();
    let body = json!([{"e": "pv", "tv": "js-3"}, "oops", {"e": "pv"}]);
    let response = app.oneshot(post(POST_PATH, body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    assert_eq!(report["accepted"], 1);
    assert_eq!(report["rejected"][0]["index"], 1);
    assert_eq!(report["rejected"][0]["error"], "batch item is not a JSON object");
    assert_eq!(report["rejected"][1]["index"], 2);
    assert_eq!(sink.len(), 1);
}

#[tokio::test]
async fn test_post_empty_batch_is_no_content() {
    let (app, sink) = app();
    let response = app.oneshot(post(POST_PATH, json!({"data": []}))).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_post_nothing_accepted_is_bad_request() {
    let (app, _) = app();
    let response = app.oneshot(post("/tracker", json!({"tv": "js-3"}))).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_post_unparsable_body_is_bad_request() {
    let (app, _) = app();
    let request = Request::builder()
        .method("POST")
        .uri(POST_PATH)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cors_preflight_mirrors_origin() {
    let (app, _) = app();
    let request = Request::builder()
        .method("OPTIONS")
        .uri(POST_PATH)
        .header(header::ORIGIN, "https://shop.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert!(response.status().is_success());
    let headers = response.headers();
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "https://shop.example");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
}
