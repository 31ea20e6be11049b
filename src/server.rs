use axum::{
    body::Bytes,
    extract::{ConnectInfo, RawQuery},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Extension, Router,
};
use hyper::Server;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tracing::{error, info, warn};

use crate::common::constants::PIXEL_GIF;
use crate::config::{Config, ServerConfig, SinkKind};
use crate::error::{CollectorError, Result};
use crate::observability::metrics;
use crate::pipeline::collector::{BatchOutcome, Collector, Rejection};
use crate::pipeline::ingestion::request::{HttpMethod, RawRequest, RequestHeaders};
use crate::pipeline::processing::request_meta::client_ip;
use crate::pipeline::storage::{InMemorySink, JsonLinesSink, RowSink};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub collector: Arc<Collector>,
    pub sink: Arc<dyn RowSink>,
}

impl AppState {
    pub fn new(collector: Collector, sink: Arc<dyn RowSink>) -> Self {
        Self {
            collector: Arc::new(collector),
            sink,
        }
    }

    /// Builds the pipeline and the configured sink.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let registry = Arc::new(config.schema_registry());
        let collector = Collector::new(registry, config.contexts.duplicate_policy);
        let sink: Arc<dyn RowSink> = match config.sink.kind {
            SinkKind::Memory => Arc::new(InMemorySink::new()),
            SinkKind::JsonLines => Arc::new(JsonLinesSink::open(&config.sink.path).await?),
        };
        Ok(Self::new(collector, sink))
    }
}

/// Body of a POST response when some events were rejected.
#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub accepted: usize,
    pub rejected: Vec<Rejection>,
}

impl From<&BatchOutcome> for BatchReport {
    fn from(batch: &BatchOutcome) -> Self {
        Self {
            accepted: batch.accepted(),
            rejected: batch.rejections(),
        }
    }
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "tracker-collector",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn metrics_endpoint() -> Response {
    match metrics::render() {
        Some(text) => ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], text).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}

/// Tracking pixel: events arrive in the query string.
async fn pixel(
    Extension(state): Extension<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    let mut request = RawRequest::get(query.unwrap_or_default());
    request.headers = request_headers(&headers, peer.map(|ConnectInfo(addr)| addr));

    let batch = match state.collector.process(&request) {
        Ok(batch) => batch,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    if let Some(rejection) = batch.rejections().into_iter().next() {
        return (StatusCode::BAD_REQUEST, rejection.error).into_response();
    }
    if batch.accepted() == 0 {
        return (StatusCode::BAD_REQUEST, "no event in request").into_response();
    }
    if let Err(response) = deliver(&state, &batch).await {
        return response;
    }

    (
        [
            (header::CONTENT_TYPE, "image/gif"),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
        ],
        PIXEL_GIF,
    )
        .into_response()
}

/// JSON (or form-encoded) batch submission.
async fn batch(
    Extension(state): Extension<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = RawRequest {
        method: HttpMethod::Post,
        query: String::new(),
        body: body.to_vec(),
        headers: request_headers(&headers, peer.map(|ConnectInfo(addr)| addr)),
    };

    let batch = match state.collector.process(&request) {
        Ok(batch) => batch,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    if let Err(response) = deliver(&state, &batch).await {
        return response;
    }

    let report = BatchReport::from(&batch);
    if batch.is_empty() || report.rejected.is_empty() {
        StatusCode::NO_CONTENT.into_response()
    } else if report.accepted == 0 {
        (StatusCode::BAD_REQUEST, Json(report)).into_response()
    } else {
        (StatusCode::OK, Json(report)).into_response()
    }
}

async fn deliver(state: &AppState, batch: &BatchOutcome) -> std::result::Result<(), Response> {
    batch.deliver(state.sink.as_ref()).await.map(|_| ()).map_err(|e| {
        error!("Failed to write rows to {} sink: {}", state.sink.name(), e);
        (StatusCode::INTERNAL_SERVER_ERROR, "failed to store events").into_response()
    })
}

/// Extracts the headers the pipeline reads, resolving the client address
/// from forwarding headers or the socket peer.
pub fn request_headers(headers: &HeaderMap, peer: Option<SocketAddr>) -> RequestHeaders {
    let text = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
    RequestHeaders {
        user_agent: text(header::USER_AGENT.as_str()),
        client_ip: client_ip(
            text("x-forwarded-for").as_deref(),
            text("x-real-ip").as_deref(),
            peer.map(|addr| addr.ip()),
        ),
        content_type: text(header::CONTENT_TYPE.as_str()),
        cookie: text(header::COOKIE.as_str()),
    }
}

/// Permissive CORS that mirrors the caller's origin so credentialed
/// requests from any site are allowed.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Create the HTTP router with the tracking, health, and metrics routes
pub fn create_server(state: AppState, server: &ServerConfig) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route(&server.get_endpoint, get(pixel))
        .route(&server.post_endpoint, post(batch));

    for alias in &server.post_aliases {
        if alias == &server.post_endpoint || alias == &server.get_endpoint {
            warn!("Ignoring POST alias '{}' that shadows another route", alias);
            continue;
        }
        router = router.route(alias, post(batch));
    }

    router
        .layer(Extension(state))
        .layer(ServiceBuilder::new().layer(cors_layer()))
}

/// Start the HTTP server and run until Ctrl-C.
pub async fn run_server(config: &Config, state: AppState) -> Result<()> {
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .map_err(|e| CollectorError::Config(format!("Invalid bind address '{}': {}", config.bind_address(), e)))?;
    let app = create_server(state, &config.server);

    info!("Collector listening on http://{}", addr);
    info!("GET pixel: {}  POST batch: {}", config.server.get_endpoint, config.server.post_endpoint);

    Server::try_bind(&addr)
        .map_err(|e| CollectorError::Server(format!("Failed to bind {}: {}", addr, e)))?
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .map_err(|e| CollectorError::Server(e.to_string()))
}
