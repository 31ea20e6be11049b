//! Collector metrics
//!
//! Recording goes through the `metrics` facade. Until `init()` installs the
//! Prometheus recorder every call below is a no-op, so library users and tests
//! never need a recorder.

use std::fmt;
use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::error::{CollectorError, Result};
use crate::pipeline::ingestion::request::HttpMethod;
use crate::pipeline::processing::context::ResolutionStats;

/// All metric names used by the collector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    RequestsTotal,
    DecodeErrorsTotal,
    EventsAccepted,
    EventsRejected,
    ContextsRepaired,
    ContextsUnrecognized,
    BatchSize,
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::RequestsTotal => "collector_requests_total",
            MetricName::DecodeErrorsTotal => "collector_decode_errors_total",
            MetricName::EventsAccepted => "collector_events_accepted_total",
            MetricName::EventsRejected => "collector_events_rejected_total",
            MetricName::ContextsRepaired => "collector_contexts_repaired_total",
            MetricName::ContextsUnrecognized => "collector_contexts_unrecognized_total",
            MetricName::BatchSize => "collector_batch_size",
        }
    }

    pub fn all_metrics() -> impl Iterator<Item = MetricName> {
        use MetricName::*;
        [
            RequestsTotal,
            DecodeErrorsTotal,
            EventsAccepted,
            EventsRejected,
            ContextsRepaired,
            ContextsUnrecognized,
            BatchSize,
        ]
        .into_iter()
    }

    /// Help text for the metric
    pub fn description(&self) -> &'static str {
        match self {
            MetricName::RequestsTotal => "Tracking requests received, by method",
            MetricName::DecodeErrorsTotal => "Requests rejected before any event was decoded",
            MetricName::EventsAccepted => "Events normalized into rows",
            MetricName::EventsRejected => "Events rejected individually",
            MetricName::ContextsRepaired => "Context payloads that needed JSON repair",
            MetricName::ContextsUnrecognized => "Contexts with a schema outside the registry",
            MetricName::BatchSize => "Events per request",
        }
    }
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the Prometheus recorder. Calling it again is harmless.
pub fn init() -> Result<()> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| CollectorError::Server(format!("Failed to install Prometheus recorder: {}", e)))?;

    for metric in MetricName::all_metrics() {
        match metric {
            MetricName::BatchSize => ::metrics::describe_histogram!(metric.as_str(), metric.description()),
            _ => ::metrics::describe_counter!(metric.as_str(), metric.description()),
        }
    }

    METRICS_HANDLE.set(handle).ok();
    info!("Metrics recorder installed");
    Ok(())
}

/// Prometheus text exposition, or `None` before `init()`.
pub fn render() -> Option<String> {
    METRICS_HANDLE.get().map(|handle| handle.render())
}

pub fn record_request(method: HttpMethod) {
    let method = match method {
        HttpMethod::Get => "GET",
        HttpMethod::Post => "POST",
    };
    ::metrics::counter!(MetricName::RequestsTotal.as_str(), "method" => method).increment(1);
}

pub fn record_decode_error() {
    ::metrics::counter!(MetricName::DecodeErrorsTotal.as_str()).increment(1);
}

pub fn record_batch_size(events: usize) {
    ::metrics::histogram!(MetricName::BatchSize.as_str()).record(events as f64);
}

pub fn record_events(accepted: usize, rejected: usize) {
    ::metrics::counter!(MetricName::EventsAccepted.as_str()).increment(accepted as u64);
    ::metrics::counter!(MetricName::EventsRejected.as_str()).increment(rejected as u64);
}

pub fn record_resolution(stats: &ResolutionStats) {
    if stats.repaired > 0 {
        ::metrics::counter!(MetricName::ContextsRepaired.as_str()).increment(stats.repaired as u64);
    }
    if stats.unrecognized > 0 {
        ::metrics::counter!(MetricName::ContextsUnrecognized.as_str()).increment(stats.unrecognized as u64);
    }
}
