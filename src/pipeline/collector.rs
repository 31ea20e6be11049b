//! Request-level orchestration: decode, resolve, classify, map.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info_span, warn};

use crate::common::constants::{COOKIE_ENABLED, LANGUAGE, PLATFORM};
use crate::error::{DecodeError, EventError};
use crate::observability::metrics;
use crate::pipeline::ingestion::decoder::RequestDecoder;
use crate::pipeline::ingestion::envelope::Envelope;
use crate::pipeline::ingestion::request::RawRequest;
use crate::pipeline::processing::coerce::parse_bool;
use crate::pipeline::processing::context::{ContextResolver, DuplicatePolicy};
use crate::pipeline::processing::mapper::RowMapper;
use crate::pipeline::processing::request_meta::RequestMeta;
use crate::pipeline::processing::row::{NormalizedRow, Platform};
use crate::pipeline::processing::schema_registry::SchemaRegistry;
use crate::pipeline::processing::useragent::{UaHints, UserAgentClassifier};
use crate::pipeline::storage::RowSink;

/// Result for one event of a request, identified by its batch position.
#[derive(Debug, Clone)]
pub struct EventOutcome {
    pub index: usize,
    pub result: Result<NormalizedRow, EventError>,
}

/// Per-event outcomes of one request, in submission order.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub outcomes: Vec<EventOutcome>,
}

/// A rejected event as reported back to the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub index: usize,
    pub error: String,
}

impl BatchOutcome {
    /// Accepted rows in batch order.
    pub fn rows(&self) -> Vec<NormalizedRow> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok().cloned())
            .collect()
    }

    pub fn rejections(&self) -> Vec<Rejection> {
        self.outcomes
            .iter()
            .filter_map(|o| {
                o.result.as_ref().err().map(|e| Rejection {
                    index: o.index,
                    error: e.to_string(),
                })
            })
            .collect()
    }

    pub fn accepted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn rejected(&self) -> usize {
        self.outcomes.len() - self.accepted()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Hands the accepted rows to `sink` in batch order. Returns how many
    /// rows were written.
    pub async fn deliver(&self, sink: &dyn RowSink) -> crate::error::Result<usize> {
        let rows = self.rows();
        if rows.is_empty() {
            return Ok(0);
        }
        sink.write_rows(&rows).await?;
        debug!("Delivered {} rows to {} sink", rows.len(), sink.name());
        Ok(rows.len())
    }
}

/// The event normalization pipeline. Cheap to clone and safe to share across
/// request handlers; all state is read-only.
#[derive(Debug, Clone)]
pub struct Collector {
    decoder: RequestDecoder,
    resolver: ContextResolver,
    classifier: UserAgentClassifier,
    mapper: RowMapper,
}

impl Collector {
    pub fn new(registry: Arc<SchemaRegistry>, policy: DuplicatePolicy) -> Self {
        Self {
            decoder: RequestDecoder::new(),
            resolver: ContextResolver::new(registry, policy),
            classifier: UserAgentClassifier::new(),
            mapper: RowMapper::new(),
        }
    }

    /// Processes a request received now.
    pub fn process(&self, request: &RawRequest) -> Result<BatchOutcome, DecodeError> {
        self.process_at(request, Utc::now())
    }

    /// Processes a request with an explicit receipt time.
    pub fn process_at(&self, request: &RawRequest, received_at: DateTime<Utc>) -> Result<BatchOutcome, DecodeError> {
        let span = info_span!("collect", method = ?request.method);
        let _enter = span.enter();

        metrics::record_request(request.method);
        let decoded = self.decoder.decode(request).map_err(|e| {
            warn!("Rejecting request: {}", e);
            metrics::record_decode_error();
            e
        })?;
        metrics::record_batch_size(decoded.len());

        let meta = RequestMeta::from_headers(&request.headers, received_at);
        let outcomes: Vec<EventOutcome> = decoded
            .into_iter()
            .enumerate()
            .map(|(index, event)| EventOutcome {
                index,
                result: event.and_then(|envelope| self.process_envelope(&envelope, &meta)),
            })
            .collect();

        for outcome in &outcomes {
            if let Err(e) = &outcome.result {
                warn!("Event {} rejected: {}", outcome.index, e);
            }
        }

        let batch = BatchOutcome { outcomes };
        metrics::record_events(batch.accepted(), batch.rejected());
        debug!("Request produced {} rows, {} rejected", batch.accepted(), batch.rejected());
        Ok(batch)
    }

    fn process_envelope(&self, envelope: &Envelope, meta: &RequestMeta) -> Result<NormalizedRow, EventError> {
        let resolution = self.resolver.resolve(&envelope.contexts, envelope.unstructured.as_ref());
        metrics::record_resolution(&resolution.stats);

        let fields = &envelope.fields;
        let hints = UaHints {
            platform: fields.text(PLATFORM).and_then(|p| p.parse::<Platform>().ok()),
            language: fields.text(LANGUAGE).map(|l| l.into_owned()),
            cookies: fields
                .text(COOKIE_ENABLED)
                .and_then(|c| parse_bool(&c))
                .unwrap_or(meta.has_cookie_header),
        };
        let user_agent = self.classifier.classify(meta.user_agent.as_deref(), &hints);

        self.mapper.map(envelope, &resolution, &user_agent, meta)
    }
}
