use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::RowSink;
use crate::error::{CollectorError, Result};
use crate::pipeline::processing::row::NormalizedRow;

/// In-memory sink for development and testing
#[derive(Clone, Default)]
pub struct InMemorySink {
    rows: Arc<Mutex<Vec<NormalizedRow>>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything written so far.
    pub fn rows(&self) -> Vec<NormalizedRow> {
        self.rows.lock().map(|rows| rows.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RowSink for InMemorySink {
    async fn write_rows(&self, rows: &[NormalizedRow]) -> Result<()> {
        let mut stored = self
            .rows
            .lock()
            .map_err(|_| CollectorError::Sink("in-memory sink lock poisoned".to_string()))?;
        stored.extend_from_slice(rows);

        debug!("Stored {} rows in memory ({} total)", rows.len(), stored.len());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
