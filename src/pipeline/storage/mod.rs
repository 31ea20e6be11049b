// Pipeline storage: the sink port and its implementations

pub mod in_memory;
pub mod json_lines;

use async_trait::async_trait;

use crate::error::Result;
use crate::pipeline::processing::row::NormalizedRow;

pub use in_memory::InMemorySink;
pub use json_lines::JsonLinesSink;

/// Destination for accepted rows. Rows arrive in batch order; delivery
/// guarantees are up to the implementation.
#[async_trait]
pub trait RowSink: Send + Sync {
    async fn write_rows(&self, rows: &[NormalizedRow]) -> Result<()>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}
