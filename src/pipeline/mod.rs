// Event pipeline: ingestion, processing, and storage

pub mod collector;
pub mod ingestion;
pub mod processing;
pub mod storage;

pub use collector::{BatchOutcome, Collector, EventOutcome};
