// Pipeline processing: context resolution, user-agent classification, and row mapping

pub mod coerce;
pub mod context;
pub mod json_repair;
pub mod mapper;
pub mod request_meta;
pub mod row;
pub mod schema_registry;
pub mod useragent;

pub use context::{ContextResolver, DuplicatePolicy};
pub use mapper::RowMapper;
pub use row::NormalizedRow;
pub use schema_registry::SchemaRegistry;
pub use useragent::UserAgentClassifier;
