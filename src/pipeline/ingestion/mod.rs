// Pipeline ingestion: raw requests decoded into envelopes

pub mod decoder;
pub mod envelope;
pub mod request;

pub use decoder::{DecodedEvent, RequestDecoder};
pub use envelope::{Envelope, FieldValue, Fields, RawContext, RawPayload};
pub use request::{HttpMethod, RawRequest, RequestHeaders};
