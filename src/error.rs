use thiserror::Error;

/// Request-level failures: the transport envelope itself is malformed, so
/// nothing in the request can be trusted and the whole request is rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("invalid base64 in '{field}': {reason}")]
    Base64 { field: String, reason: String },

    #[error("decoded '{field}' is not valid UTF-8")]
    Utf8 { field: String },

    #[error("'{field}' is not valid JSON: {reason}")]
    Json { field: String, reason: String },

    #[error("request body must be a JSON object or a batch of objects")]
    UnexpectedBody,
}

/// Per-event failures. These reject one envelope and leave its batch
/// siblings untouched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventError {
    #[error("missing required field '{field}'")]
    MissingRequiredField { field: &'static str },

    #[error("unknown value '{value}' for field '{field}'")]
    UnknownEnumValue { field: &'static str, value: String },

    #[error("batch item is not a JSON object")]
    NotAnObject,
}

/// Process-level failures outside the per-request pipeline.
#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("Server error: {0}")]
    Server(String),
}

pub type Result<T> = std::result::Result<T, CollectorError>;
