use thiserror::Error;

/// Raised when a value cannot be turned into wire text.
#[derive(Debug, Error)]
#[error("failed to serialize {what}: {source}")]
pub struct SerializationError {
    pub what: &'static str,
    #[source]
    pub source: serde_json::Error,
}

/// Raised when wire text is malformed or has the wrong shape.
#[derive(Debug, Error)]
#[error("failed to deserialize {what}: {source}")]
pub struct DeserializationError {
    pub what: &'static str,
    #[source]
    pub source: serde_json::Error,
}

impl SerializationError {
    pub fn new(what: &'static str, source: serde_json::Error) -> Self {
        SerializationError { what, source }
    }
}

impl DeserializationError {
    pub fn new(what: &'static str, source: serde_json::Error) -> Self {
        DeserializationError { what, source }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("Invalid schema: {0}")]
    Invalid(String),
    #[error("Schema generation error: {0}")]
    Generate(String),
}
