//! Shared building blocks for typed server queries and mutations: the
//! `{ok, err, val}` result model, operation definitions with input
//! validation, the JSON wire codec and the client/server configuration.

pub mod codec;
pub mod config;
pub mod error;
pub mod operation;
pub mod result;
pub mod validate;

pub use codec::{
    deserialize_error_detail, deserialize_input, deserialize_result, serialize_error_detail,
    serialize_input, serialize_result,
};
pub use config::{Config, LogLevel, Logger, MemoryLogger, TracingLogger, DEFAULT_BASE_PATH};
pub use error::{DeserializationError, SchemaError, SerializationError};
pub use operation::{Operation, OperationFuture, OperationKind, OperationRef, ServerAction};
pub use result::{
    ErrorDetail, ErrorLinks, ErrorSource, IntoErrorList, QueryResult, VALIDATION_FAILED,
};
#[cfg(feature = "validation")]
pub use validate::JsonSchemaValidator;
pub use validate::{json_type_name, PathSegment, Validator, Violation};
