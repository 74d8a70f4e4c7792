use serde_json::Value;
use std::fmt;

#[cfg(feature = "validation")]
use crate::error::SchemaError;
#[cfg(feature = "validation")]
use schemars::{schema_for, JsonSchema};

/// One step of the path from the input root to an offending value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => write!(f, "{}", key),
            PathSegment::Index(index) => write!(f, "{}", index),
        }
    }
}

/// A single diagnostic produced by a validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub message: String,
    pub path: Vec<PathSegment>,
    pub code: String,
    pub expected: Option<String>,
    pub received: Option<String>,
}

impl Violation {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Violation {
            message: message.into(),
            path: Vec::new(),
            code: code.into(),
            expected: None,
            received: None,
        }
    }

    pub fn at(mut self, path: Vec<PathSegment>) -> Self {
        self.path = path;
        self
    }

    pub fn expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    pub fn received(mut self, received: impl Into<String>) -> Self {
        self.received = Some(received.into());
        self
    }

    /// Dotted path into the input, e.g. `items.0.name`.
    pub fn pointer(&self) -> String {
        self.path
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// Input validation applied before an operation handler runs.
///
/// On success returns the (possibly coerced) value handed to the handler.
pub trait Validator: Send + Sync {
    fn safe_parse(&self, input: &Value) -> Result<Value, Vec<Violation>>;
}

impl<F> Validator for F
where
    F: Fn(&Value) -> Result<Value, Vec<Violation>> + Send + Sync,
{
    fn safe_parse(&self, input: &Value) -> Result<Value, Vec<Violation>> {
        self(input)
    }
}

/// JSON type name as reported in `meta.received`.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Splits a JSON pointer into segments, using `root` to tell array
/// indices from object keys.
fn pointer_segments(pointer: &str, root: &Value) -> Vec<PathSegment> {
    let mut current = Some(root);
    pointer
        .split('/')
        .skip(1)
        .map(|raw| {
            let token = raw.replace("~1", "/").replace("~0", "~");
            let segment = match (current, token.parse::<usize>()) {
                (Some(Value::Array(_)), Ok(index)) => PathSegment::Index(index),
                _ => PathSegment::Key(token.clone()),
            };
            current = current.and_then(|value| match &segment {
                PathSegment::Index(index) => value.get(*index),
                PathSegment::Key(key) => value.get(key.as_str()),
            });
            segment
        })
        .collect()
}

/// Validator backed by a compiled JSON Schema.
#[cfg(feature = "validation")]
pub struct JsonSchemaValidator {
    schema: Value,
    compiled: jsonschema::Validator,
}

#[cfg(feature = "validation")]
impl JsonSchemaValidator {
    pub fn new(schema: Value) -> Result<Self, SchemaError> {
        let compiled = jsonschema::validator_for(&schema)
            .map_err(|e| SchemaError::Invalid(e.to_string()))?;
        Ok(JsonSchemaValidator { schema, compiled })
    }

    pub fn from_type<T: JsonSchema>() -> Result<Self, SchemaError> {
        let schema = schema_for!(T);
        let schema_value =
            serde_json::to_value(schema).map_err(|e| SchemaError::Generate(e.to_string()))?;
        Self::new(schema_value)
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    fn violation(&self, input: &Value, error: &jsonschema::ValidationError<'_>) -> Violation {
        let schema_path = error.schema_path.to_string();
        let keyword = schema_path.rsplit('/').next().unwrap_or_default();

        let mut violation = match keyword {
            "type" => Violation::new("invalid_type", error.to_string())
                .received(json_type_name(&error.instance)),
            "" => Violation::new("invalid", error.to_string()),
            other => Violation::new(other, error.to_string()),
        };

        if keyword == "type" {
            violation.expected = match self.schema.pointer(&schema_path) {
                Some(Value::String(expected)) => Some(expected.clone()),
                Some(Value::Array(options)) => Some(
                    options
                        .iter()
                        .filter_map(Value::as_str)
                        .collect::<Vec<_>>()
                        .join(" | "),
                ),
                _ => None,
            };
        }

        violation.at(pointer_segments(&error.instance_path.to_string(), input))
    }
}

#[cfg(feature = "validation")]
impl fmt::Debug for JsonSchemaValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSchemaValidator")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "validation")]
impl Validator for JsonSchemaValidator {
    fn safe_parse(&self, input: &Value) -> Result<Value, Vec<Violation>> {
        let violations: Vec<Violation> = self
            .compiled
            .iter_errors(input)
            .map(|error| self.violation(input, &error))
            .collect();

        if violations.is_empty() {
            Ok(input.clone())
        } else {
            Err(violations)
        }
    }
}
