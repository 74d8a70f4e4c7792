use crate::validate::Violation;
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Error code carried by every entry of a validation failure.
pub const VALIDATION_FAILED: &str = "validation_failed";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLinks {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Locates the part of the request an error refers to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pointer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
}

/// Structured error record shared by operation failures and routing failures.
///
/// No field is mandatory. `title` and `detail` are the human readable parts,
/// `status` is a string HTTP status code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<ErrorLinks>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ErrorSource>,
    /// `None` when the key is absent; an explicit `"meta": null` reads as
    /// `Some(Value::Null)` and is written back out.
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub meta: Option<Value>,
}

fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl ErrorDetail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn titled(title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new().with_title(title).with_detail(detail)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.source.get_or_insert_with(ErrorSource::default).pointer = Some(pointer.into());
        self
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Builds the fixed-shape entry reported for one schema violation.
    pub fn validation_failed(violation: &Violation) -> Self {
        let mut meta = Map::new();
        meta.insert("reason".into(), Value::String(violation.code.clone()));
        if let Some(expected) = &violation.expected {
            meta.insert("expected".into(), Value::String(expected.clone()));
        }
        if let Some(received) = &violation.received {
            meta.insert("received".into(), Value::String(received.clone()));
        }

        ErrorDetail::new()
            .with_code(VALIDATION_FAILED)
            .with_title("Validation failed")
            .with_detail(violation.message.clone())
            .with_pointer(violation.pointer())
            .with_meta(Value::Object(meta))
    }

    pub fn is_validation_failure(&self) -> bool {
        self.code.as_deref() == Some(VALIDATION_FAILED)
    }

    /// HTTP status derived from the `status` field.
    ///
    /// Leading digits are parsed, anything unparsable or zero falls back to 500.
    pub fn status_code(&self) -> u16 {
        self.status
            .as_deref()
            .map(|s| {
                let digits: String = s.trim_start().chars().take_while(char::is_ascii_digit).collect();
                digits.parse::<u16>().unwrap_or(0)
            })
            .filter(|code| *code != 0)
            .unwrap_or(500)
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.title, &self.detail) {
            (Some(title), Some(detail)) => write!(f, "{}: {}", title, detail),
            (Some(text), None) | (None, Some(text)) => write!(f, "{}", text),
            (None, None) => write!(f, "{}", self.code.as_deref().unwrap_or("unknown error")),
        }
    }
}

/// Anything that can stand in for the error list of an `Err` result.
///
/// A single error is wrapped into a one-element list.
pub trait IntoErrorList {
    fn into_error_list(self) -> Vec<ErrorDetail>;
}

impl IntoErrorList for ErrorDetail {
    fn into_error_list(self) -> Vec<ErrorDetail> {
        vec![self]
    }
}

impl IntoErrorList for Vec<ErrorDetail> {
    fn into_error_list(self) -> Vec<ErrorDetail> {
        self
    }
}

impl<const N: usize> IntoErrorList for [ErrorDetail; N] {
    fn into_error_list(self) -> Vec<ErrorDetail> {
        self.into()
    }
}

/// Outcome of a server query or mutation.
///
/// On the wire this is `{"ok":true,"err":false,"val":...}` or
/// `{"ok":false,"err":true,"val":[...]}`.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult<T = Value> {
    Ok(T),
    Err(Vec<ErrorDetail>),
}

impl<T> QueryResult<T> {
    pub fn ok(val: T) -> Self {
        QueryResult::Ok(val)
    }

    pub fn err(errors: impl IntoErrorList) -> Self {
        QueryResult::Err(errors.into_error_list())
    }

    /// An `Err` result with one `validation_failed` entry per violation.
    pub fn validation_failed(violations: &[Violation]) -> Self {
        QueryResult::Err(violations.iter().map(ErrorDetail::validation_failed).collect())
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, QueryResult::Ok(_))
    }

    pub fn is_err(&self) -> bool {
        matches!(self, QueryResult::Err(_))
    }

    /// True for a non-empty error list made only of validation entries.
    pub fn is_validation_error(&self) -> bool {
        match self {
            QueryResult::Err(errors) => {
                !errors.is_empty() && errors.iter().all(ErrorDetail::is_validation_failure)
            }
            QueryResult::Ok(_) => false,
        }
    }

    pub fn ok_value(&self) -> Option<&T> {
        match self {
            QueryResult::Ok(val) => Some(val),
            QueryResult::Err(_) => None,
        }
    }

    pub fn into_ok(self) -> Option<T> {
        match self {
            QueryResult::Ok(val) => Some(val),
            QueryResult::Err(_) => None,
        }
    }

    /// The error list, empty for `Ok`.
    pub fn errors(&self) -> &[ErrorDetail] {
        match self {
            QueryResult::Ok(_) => &[],
            QueryResult::Err(errors) => errors,
        }
    }

    pub fn first_error(&self) -> Option<&ErrorDetail> {
        self.errors().first()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> QueryResult<U> {
        match self {
            QueryResult::Ok(val) => QueryResult::Ok(f(val)),
            QueryResult::Err(errors) => QueryResult::Err(errors),
        }
    }

    pub fn into_std(self) -> Result<T, Vec<ErrorDetail>> {
        self.into()
    }
}

impl<T: Serialize> QueryResult<T> {
    /// Erases the payload type into a JSON value.
    pub fn into_value(self) -> Result<QueryResult<Value>, serde_json::Error> {
        Ok(match self {
            QueryResult::Ok(val) => QueryResult::Ok(serde_json::to_value(val)?),
            QueryResult::Err(errors) => QueryResult::Err(errors),
        })
    }
}

impl<T> From<Result<T, Vec<ErrorDetail>>> for QueryResult<T> {
    fn from(result: Result<T, Vec<ErrorDetail>>) -> Self {
        match result {
            Ok(val) => QueryResult::Ok(val),
            Err(errors) => QueryResult::Err(errors),
        }
    }
}

impl<T> From<QueryResult<T>> for Result<T, Vec<ErrorDetail>> {
    fn from(result: QueryResult<T>) -> Self {
        match result {
            QueryResult::Ok(val) => Ok(val),
            QueryResult::Err(errors) => Err(errors),
        }
    }
}

impl<T: Serialize> Serialize for QueryResult<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("QueryResult", 3)?;
        match self {
            QueryResult::Ok(val) => {
                state.serialize_field("ok", &true)?;
                state.serialize_field("err", &false)?;
                state.serialize_field("val", val)?;
            }
            QueryResult::Err(errors) => {
                state.serialize_field("ok", &false)?;
                state.serialize_field("err", &true)?;
                state.serialize_field("val", errors)?;
            }
        }
        state.end()
    }
}

#[derive(Deserialize)]
struct Envelope {
    ok: bool,
    err: bool,
    // A missing `val` is how an `Ok(undefined)` arrives.
    #[serde(default)]
    val: Value,
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for QueryResult<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let envelope = Envelope::deserialize(deserializer)?;
        match (envelope.ok, envelope.err) {
            (true, false) => serde_json::from_value(envelope.val)
                .map(QueryResult::Ok)
                .map_err(de::Error::custom),
            (false, true) => serde_json::from_value::<Vec<ErrorDetail>>(envelope.val)
                .map(QueryResult::Err)
                .map_err(de::Error::custom),
            (ok, err) => Err(de::Error::custom(format!(
                "inconsistent result flags: ok={} err={}",
                ok, err
            ))),
        }
    }
}
