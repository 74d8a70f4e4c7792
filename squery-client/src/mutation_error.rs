use crate::caller::CallError;
use serde_json::Value;
use squery_core::ErrorDetail;
use std::fmt;
use std::sync::Arc;

pub const DEFAULT_MESSAGE: &str = "mutation error";

/// Failure of a mutation, carrying the error list exactly as the server sent it.
///
/// When the request itself failed (transport, codec, abort) the payload is
/// empty and the underlying error is available through [`MutationError::cause`].
#[derive(Debug, Clone, Default)]
pub struct MutationError {
    payload: Vec<ErrorDetail>,
    cause: Option<Arc<CallError>>,
}

impl MutationError {
    pub fn new(payload: Vec<ErrorDetail>) -> Self {
        MutationError {
            payload,
            cause: None,
        }
    }

    /// Accepts any JSON value; anything but an array of error objects yields
    /// an empty payload.
    pub fn from_value(value: Value) -> Self {
        let payload = match value {
            Value::Array(_) => serde_json::from_value(value).unwrap_or_default(),
            _ => Vec::new(),
        };
        Self::new(payload)
    }

    pub fn from_call(error: CallError) -> Self {
        let payload = match &error {
            CallError::Status { detail, .. } => vec![detail.clone()],
            _ => Vec::new(),
        };
        MutationError {
            payload,
            cause: Some(Arc::new(error)),
        }
    }

    pub fn payload(&self) -> &[ErrorDetail] {
        &self.payload
    }

    pub fn first(&self) -> Option<&ErrorDetail> {
        self.payload.first()
    }

    pub fn cause(&self) -> Option<&CallError> {
        self.cause.as_deref()
    }

    pub fn into_payload(self) -> Vec<ErrorDetail> {
        self.payload
    }

    /// `detail` (else `title`) of the first entry, suffixed with ` [code]`.
    pub fn message(&self) -> String {
        self.first()
            .and_then(describe)
            .or_else(|| self.cause.as_ref().map(|cause| cause.to_string()))
            .unwrap_or_else(|| DEFAULT_MESSAGE.to_string())
    }
}

fn describe(entry: &ErrorDetail) -> Option<String> {
    let non_empty = |s: &Option<String>| s.as_deref().filter(|s| !s.is_empty()).map(str::to_string);
    let text = non_empty(&entry.detail).or_else(|| non_empty(&entry.title));
    match (text, non_empty(&entry.code)) {
        (Some(text), Some(code)) => Some(format!("{} [{}]", text, code)),
        (Some(text), None) => Some(text),
        (None, Some(code)) => Some(code),
        (None, None) => None,
    }
}

impl fmt::Display for MutationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for MutationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

impl From<Vec<ErrorDetail>> for MutationError {
    fn from(payload: Vec<ErrorDetail>) -> Self {
        Self::new(payload)
    }
}

impl From<CallError> for MutationError {
    fn from(error: CallError) -> Self {
        Self::from_call(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use serde_json::json;
    use squery_transport::TransportError;

    #[test]
    fn test_message_uses_detail_and_code() {
        let err = MutationError::new(vec![ErrorDetail::new().with_detail("D").with_code("C")]);
        assert_eq!(err.message(), "D [C]");
        assert_eq!(err.to_string(), "D [C]");
    }

    #[test]
    fn test_message_falls_back_to_title_then_code() {
        let titled = MutationError::new(vec![ErrorDetail::new().with_title("T")]);
        assert_eq!(titled.message(), "T");

        let coded = MutationError::new(vec![ErrorDetail::new().with_code("C")]);
        assert_eq!(coded.message(), "C");
    }

    #[test]
    fn test_default_message() {
        assert_eq!(MutationError::new(vec![]).message(), DEFAULT_MESSAGE);
        assert_eq!(
            MutationError::new(vec![ErrorDetail::new()]).message(),
            DEFAULT_MESSAGE
        );
    }

    #[test]
    fn test_from_value_tolerates_non_arrays() {
        for value in [json!(null), json!("boom"), json!({"code": "C"}), json!(3)] {
            let err = MutationError::from_value(value);
            assert!(err.payload().is_empty());
            assert_eq!(err.message(), DEFAULT_MESSAGE);
        }

        let err = MutationError::from_value(json!([{"code": "a"}, {"code": "b"}]));
        assert_eq!(err.payload().len(), 2);
        assert_eq!(err.first().and_then(|e| e.code.as_deref()), Some("a"));
    }

    #[test]
    fn test_payload_is_kept_losslessly() {
        let entry = ErrorDetail::new()
            .with_id("e1")
            .with_status("409")
            .with_code("conflict")
            .with_pointer("name")
            .with_meta(json!({"existing": 4}));
        let err = MutationError::new(vec![entry.clone()]);
        assert_eq!(err.into_payload(), vec![entry]);
    }

    #[test]
    fn test_transport_failure_is_the_cause() {
        let err = MutationError::from_call(CallError::Transport(TransportError::Network(
            "connection refused".into(),
        )));
        assert!(err.payload().is_empty());
        assert!(err.cause().is_some());
        assert!(err.message().contains("connection refused"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_status_failure_keeps_detail_in_payload() {
        let err = MutationError::from_call(CallError::Status {
            status: StatusCode::NOT_FOUND,
            detail: ErrorDetail::titled("Not Found", "No matching query found for ID: x"),
        });
        assert_eq!(err.payload().len(), 1);
        assert_eq!(err.message(), "No matching query found for ID: x");
    }
}
