// Typed caller for a single server operation
// Queries travel as GET with a `payload` query parameter, mutations as a POST body

use http::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use squery_core::{
    deserialize_error_detail, deserialize_result, serialize_input, Config, DeserializationError,
    ErrorDetail, OperationKind, OperationRef, QueryResult, SerializationError,
};
use squery_transport::{HttpRequest, HttpTransport, TransportError};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

#[derive(Debug, Error)]
pub enum CallError {
    #[error(transparent)]
    Serialize(#[from] SerializationError),
    #[error(transparent)]
    Deserialize(#[from] DeserializationError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Request aborted")]
    Aborted,
    /// Non-2xx response whose body is a bare error detail rather than a result.
    #[error("HTTP {status}: {detail}")]
    Status {
        status: StatusCode,
        detail: ErrorDetail,
    },
}

impl CallError {
    pub fn is_aborted(&self) -> bool {
        matches!(
            self,
            CallError::Aborted | CallError::Transport(TransportError::Aborted)
        )
    }
}

/// Per-call request options.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Extra headers; these override the default `Content-Type`.
    pub headers: Vec<(String, String)>,
    pub signal: Option<CancellationToken>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }
}

/// Invokes one operation over HTTP and decodes its `{ok, err, val}` result.
pub struct Caller<I = serde_json::Value, O = serde_json::Value> {
    operation: OperationRef<I, O>,
    transport: Arc<dyn HttpTransport>,
    config: Config,
}

impl<I, O> Caller<I, O> {
    pub fn new(
        operation: OperationRef<I, O>,
        transport: Arc<dyn HttpTransport>,
        config: Config,
    ) -> Self {
        Caller {
            operation,
            transport,
            config,
        }
    }

    pub fn operation(&self) -> &OperationRef<I, O> {
        &self.operation
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl<I: Serialize, O: DeserializeOwned> Caller<I, O> {
    /// Builds the HTTP request without sending it.
    ///
    /// An absent or falsy input (`null`, `false`, `0`, `""`) sends no payload at all.
    pub fn build_request(
        &self,
        input: Option<&I>,
        options: &CallOptions,
    ) -> Result<HttpRequest, CallError> {
        let path = self.config.operation_path(self.operation.id());
        let payload = match input {
            Some(input) => Some(serialize_input(input)?).filter(|text| !is_falsy(text)),
            None => None,
        };

        let request = match self.operation.kind() {
            OperationKind::Query => match payload {
                Some(payload) => {
                    let query = url::form_urlencoded::Serializer::new(String::new())
                        .append_pair("payload", &payload)
                        .finish();
                    HttpRequest::get(format!("{}?{}", path, query))
                }
                None => HttpRequest::get(path),
            },
            OperationKind::Mutation => match payload {
                Some(payload) => HttpRequest::post(path).body(payload),
                None => HttpRequest::post(path),
            },
        };

        let mut request = request.header("Content-Type", "application/json")?;
        for (name, value) in &options.headers {
            request = request.header(name, value)?;
        }
        Ok(request)
    }

    /// Sends the request and decodes the response body.
    ///
    /// The body is read as a result first whatever the status; only a non-2xx
    /// body that fails to parse as one is tried as a bare error detail.
    pub async fn call(
        &self,
        input: Option<&I>,
        options: CallOptions,
    ) -> Result<QueryResult<O>, CallError> {
        let request = self.build_request(input, &options)?;
        debug!(
            id = %self.operation.id(),
            method = %request.method,
            path = %request.path,
            "Calling server operation"
        );

        let send = self.transport.send(request);
        let response = match &options.signal {
            Some(signal) => {
                tokio::select! {
                    biased;
                    _ = signal.cancelled() => return Err(CallError::Aborted),
                    response = send => response?,
                }
            }
            None => send.await?,
        };
        trace!(status = %response.status, body = %response.body, "Operation response");

        match deserialize_result::<O>(&response.body) {
            Ok(result) => Ok(result),
            Err(err) if !response.is_success() => match deserialize_error_detail(&response.body) {
                Ok(detail) => {
                    debug!(status = %response.status, "Operation request rejected");
                    Err(CallError::Status {
                        status: response.status,
                        detail,
                    })
                }
                Err(_) => Err(err.into()),
            },
            Err(err) => Err(err.into()),
        }
    }
}

/// JSON text for a value that counts as no input.
fn is_falsy(text: &str) -> bool {
    matches!(text, "null" | "false" | "\"\"") || text.parse::<f64>().is_ok_and(|n| n == 0.0)
}

impl<I, O> Clone for Caller<I, O> {
    fn clone(&self) -> Self {
        Caller {
            operation: self.operation.clone(),
            transport: Arc::clone(&self.transport),
            config: self.config.clone(),
        }
    }
}

impl<I, O> fmt::Debug for Caller<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Caller")
            .field("operation", &self.operation)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
