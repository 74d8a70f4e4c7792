use crate::registry::{Registry, RegistryError};
use axum::{
    extract::State,
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::FutureExt;
use serde_json::Value;
use squery_core::{
    deserialize_input, serialize_error_detail, serialize_result, ErrorDetail, Logger, Operation,
    OperationKind, QueryResult, TracingLogger,
};
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// Options for configuring the route handler.
#[derive(Clone)]
pub struct HandlerOptions {
    pub logger: Arc<dyn Logger>,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        HandlerOptions {
            logger: Arc::new(TracingLogger),
        }
    }
}

impl fmt::Debug for HandlerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerOptions").finish_non_exhaustive()
    }
}

/// Status and JSON body produced for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteResponse {
    pub status: StatusCode,
    pub body: String,
}

impl RouteResponse {
    fn ok(body: String) -> Self {
        RouteResponse {
            status: StatusCode::OK,
            body,
        }
    }

    /// A routing or execution failure. The bare error object is the body and
    /// its `status` field becomes the HTTP status.
    pub fn error(detail: ErrorDetail) -> Self {
        let status =
            StatusCode::from_u16(detail.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serialize_error_detail(&detail).unwrap_or_else(|_| {
            r#"{"status":"500","title":"Internal Server Error"}"#.to_string()
        });
        RouteResponse { status, body }
    }
}

impl IntoResponse for RouteResponse {
    fn into_response(self) -> Response {
        (
            self.status,
            [(header::CONTENT_TYPE, "application/json")],
            self.body,
        )
            .into_response()
    }
}

/// Trailing non-empty path segment, if any.
fn extract_operation_id(path: &str) -> Option<&str> {
    path.split('/').filter(|segment| !segment.is_empty()).next_back()
}

/// First `payload` query parameter; an empty value counts as absent.
fn payload_param(uri: &Uri) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "payload")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "Unknown error".to_string()
    }
}

/// Resolves requests to registered operations and runs them.
///
/// Queries answer GET, mutations answer POST. Operation outcomes, including
/// validation failures, are returned as `200` with a result body.
#[derive(Clone)]
pub struct RouteHandler {
    registry: Arc<Registry>,
    options: HandlerOptions,
}

impl RouteHandler {
    pub fn new(
        operations: impl IntoIterator<Item = Operation>,
        options: HandlerOptions,
    ) -> Result<Self, RegistryError> {
        Ok(Self::from_registry(Registry::from_operations(operations)?, options))
    }

    pub fn from_registry(registry: Registry, options: HandlerOptions) -> Self {
        RouteHandler {
            registry: Arc::new(registry),
            options,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub async fn handle_get(&self, uri: &Uri) -> RouteResponse {
        self.handle(OperationKind::Query, uri, payload_param(uri)).await
    }

    pub async fn handle_post(&self, uri: &Uri, body: &str) -> RouteResponse {
        let payload = Some(body.to_string()).filter(|body| !body.is_empty());
        self.handle(OperationKind::Mutation, uri, payload).await
    }

    async fn handle(&self, verb: OperationKind, uri: &Uri, payload: Option<String>) -> RouteResponse {
        let logger = self.options.logger.as_ref();

        let Some(id) = extract_operation_id(uri.path()) else {
            logger.error(&format!(
                "Error handling server query request: No query ID found in URL! {}",
                uri
            ));
            return RouteResponse::error(
                ErrorDetail::new()
                    .with_status("400")
                    .with_title("Bad Request")
                    .with_detail("No query ID found in URL!"),
            );
        };

        let Some(operation) = self.registry.lookup(id) else {
            logger.error(&format!(
                "Error handling server query request: No matching query found for ID: {}",
                id
            ));
            return RouteResponse::error(
                ErrorDetail::new()
                    .with_status("404")
                    .with_title("Not Found")
                    .with_detail(format!("No matching query found for ID: {}", id)),
            );
        };

        if operation.kind() != verb {
            let detail = format!(
                "Query with id {} is not a {}, instead has type: {}!",
                id,
                verb,
                operation.kind()
            );
            logger.error(&format!("Error handling server query request: {}", detail));
            return RouteResponse::error(
                ErrorDetail::new()
                    .with_status("405")
                    .with_title("Method Not Allowed")
                    .with_detail(detail),
            );
        }

        debug!(id, kind = %verb, has_payload = payload.is_some(), "Dispatching operation");

        let outcome = match self.execute(operation, payload).await {
            Ok(result) => serialize_result(&result).map_err(|e| e.to_string()),
            Err(message) => Err(message),
        };

        match outcome {
            Ok(body) => RouteResponse::ok(body),
            Err(message) => {
                logger.error(&format!(
                    "Error handling server query request: {} {}",
                    message, uri
                ));
                RouteResponse::error(
                    ErrorDetail::new()
                        .with_status("500")
                        .with_title("Internal Server Error")
                        .with_detail(message),
                )
            }
        }
    }

    /// Decodes the payload and awaits the operation. Any failure, including a
    /// panic inside the handler, comes back as a message.
    async fn execute(&self, operation: &Operation, payload: Option<String>) -> Result<QueryResult, String> {
        let input = payload
            .as_deref()
            .map(deserialize_input::<Value>)
            .transpose()
            .map_err(|e| e.to_string())?;

        let logger = self.options.logger.clone();
        let run = async move { operation.call(input, logger.as_ref()).await };

        match AssertUnwindSafe(run).catch_unwind().await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(error)) => Err(error.to_string()),
            Err(panic) => Err(panic_message(panic)),
        }
    }

    /// Mounts GET and POST at `{base_path}` and `{base_path}/{*id}`.
    pub fn router(self, base_path: &str) -> Router {
        let base = base_path.trim_end_matches('/');
        let root = if base.is_empty() { "/".to_string() } else { base.to_string() };
        let wildcard = format!("{}/{{*id}}", base);

        Router::new()
            .route(&root, get(handle_get).post(handle_post))
            .route(&wildcard, get(handle_get).post(handle_post))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::new(self))
    }

    /// Serves the router on an already bound listener until the task is dropped.
    pub async fn serve(self, listener: TcpListener, base_path: &str) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        info!(
            operations = self.registry.len(),
            "Route handler listening on http://{}{}",
            addr,
            base_path
        );
        axum::serve(listener, self.router(base_path)).await
    }
}

impl fmt::Debug for RouteHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteHandler")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

async fn handle_get(State(handler): State<Arc<RouteHandler>>, uri: Uri) -> RouteResponse {
    handler.handle_get(&uri).await
}

async fn handle_post(
    State(handler): State<Arc<RouteHandler>>,
    uri: Uri,
    body: String,
) -> RouteResponse {
    handler.handle_post(&uri, &body).await
}
