use crate::config::Logger;
use crate::result::QueryResult;
use crate::validate::{Validator, Violation};
use futures::future::{self, BoxFuture, Either, FutureExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Future returned by an operation. `Err` means the handler failed outright
/// and is reported as a transport execution error, not as a result.
pub type OperationFuture = BoxFuture<'static, anyhow::Result<QueryResult>>;

type OperationFn = dyn Fn(Option<Value>, &dyn Logger) -> OperationFuture + Send + Sync;

/// Whether an operation reads (`query`, GET) or writes (`mutation`, POST).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Query,
    Mutation,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
        }
    }

    pub fn http_method(self) -> http::Method {
        match self {
            OperationKind::Query => http::Method::GET,
            OperationKind::Mutation => http::Method::POST,
        }
    }

    pub fn from_method(method: &http::Method) -> Option<Self> {
        match *method {
            http::Method::GET => Some(OperationKind::Query),
            http::Method::POST => Some(OperationKind::Mutation),
            _ => None,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn erase<T: Serialize>(result: anyhow::Result<QueryResult<T>>) -> anyhow::Result<QueryResult> {
    Ok(result?.into_value()?)
}

/// Wraps `handler` with the optional validation step.
///
/// Without a validator the input is ignored and the handler sees `null`.
fn build_func<F, Fut, T>(validator: Option<Arc<dyn Validator>>, handler: F) -> Arc<OperationFn>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<QueryResult<T>>> + Send + 'static,
    T: Serialize + 'static,
{
    Arc::new(move |input: Option<Value>, logger: &dyn Logger| -> OperationFuture {
        let Some(validator) = &validator else {
            return handler(Value::Null).map(erase).boxed();
        };

        let raw = input.unwrap_or(Value::Null);
        match validator.safe_parse(&raw) {
            Ok(parsed) => handler(parsed).map(erase).boxed(),
            Err(violations) => {
                let summary = violations
                    .iter()
                    .map(|v| format!("{} at '{}' ({})", v.message, v.pointer(), v.code))
                    .collect::<Vec<_>>()
                    .join("; ");
                logger.error(&format!("[Server Query] Validation failed: {}", summary));

                future::ready(Ok(QueryResult::validation_failed(&violations))).boxed()
            }
        }
    })
}

/// Adapts a handler taking a typed input. A validated value that still does
/// not fit `I` is reported as a validation failure.
fn typed<I, F, Fut, T>(
    handler: F,
) -> impl Fn(Value) -> Either<Fut, future::Ready<anyhow::Result<QueryResult<T>>>> + Send + Sync + 'static
where
    I: DeserializeOwned,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<QueryResult<T>>> + Send + 'static,
    T: Send,
{
    move |value: Value| match serde_json::from_value::<I>(value) {
        Ok(input) => Either::Left(handler(input)),
        Err(e) => Either::Right(future::ready(Ok(QueryResult::validation_failed(&[
            Violation::new("invalid_input", e.to_string()),
        ])))),
    }
}

/// A named server query or mutation.
///
/// Built once, immutable afterwards. Clones share the underlying function.
#[derive(Clone)]
pub struct Operation {
    id: String,
    kind: OperationKind,
    func: Arc<OperationFn>,
}

impl Operation {
    pub fn define<F, Fut, T>(
        id: impl Into<String>,
        kind: OperationKind,
        validator: Option<Arc<dyn Validator>>,
        handler: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<QueryResult<T>>> + Send + 'static,
        T: Serialize + 'static,
    {
        Operation {
            id: id.into(),
            kind,
            func: build_func(validator, handler),
        }
    }

    /// A query without input.
    pub fn query<F, Fut, T>(id: impl Into<String>, handler: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<QueryResult<T>>> + Send + 'static,
        T: Serialize + 'static,
    {
        Self::define(id, OperationKind::Query, None, move |_| handler())
    }

    pub fn query_with<I, F, Fut, T>(
        id: impl Into<String>,
        validator: impl Validator + 'static,
        handler: F,
    ) -> Self
    where
        I: DeserializeOwned + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<QueryResult<T>>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        Self::define(id, OperationKind::Query, Some(Arc::new(validator)), typed(handler))
    }

    /// A mutation without input.
    pub fn mutation<F, Fut, T>(id: impl Into<String>, handler: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<QueryResult<T>>> + Send + 'static,
        T: Serialize + 'static,
    {
        Self::define(id, OperationKind::Mutation, None, move |_| handler())
    }

    pub fn mutation_with<I, F, Fut, T>(
        id: impl Into<String>,
        validator: impl Validator + 'static,
        handler: F,
    ) -> Self
    where
        I: DeserializeOwned + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<QueryResult<T>>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        Self::define(
            id,
            OperationKind::Mutation,
            Some(Arc::new(validator)),
            typed(handler),
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Runs the operation; validation diagnostics go to `logger`.
    pub fn call(&self, input: Option<Value>, logger: &dyn Logger) -> OperationFuture {
        (self.func)(input, logger)
    }

    /// The client-side view of this operation.
    pub fn reference<I, O>(&self) -> OperationRef<I, O> {
        OperationRef::new(self.id.clone(), self.kind)
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Identifier and kind of an operation, typed by its input and output.
///
/// This is all a caller needs; the server function never leaves the server.
pub struct OperationRef<I = Value, O = Value> {
    id: String,
    kind: OperationKind,
    _marker: PhantomData<fn(I) -> O>,
}

impl<I, O> OperationRef<I, O> {
    pub fn new(id: impl Into<String>, kind: OperationKind) -> Self {
        OperationRef {
            id: id.into(),
            kind,
            _marker: PhantomData,
        }
    }

    pub fn query(id: impl Into<String>) -> Self {
        Self::new(id, OperationKind::Query)
    }

    pub fn mutation(id: impl Into<String>) -> Self {
        Self::new(id, OperationKind::Mutation)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn typed<I2, O2>(self) -> OperationRef<I2, O2> {
        OperationRef::new(self.id, self.kind)
    }
}

impl<I, O> Clone for OperationRef<I, O> {
    fn clone(&self) -> Self {
        OperationRef::new(self.id.clone(), self.kind)
    }
}

impl<I, O> fmt::Debug for OperationRef<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationRef")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

/// A validated async function invoked in-process rather than over HTTP.
#[derive(Clone)]
pub struct ServerAction {
    func: Arc<OperationFn>,
}

impl ServerAction {
    pub fn new<F, Fut, T>(validator: Option<Arc<dyn Validator>>, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<QueryResult<T>>> + Send + 'static,
        T: Serialize + 'static,
    {
        ServerAction {
            func: build_func(validator, handler),
        }
    }

    pub fn call(&self, input: Option<Value>, logger: &dyn Logger) -> OperationFuture {
        (self.func)(input, logger)
    }
}

impl fmt::Debug for ServerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerAction").finish_non_exhaustive()
    }
}
