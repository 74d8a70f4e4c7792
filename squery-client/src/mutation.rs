// Mutation state machine
// One observable slot per mutation: idle -> pending -> success | error, with
// retries, lifecycle callbacks and deferred ("transition") submission.

use crate::caller::{CallOptions, Caller};
use crate::mutation_error::MutationError;
use crate::policy::{Retry, RetryDelay, ThrowOnError};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use squery_core::{ErrorDetail, QueryResult};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub type OnMutate<I, C> = Arc<dyn Fn(&I) -> C + Send + Sync>;
pub type OnSuccess<I, O, C> = Arc<dyn Fn(&O, &I, Option<&C>) + Send + Sync>;
pub type OnError<I, C> =
    Arc<dyn Fn(Option<&ErrorDetail>, &[ErrorDetail], &I, Option<&C>) + Send + Sync>;
pub type OnSettled<I, O, C> =
    Arc<dyn Fn(Option<&O>, Option<&ErrorDetail>, &[ErrorDetail], &I, Option<&C>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MutationStatus {
    #[default]
    Idle,
    Pending,
    Success,
    Error,
}

/// Snapshot of a mutation's observable state.
#[derive(Debug, Clone)]
pub struct MutationState<I, O> {
    pub status: MutationStatus,
    pub data: Option<O>,
    pub error: Option<MutationError>,
    pub variables: Option<I>,
    /// Failed attempts of the current run, retries included.
    pub failure_count: u32,
    pub failure_reason: Option<MutationError>,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl<I, O> Default for MutationState<I, O> {
    fn default() -> Self {
        MutationState {
            status: MutationStatus::Idle,
            data: None,
            error: None,
            variables: None,
            failure_count: 0,
            failure_reason: None,
            submitted_at: None,
        }
    }
}

impl<I, O> MutationState<I, O> {
    pub fn is_idle(&self) -> bool {
        self.status == MutationStatus::Idle
    }

    pub fn is_pending(&self) -> bool {
        self.status == MutationStatus::Pending
    }

    pub fn is_success(&self) -> bool {
        self.status == MutationStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == MutationStatus::Error
    }
}

/// Mutation-wide options. Callbacks see error lists as `(first, all)`.
pub struct MutationOptions<I, O, C = ()> {
    on_mutate: Option<OnMutate<I, C>>,
    on_success: Option<OnSuccess<I, O, C>>,
    on_error: Option<OnError<I, C>>,
    on_settled: Option<OnSettled<I, O, C>>,
    retry: Retry,
    retry_delay: RetryDelay,
    throw_on_error: ThrowOnError,
}

impl<I, O, C> MutationOptions<I, O, C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs before the first attempt; its return value is the context handed
    /// to every later callback.
    pub fn on_mutate(mut self, f: impl Fn(&I) -> C + Send + Sync + 'static) -> Self {
        self.on_mutate = Some(Arc::new(f));
        self
    }

    pub fn on_success(mut self, f: impl Fn(&O, &I, Option<&C>) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(f));
        self
    }

    pub fn on_error(
        mut self,
        f: impl Fn(Option<&ErrorDetail>, &[ErrorDetail], &I, Option<&C>) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn on_settled(
        mut self,
        f: impl Fn(Option<&O>, Option<&ErrorDetail>, &[ErrorDetail], &I, Option<&C>)
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.on_settled = Some(Arc::new(f));
        self
    }

    pub fn retry(mut self, retry: impl Into<Retry>) -> Self {
        self.retry = retry.into();
        self
    }

    pub fn retry_delay(mut self, delay: impl Into<RetryDelay>) -> Self {
        self.retry_delay = delay.into();
        self
    }

    pub fn throw_on_error(mut self, throw: impl Into<ThrowOnError>) -> Self {
        self.throw_on_error = throw.into();
        self
    }
}

impl<I, O, C> Default for MutationOptions<I, O, C> {
    fn default() -> Self {
        MutationOptions {
            on_mutate: None,
            on_success: None,
            on_error: None,
            on_settled: None,
            retry: Retry::default(),
            retry_delay: RetryDelay::default(),
            throw_on_error: ThrowOnError::default(),
        }
    }
}

impl<I, O, C> fmt::Debug for MutationOptions<I, O, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationOptions")
            .field("retry", &self.retry)
            .field("retry_delay", &self.retry_delay)
            .field("throw_on_error", &self.throw_on_error)
            .finish_non_exhaustive()
    }
}

/// Callbacks for a single `mutate` call, run after the mutation-wide ones.
///
/// They only fire for the most recent call.
pub struct MutateOptions<I, O, C = ()> {
    on_success: Option<OnSuccess<I, O, C>>,
    on_error: Option<OnError<I, C>>,
    on_settled: Option<OnSettled<I, O, C>>,
}

impl<I, O, C> MutateOptions<I, O, C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_success(mut self, f: impl Fn(&O, &I, Option<&C>) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(f));
        self
    }

    pub fn on_error(
        mut self,
        f: impl Fn(Option<&ErrorDetail>, &[ErrorDetail], &I, Option<&C>) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn on_settled(
        mut self,
        f: impl Fn(Option<&O>, Option<&ErrorDetail>, &[ErrorDetail], &I, Option<&C>)
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.on_settled = Some(Arc::new(f));
        self
    }
}

impl<I, O, C> Default for MutateOptions<I, O, C> {
    fn default() -> Self {
        MutateOptions {
            on_success: None,
            on_error: None,
            on_settled: None,
        }
    }
}

impl<I, O, C> fmt::Debug for MutateOptions<I, O, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutateOptions")
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_settled", &self.on_settled.is_some())
            .finish()
    }
}

/// A run that has entered `pending`.
struct Started<I, C> {
    generation: u64,
    input: I,
    context: Option<C>,
}

struct Inner<I, O, C> {
    caller: Caller<I, O>,
    options: MutationOptions<I, O, C>,
    state: watch::Sender<MutationState<I, O>>,
    generation: AtomicU64,
    transitions: Arc<AtomicUsize>,
}

impl<I, O, C> Inner<I, O, C>
where
    I: Serialize + Clone + Send + Sync + 'static,
    O: DeserializeOwned + Clone + Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    fn begin(&self, input: I) -> Started<I, C> {
        let mut generation = 0;
        self.state.send_modify(|state| {
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *state = MutationState {
                status: MutationStatus::Pending,
                variables: Some(input.clone()),
                submitted_at: Some(Utc::now()),
                ..MutationState::default()
            };
        });
        debug!(id = %self.caller.operation().id(), generation, "Mutation pending");

        let context = self.options.on_mutate.as_ref().map(|f| f(&input));
        Started {
            generation,
            input,
            context,
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Applies `f` only while `generation` still owns the state.
    fn update(&self, generation: u64, f: impl FnOnce(&mut MutationState<I, O>)) {
        self.state.send_if_modified(|state| {
            if !self.is_current(generation) {
                return false;
            }
            f(state);
            true
        });
    }

    fn reset(&self) {
        self.state.send_modify(|state| {
            self.generation.fetch_add(1, Ordering::SeqCst);
            *state = MutationState::default();
        });
    }

    async fn finish(
        &self,
        started: Started<I, C>,
        local: Option<MutateOptions<I, O, C>>,
    ) -> Result<Option<O>, MutationError> {
        let Started {
            generation,
            input,
            context,
        } = started;
        let id = self.caller.operation().id();

        let mut failure_count = 0u32;
        let outcome = loop {
            let error = match self.caller.call(Some(&input), CallOptions::default()).await {
                Ok(QueryResult::Ok(data)) => break Ok(data),
                Ok(QueryResult::Err(errors)) => MutationError::new(errors),
                Err(err) => MutationError::from_call(err),
            };

            let retry = self.options.retry.should_retry(failure_count, &error);
            let delay = self.options.retry_delay.delay_for(failure_count, &error);
            failure_count += 1;
            self.update(generation, |state| {
                state.failure_count = failure_count;
                state.failure_reason = Some(error.clone());
            });

            if !retry {
                break Err(error);
            }
            debug!(%id, failure_count, ?delay, error = %error, "Retrying mutation");
            tokio::time::sleep(delay).await;
        };

        let context = context.as_ref();
        let local = local.filter(|_| self.is_current(generation));

        match outcome {
            Ok(data) => {
                self.update(generation, |state| {
                    state.status = MutationStatus::Success;
                    state.data = Some(data.clone());
                    state.error = None;
                    state.failure_count = 0;
                    state.failure_reason = None;
                });
                debug!(%id, generation, "Mutation succeeded");

                if let Some(f) = &self.options.on_success {
                    f(&data, &input, context);
                }
                if let Some(f) = &self.options.on_settled {
                    f(Some(&data), None, &[], &input, context);
                }
                if let Some(local) = &local {
                    if let Some(f) = &local.on_success {
                        f(&data, &input, context);
                    }
                    if let Some(f) = &local.on_settled {
                        f(Some(&data), None, &[], &input, context);
                    }
                }
                Ok(Some(data))
            }
            Err(error) => {
                self.update(generation, |state| {
                    state.status = MutationStatus::Error;
                    state.error = Some(error.clone());
                });
                warn!(%id, generation, failure_count, error = %error, "Mutation failed");

                let (first, all) = (error.first(), error.payload());
                if let Some(f) = &self.options.on_error {
                    f(first, all, &input, context);
                }
                if let Some(f) = &self.options.on_settled {
                    f(None, first, all, &input, context);
                }
                if let Some(local) = &local {
                    if let Some(f) = &local.on_error {
                        f(first, all, &input, context);
                    }
                    if let Some(f) = &local.on_settled {
                        f(None, first, all, &input, context);
                    }
                }

                if self.options.throw_on_error.should_throw(&error) {
                    Err(error)
                } else {
                    Ok(None)
                }
            }
        }
    }
}

/// Marks a deferred submission that has not reached `pending` yet.
struct Transition(Arc<AtomicUsize>);

impl Transition {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Transition(Arc::clone(counter))
    }
}

impl Drop for Transition {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A server mutation bound to a caller, with observable state.
///
/// The most recent submission owns the state; earlier runs still complete
/// but no longer write to it. Must be used inside a tokio runtime.
pub struct Mutation<I, O, C = ()> {
    inner: Arc<Inner<I, O, C>>,
}

impl<I, O, C> Mutation<I, O, C>
where
    I: Serialize + Clone + Send + Sync + 'static,
    O: DeserializeOwned + Clone + Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    pub fn new(caller: Caller<I, O>, options: MutationOptions<I, O, C>) -> Self {
        let (state, _) = watch::channel(MutationState::default());
        Mutation {
            inner: Arc::new(Inner {
                caller,
                options,
                state,
                generation: AtomicU64::new(0),
                transitions: Arc::new(AtomicUsize::new(0)),
            }),
        }
    }

    pub fn state(&self) -> MutationState<I, O> {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MutationState<I, O>> {
        self.inner.state.subscribe()
    }

    /// True while a `mutate`/`mutate_async` submission has not yet entered
    /// `pending`.
    pub fn is_transition_pending(&self) -> bool {
        self.inner.transitions.load(Ordering::SeqCst) > 0
    }

    /// Back to idle. A run still in flight no longer updates the state.
    pub fn reset(&self) {
        self.inner.reset();
    }

    /// Enters `pending` immediately and resolves with the outcome.
    ///
    /// Resolves `Ok(Some(data))` on success. A failure resolves `Ok(None)`
    /// unless the throw policy selects it, in which case it is `Err`.
    pub fn mutate_async_no_transition(
        &self,
        input: I,
        options: Option<MutateOptions<I, O, C>>,
    ) -> impl Future<Output = Result<Option<O>, MutationError>> + Send + 'static {
        let started = self.inner.begin(input);
        let inner = Arc::clone(&self.inner);
        async move { inner.finish(started, options).await }
    }

    /// Enters `pending` immediately and runs on the runtime; failures are
    /// only observable through state and callbacks.
    pub fn mutate_no_transition(
        &self,
        input: I,
        options: Option<MutateOptions<I, O, C>>,
    ) -> JoinHandle<()> {
        let run = self.mutate_async_no_transition(input, options);
        tokio::spawn(async move {
            let _ = run.await;
        })
    }

    /// Deferred form of [`Mutation::mutate_no_transition`].
    pub fn mutate(&self, input: I, options: Option<MutateOptions<I, O, C>>) -> JoinHandle<()> {
        let run = self.spawn_deferred(input, options);
        tokio::spawn(async move {
            let _ = run.await;
        })
    }

    /// Deferred form of [`Mutation::mutate_async_no_transition`].
    ///
    /// The submission is scheduled when this is called, so
    /// [`Mutation::is_transition_pending`] is already true before the
    /// returned future is first polled.
    pub fn mutate_async(
        &self,
        input: I,
        options: Option<MutateOptions<I, O, C>>,
    ) -> impl Future<Output = Result<Option<O>, MutationError>> + Send + 'static {
        let handle = self.spawn_deferred(input, options);
        async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(join_error) if join_error.is_panic() => {
                    std::panic::resume_unwind(join_error.into_panic())
                }
                Err(_) => Err(MutationError::default()),
            }
        }
    }

    fn spawn_deferred(
        &self,
        input: I,
        options: Option<MutateOptions<I, O, C>>,
    ) -> JoinHandle<Result<Option<O>, MutationError>> {
        let transition = Transition::enter(&self.inner.transitions);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            let started = inner.begin(input);
            drop(transition);
            inner.finish(started, options).await
        })
    }
}

impl<I, O, C> Clone for Mutation<I, O, C> {
    fn clone(&self) -> Self {
        Mutation {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I, O, C> fmt::Debug for Mutation<I, O, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutation")
            .field("caller", &self.inner.caller)
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use http::StatusCode;
    use serde_json::{json, Value};
    use squery_core::{Config, OperationRef};
    use squery_transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays scripted bodies in order, repeating the last one.
    struct Scripted {
        bodies: Mutex<VecDeque<String>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(bodies: &[&str]) -> Arc<Self> {
            Arc::new(Scripted {
                bodies: Mutex::new(bodies.iter().map(|b| b.to_string()).collect()),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HttpTransport for Scripted {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut bodies = self.bodies.lock().unwrap();
            let body = if bodies.len() > 1 {
                bodies.pop_front().unwrap()
            } else {
                bodies.front().cloned().unwrap()
            };
            Ok(HttpResponse::new(StatusCode::OK, body))
        }
    }

    struct Offline;

    #[async_trait]
    impl HttpTransport for Offline {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            Err(TransportError::Network("connection refused".into()))
        }
    }

    /// Sleeps for the `delay` field of the request body, then echoes it.
    struct Echo;

    #[async_trait]
    impl HttpTransport for Echo {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            let input: Value = serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
            let delay = input["delay"].as_u64().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(HttpResponse::new(
                StatusCode::OK,
                json!({"ok": true, "err": false, "val": input}).to_string(),
            ))
        }
    }

    const OK: &str = r#"{"ok":true,"err":false,"val":{"saved":true}}"#;

    fn failed(code: &str) -> String {
        json!({"ok": false, "err": true, "val": [{"code": code, "detail": "D"}]}).to_string()
    }

    fn mutation<C: Send + Sync + 'static>(
        transport: Arc<dyn HttpTransport>,
        options: MutationOptions<Value, Value, C>,
    ) -> Mutation<Value, Value, C> {
        let caller = Caller::new(
            OperationRef::mutation("save"),
            transport,
            Config::default(),
        );
        Mutation::new(caller, options)
    }

    #[tokio::test]
    async fn test_success_runs_callbacks_in_order() {
        let events = Arc::new(Mutex::new(Vec::<String>::new()));
        let (e1, e2, e3, e4, e5) = (
            events.clone(),
            events.clone(),
            events.clone(),
            events.clone(),
            events.clone(),
        );
        let options = MutationOptions::new()
            .on_mutate(move |input: &Value| {
                e1.lock().unwrap().push("mutate".into());
                input["n"].as_u64().unwrap_or(0)
            })
            .on_success(move |_, _, context| {
                e2.lock().unwrap().push(format!("success:{}", context.unwrap()));
            })
            .on_settled(move |data, first, _, _, _| {
                assert!(data.is_some() && first.is_none());
                e3.lock().unwrap().push("settled".into());
            });
        let local = MutateOptions::new()
            .on_success(move |_, _, _| e4.lock().unwrap().push("local-success".into()))
            .on_settled(move |_, _, _, _, _| e5.lock().unwrap().push("local-settled".into()));

        let m = mutation(Scripted::new(&[OK]), options);
        assert!(m.state().is_idle());

        let data = m
            .mutate_async_no_transition(json!({"n": 7}), Some(local))
            .await
            .unwrap();

        assert_eq!(data, Some(json!({"saved": true})));
        assert_eq!(
            *events.lock().unwrap(),
            vec!["mutate", "success:7", "settled", "local-success", "local-settled"]
        );
        let state = m.state();
        assert!(state.is_success());
        assert_eq!(state.variables, Some(json!({"n": 7})));
        assert!(state.submitted_at.is_some());
        assert_eq!(state.failure_count, 0);
    }

    #[tokio::test]
    async fn test_retry_runs_three_attempts() {
        let first_seen = Arc::new(Mutex::new(None::<String>));
        let sink = first_seen.clone();
        let transport = Scripted::new(&[&failed("a1"), &failed("a2"), &failed("a3")]);
        let options = MutationOptions::<Value, Value>::new()
            .retry(Retry::when(|count, _, _| count < 2))
            .retry_delay(Duration::from_millis(1))
            .on_error(move |first, _, _, _| {
                *sink.lock().unwrap() = first.and_then(|e| e.code.clone());
            });
        let m = mutation(transport.clone(), options);

        let outcome = m
            .mutate_async_no_transition(json!({}), None)
            .await
            .unwrap();

        assert_eq!(outcome, None);
        assert_eq!(transport.calls(), 3);
        assert_eq!(first_seen.lock().unwrap().as_deref(), Some("a3"));

        let state = m.state();
        assert!(state.is_error());
        assert_eq!(state.failure_count, 3);
        assert_eq!(state.error.unwrap().message(), "D [a3]");
    }

    #[tokio::test]
    async fn test_no_retry_by_default() {
        let transport = Scripted::new(&[&failed("x")]);
        let m = mutation(transport.clone(), MutationOptions::<Value, Value>::new());
        m.mutate_async_no_transition(json!({}), None).await.unwrap();
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_throw_policy_selects_err() {
        let options = MutationOptions::<Value, Value>::new().throw_on_error(true);
        let m = mutation(Scripted::new(&[&failed("C")]), options);

        let err = m
            .mutate_async_no_transition(json!({}), None)
            .await
            .unwrap_err();
        assert_eq!(err.message(), "D [C]");
        assert_eq!(err.payload().len(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_reaches_on_error_without_payload() {
        let saw_none = Arc::new(Mutex::new(false));
        let sink = saw_none.clone();
        let options = MutationOptions::<Value, Value>::new().on_error(move |first, all, _, _| {
            *sink.lock().unwrap() = first.is_none() && all.is_empty();
        });
        let m = mutation(Arc::new(Offline), options);

        m.mutate_async_no_transition(json!({}), None).await.unwrap();

        assert!(*saw_none.lock().unwrap());
        let error = m.state().error.unwrap();
        assert!(error.cause().is_some());
    }

    #[tokio::test]
    async fn test_no_transition_enters_pending_synchronously() {
        let m = mutation(Scripted::new(&[OK]), MutationOptions::<Value, Value>::new());
        let handle = m.mutate_no_transition(json!({}), None);

        assert!(m.state().is_pending());
        assert!(!m.is_transition_pending());

        handle.await.unwrap();
        assert!(m.state().is_success());
    }

    #[tokio::test]
    async fn test_deferred_mutate_reports_transition() {
        let m = mutation(Scripted::new(&[OK]), MutationOptions::<Value, Value>::new());
        let mut states = m.subscribe();
        let handle = m.mutate(json!({}), None);

        assert!(m.is_transition_pending());
        assert!(m.state().is_idle());

        states.wait_for(|s| !s.is_idle()).await.unwrap();
        assert!(!m.is_transition_pending());

        handle.await.unwrap();
        assert!(m.state().is_success());
    }

    #[tokio::test]
    async fn test_deferred_mutate_async_resolves_data() {
        let m = mutation(Scripted::new(&[OK]), MutationOptions::<Value, Value>::new());
        let data = m.mutate_async(json!({}), None).await.unwrap();
        assert_eq!(data, Some(json!({"saved": true})));
        assert!(!m.is_transition_pending());
    }

    #[tokio::test]
    async fn test_mutate_async_reports_transition_before_first_poll() {
        let m = mutation(Scripted::new(&[OK]), MutationOptions::<Value, Value>::new());
        let run = m.mutate_async(json!({}), None);

        assert!(m.is_transition_pending());
        assert!(m.state().is_idle());

        let data = run.await.unwrap();
        assert_eq!(data, Some(json!({"saved": true})));
        assert!(!m.is_transition_pending());
        assert!(m.state().is_success());
    }

    #[tokio::test]
    async fn test_latest_submission_owns_state() {
        let local_fired = Arc::new(AtomicU32::new(0));
        let m = mutation(Arc::new(Echo), MutationOptions::<Value, Value>::new());

        let counter = local_fired.clone();
        let slow = m.mutate_async_no_transition(
            json!({"delay": 50, "tag": "slow"}),
            Some(MutateOptions::new().on_success(move |_, _, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        );
        let fast = m.mutate_async_no_transition(json!({"delay": 0, "tag": "fast"}), None);

        let (slow, fast) = tokio::join!(slow, fast);
        assert_eq!(slow.unwrap().unwrap()["tag"], "slow");
        assert_eq!(fast.unwrap().unwrap()["tag"], "fast");

        let state = m.state();
        assert_eq!(state.data.unwrap()["tag"], "fast");
        assert_eq!(state.variables.unwrap()["tag"], "fast");
        assert_eq!(local_fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reset_detaches_in_flight_run() {
        let m = mutation(Arc::new(Echo), MutationOptions::<Value, Value>::new());
        let run = m.mutate_async_no_transition(json!({"delay": 20}), None);
        assert!(m.state().is_pending());

        m.reset();
        assert!(m.state().is_idle());

        assert!(run.await.unwrap().is_some());
        assert!(m.state().is_idle());
    }
}
