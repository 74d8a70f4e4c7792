//! Client side of server queries: a typed [`Caller`] per operation, a query
//! runner, and a [`Mutation`] state machine with retries and lifecycle
//! callbacks.

pub mod caller;
pub mod mutation;
pub mod mutation_error;
pub mod policy;
pub mod query;

pub use caller::{CallError, CallOptions, Caller};
pub use mutation::{
    MutateOptions, Mutation, MutationOptions, MutationState, MutationStatus, OnError, OnMutate,
    OnSettled, OnSuccess,
};
pub use mutation_error::{MutationError, DEFAULT_MESSAGE};
pub use policy::{Retry, RetryDelay, ThrowOnError};
pub use query::{paged, run_query, QueryError};

pub use squery_core::{Config, ErrorDetail, OperationKind, OperationRef, QueryResult};
pub use squery_transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};
#[cfg(feature = "reqwest")]
pub use squery_transport::{ReqwestTransport, TransportConfig};
