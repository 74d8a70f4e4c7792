use crate::caller::{CallError, CallOptions, Caller};
use serde::de::DeserializeOwned;
use serde::Serialize;
use squery_core::{ErrorDetail, QueryResult};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum QueryError {
    /// The operation answered with an error list.
    #[error("{}", rejection_title(.0))]
    Rejected(Vec<ErrorDetail>),
    #[error(transparent)]
    Call(#[from] CallError),
}

impl QueryError {
    pub fn errors(&self) -> &[ErrorDetail] {
        match self {
            QueryError::Rejected(errors) => errors,
            QueryError::Call(_) => &[],
        }
    }
}

fn rejection_title(errors: &[ErrorDetail]) -> String {
    errors
        .first()
        .and_then(|e| e.title.clone())
        .unwrap_or_default()
}

/// Runs a query and returns its Ok payload.
///
/// An error result is reported through the configured logger before being
/// returned as [`QueryError::Rejected`].
pub async fn run_query<I, O>(
    caller: &Caller<I, O>,
    input: Option<&I>,
    signal: Option<CancellationToken>,
) -> Result<O, QueryError>
where
    I: Serialize,
    O: DeserializeOwned,
{
    let options = CallOptions {
        signal,
        ..CallOptions::default()
    };
    match caller.call(input, options).await? {
        QueryResult::Ok(val) => Ok(val),
        QueryResult::Err(errors) => {
            let first = errors.first();
            caller.config().logger.error(&format!(
                "Error fetching data for server query ({}): {} {}",
                caller.operation().id(),
                first.and_then(|e| e.title.as_deref()).unwrap_or_default(),
                first.and_then(|e| e.detail.as_deref()).unwrap_or_default(),
            ));
            Err(QueryError::Rejected(errors))
        }
    }
}

/// Runs one page of a paginated query, building the input from the page
/// parameter.
pub async fn paged<P, I, O>(
    caller: &Caller<I, O>,
    page_param: P,
    prepare: impl FnOnce(P) -> Option<I>,
    signal: Option<CancellationToken>,
) -> Result<O, QueryError>
where
    I: Serialize,
    O: DeserializeOwned,
{
    let input = prepare(page_param);
    run_query(caller, input.as_ref(), signal).await
}
