// Retry, retry-delay and throw-on-error policies for mutations
// Callers see `(first, all)` error lists; the engine hands over a MutationError

use crate::mutation_error::MutationError;
use squery_core::ErrorDetail;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub type RetryFn = Arc<dyn Fn(u32, Option<&ErrorDetail>, &[ErrorDetail]) -> bool + Send + Sync>;
pub type RetryDelayFn =
    Arc<dyn Fn(u32, Option<&ErrorDetail>, &[ErrorDetail]) -> Duration + Send + Sync>;
pub type ThrowFn = Arc<dyn Fn(Option<&ErrorDetail>, &[ErrorDetail]) -> bool + Send + Sync>;

const BASE_DELAY_MS: u64 = 1000;
const MAX_DELAY_MS: u64 = 30_000;

/// Whether a failed attempt is tried again.
///
/// `failure_count` is the number of failures before the current one, so
/// `Count(2)` allows three attempts in total.
#[derive(Clone, Default)]
pub enum Retry {
    #[default]
    Never,
    Always,
    Count(u32),
    When(RetryFn),
}

impl Retry {
    pub fn when(
        f: impl Fn(u32, Option<&ErrorDetail>, &[ErrorDetail]) -> bool + Send + Sync + 'static,
    ) -> Self {
        Retry::When(Arc::new(f))
    }

    pub fn should_retry(&self, failure_count: u32, error: &MutationError) -> bool {
        match self {
            Retry::Never => false,
            Retry::Always => true,
            Retry::Count(max) => failure_count < *max,
            Retry::When(f) => f(failure_count, error.first(), error.payload()),
        }
    }
}

impl From<bool> for Retry {
    fn from(retry: bool) -> Self {
        if retry {
            Retry::Always
        } else {
            Retry::Never
        }
    }
}

impl From<u32> for Retry {
    fn from(count: u32) -> Self {
        Retry::Count(count)
    }
}

impl fmt::Debug for Retry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Retry::Never => f.write_str("Never"),
            Retry::Always => f.write_str("Always"),
            Retry::Count(n) => f.debug_tuple("Count").field(n).finish(),
            Retry::When(_) => f.write_str("When(..)"),
        }
    }
}

/// Pause before the next attempt.
#[derive(Clone, Default)]
pub enum RetryDelay {
    /// `min(1000 * 2^failure_count, 30000)` milliseconds.
    #[default]
    Exponential,
    Fixed(Duration),
    Compute(RetryDelayFn),
}

impl RetryDelay {
    pub fn compute(
        f: impl Fn(u32, Option<&ErrorDetail>, &[ErrorDetail]) -> Duration + Send + Sync + 'static,
    ) -> Self {
        RetryDelay::Compute(Arc::new(f))
    }

    pub fn delay_for(&self, failure_count: u32, error: &MutationError) -> Duration {
        match self {
            RetryDelay::Exponential => {
                let factor = 1u64.checked_shl(failure_count).unwrap_or(u64::MAX);
                Duration::from_millis(BASE_DELAY_MS.saturating_mul(factor).min(MAX_DELAY_MS))
            }
            RetryDelay::Fixed(delay) => *delay,
            RetryDelay::Compute(f) => f(failure_count, error.first(), error.payload()),
        }
    }
}

impl From<Duration> for RetryDelay {
    fn from(delay: Duration) -> Self {
        RetryDelay::Fixed(delay)
    }
}

impl fmt::Debug for RetryDelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryDelay::Exponential => f.write_str("Exponential"),
            RetryDelay::Fixed(d) => f.debug_tuple("Fixed").field(d).finish(),
            RetryDelay::Compute(_) => f.write_str("Compute(..)"),
        }
    }
}

/// Whether `mutate_async` surfaces a failure as `Err` or absorbs it.
#[derive(Clone, Default)]
pub enum ThrowOnError {
    #[default]
    Never,
    Always,
    When(ThrowFn),
}

impl ThrowOnError {
    pub fn when(
        f: impl Fn(Option<&ErrorDetail>, &[ErrorDetail]) -> bool + Send + Sync + 'static,
    ) -> Self {
        ThrowOnError::When(Arc::new(f))
    }

    pub fn should_throw(&self, error: &MutationError) -> bool {
        match self {
            ThrowOnError::Never => false,
            ThrowOnError::Always => true,
            ThrowOnError::When(f) => f(error.first(), error.payload()),
        }
    }
}

impl From<bool> for ThrowOnError {
    fn from(throw: bool) -> Self {
        if throw {
            ThrowOnError::Always
        } else {
            ThrowOnError::Never
        }
    }
}

impl fmt::Debug for ThrowOnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThrowOnError::Never => f.write_str("Never"),
            ThrowOnError::Always => f.write_str("Always"),
            ThrowOnError::When(_) => f.write_str("When(..)"),
        }
    }
}
