//! Bounded polling with a fixed interval.
//!
//! Replaces ad-hoc sleep loops: the only sanctioned wait in the system is
//! the primary-election poll, and it must be bounded, never silently
//! infinite.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};

/// Fixed poll interval and attempt budget.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

/// Polls `attempt` until it yields a value or the budget is exhausted.
///
/// `Ok(None)` means "not ready yet, keep polling"; an `Err` aborts
/// immediately (the closure decides which of its errors count as
/// not-ready). Exhausting the budget yields [`Error::Timeout`].
pub async fn poll_until<T, F, Fut>(policy: &RetryPolicy, what: &str, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    for n in 1..=policy.max_attempts {
        if let Some(value) = attempt().await? {
            return Ok(value);
        }
        debug!(what, attempt = n, "not ready, polling again");
        if n < policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }
    Err(Error::Timeout {
        what: what.to_string(),
        attempts: policy.max_attempts,
    })
}
