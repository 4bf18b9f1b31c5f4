//! Backend clients.
//!
//! One adapter per backend family, each wrapping its native driver:
//!
//! | Module | Driver | Concurrency |
//! |--------|--------|-------------|
//! | [`sql`] | deadpool-postgres / rusqlite | pooled / mutex + `spawn_blocking` |
//! | [`redis`] | redis `ConnectionManager` | multiplexed |
//! | [`mongo`] | mongodb `Client` | driver pool |
//! | [`s3`] | aws-sdk-s3 / aws-sdk-sts | shared HTTP client |
//!
//! Every network call is bounded by the instance's configured timeout.

pub mod mongo;
pub mod redis;
pub mod s3;
pub mod sql;

use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Runs `fut` with a deadline; expiry is a transport failure.
pub(crate) async fn bounded<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(timed_out(operation, limit)),
    }
}

/// Runs `fut` with a deadline and a cancellation token.
///
/// Cancellation wins over completion when both are ready.
pub(crate) async fn guarded<T, F>(
    operation: &str,
    limit: Duration,
    cancel: &CancellationToken,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => {
            tracing::debug!(operation = %operation, "Backend command cancelled");
            Err(Error::Cancelled {
                operation: operation.to_string(),
            })
        },
        result = bounded(operation, limit, fut) => result,
    }
}

fn timed_out(operation: &str, limit: Duration) -> Error {
    Error::Transport {
        operation: operation.to_string(),
        cause: format!("timed out after {}ms", limit.as_millis()),
    }
}
