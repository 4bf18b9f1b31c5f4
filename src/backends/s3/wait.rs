//! Polling until a bucket or object reaches the wanted state.
//!
//! Stores such as Ceph RGW acknowledge a delete before the resource
//! disappears from listings, so deletes are confirmed by polling an
//! existence check.

use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;

/// How often and how many times to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WaitPolicy {
    pub(crate) interval: Duration,
    pub(crate) max_attempts: u32,
}

/// A resource that can be deleted and checked for.
pub(crate) trait Deletable {
    /// Human-readable name for logs and errors.
    fn target(&self) -> String;

    /// Sends the delete request.
    async fn issue_delete(&self) -> Result<()>;

    /// Returns true while the resource is still visible.
    async fn exists(&self) -> Result<bool>;
}

/// Polls `check` until it returns `want`.
///
/// The first check happens immediately; later checks are `policy.interval`
/// apart. Check errors end the wait.
pub(crate) async fn wait_until<F, Fut>(
    operation: &str,
    target: &str,
    policy: WaitPolicy,
    want: bool,
    mut check: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        if check().await? == want {
            tracing::debug!(operation = %operation, target = %target, attempt, "Wait condition met");
            return Ok(());
        }
        if attempt < attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    let state = if want { "still absent" } else { "still present" };
    tracing::warn!(operation = %operation, target = %target, attempts, "Gave up waiting: {state}");
    Err(Error::Transport {
        operation: operation.to_string(),
        cause: format!("{target} {state} after {attempts} checks"),
    })
}

/// Deletes `resource` and returns once it is reported gone.
pub(crate) async fn confirmed_delete<D: Deletable>(
    operation: &str,
    resource: &D,
    policy: WaitPolicy,
) -> Result<()> {
    let target = resource.target();
    resource.issue_delete().await?;
    wait_until(operation, &target, policy, false, || resource.exists()).await
}
