//! Status command.

use super::print_json;
use anyhow::bail;
use myadmin::Registry;
use myadmin::services::HealthService;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Prints every configured instance with its slot state.
///
/// With `ping`, each instance is constructed and pinged first, and the
/// command fails if any of them is down.
pub async fn cmd_status(
    registry: &Arc<Registry>,
    ping: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    if registry.config().is_empty() {
        bail!("no backend instances are configured");
    }

    let report = HealthService::new(Arc::clone(registry))
        .report(ping, cancel)
        .await;
    print_json(&report)?;

    if ping && !report.is_healthy() {
        bail!("one or more instances are unavailable");
    }
    Ok(())
}
