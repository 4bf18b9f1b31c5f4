//! Health reporting across every configured instance.

use crate::registry::{BackendFamily, Client, Registry, SlotStatus};
use crate::Result;
use bson::doc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Health of one instance.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceHealth {
    /// Backend family.
    pub family: BackendFamily,
    /// Instance name.
    pub name: String,
    /// Slot state after the ping, if any.
    pub slot: SlotStatus,
    /// Whether the backend answered a ping; `None` when not pinged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reachable: Option<bool>,
    /// Round-trip time of the ping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// Failure reported by the ping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Health of every configured instance.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Per-instance entries, grouped by family.
    pub instances: Vec<InstanceHealth>,
}

impl HealthReport {
    /// Returns true if no instance is unavailable or unreachable.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.instances.iter().all(|i| {
            !matches!(i.slot, SlotStatus::Unavailable { .. }) && i.reachable != Some(false)
        })
    }
}

/// Builds health reports from a registry.
pub struct HealthService {
    registry: Arc<Registry>,
}

impl HealthService {
    /// Creates a service over `registry`.
    #[must_use]
    pub const fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Reports slot states; with `ping`, also resolves and pings each
    /// instance.
    pub async fn report(&self, ping: bool, cancel: &CancellationToken) -> HealthReport {
        let mut instances = Vec::new();
        for entry in self.registry.status() {
            let mut health = InstanceHealth {
                family: entry.family,
                name: entry.name,
                slot: entry.status,
                reachable: None,
                latency_ms: None,
                error: None,
            };

            if ping {
                let started = Instant::now();
                let outcome = self.ping(health.family, &health.name, cancel).await;
                health.latency_ms = Some(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX));
                health.reachable = Some(outcome.is_ok());
                if let Err(e) = outcome {
                    tracing::warn!(family = %health.family, name = %health.name, error = %e, "Health ping failed");
                    health.error = Some(e.to_string());
                }
                health.slot = self.registry.slot_status(health.family, &health.name);
            }
            instances.push(health);
        }
        HealthReport { instances }
    }

    async fn ping(
        &self,
        family: BackendFamily,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        match self.registry.resolve(family, Some(name)).await? {
            Client::Sql(sql) => sql.ping().await,
            Client::Redis(redis) => redis.ping().await,
            Client::Mongo(mongo) => mongo
                .run_command("admin", doc! { "ping": 1 }, cancel)
                .await
                .map(|_| ()),
            Client::S3(s3) => s3.list_buckets().await.map(|_| ()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::{BackendsConfig, RedisConfig, SqlConfig, SqlDialect};

    #[tokio::test]
    async fn test_report_without_ping_constructs_nothing() {
        let mut config = BackendsConfig::default();
        config.sql.insert(
            "default".to_string(),
            SqlConfig {
                dialect: SqlDialect::Sqlite,
                database: ":memory:".to_string(),
                ..Default::default()
            },
        );
        let registry = Arc::new(Registry::new(config));
        let report = HealthService::new(Arc::clone(&registry))
            .report(false, &CancellationToken::new())
            .await;

        assert_eq!(report.instances.len(), 1);
        assert_eq!(report.instances[0].slot, SlotStatus::Uninitialized);
        assert!(report.instances[0].reachable.is_none());
        assert!(!registry.has_slot(BackendFamily::Sql, "default"));
    }

    #[tokio::test]
    async fn test_ping_reports_reachability() {
        let mut config = BackendsConfig::default();
        config.sql.insert(
            "local".to_string(),
            SqlConfig {
                dialect: SqlDialect::Sqlite,
                database: ":memory:".to_string(),
                ..Default::default()
            },
        );
        config.redis.insert(
            "down".to_string(),
            RedisConfig {
                host: "127.0.0.1".to_string(),
                port: 1,
                timeout: 1,
                ..Default::default()
            },
        );
        let registry = Arc::new(Registry::new(config));
        let report = HealthService::new(registry)
            .report(true, &CancellationToken::new())
            .await;

        let sql = report.instances.iter().find(|i| i.name == "local").unwrap();
        assert_eq!(sql.reachable, Some(true));
        assert_eq!(sql.slot, SlotStatus::Ready);

        let redis = report.instances.iter().find(|i| i.name == "down").unwrap();
        assert_eq!(redis.reachable, Some(false));
        assert!(redis.error.is_some());
        assert!(!report.is_healthy());
    }
}
