//! Replica set membership changes.
//!
//! Membership is changed by reading the current configuration, editing the
//! member list, bumping the version and sending it back with
//! `replSetReconfig`.

use crate::backends::mongo::{MongoClient, ReplSetConfig, ReplSetMember, ReplSetStatus};
use crate::{Error, Result};
use bson::{Bson, Document, doc};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Condensed view of a replica set.
#[derive(Debug, Clone, Serialize)]
pub struct ReplicaSetTopology {
    /// Replica set name.
    pub name: String,
    /// Current primary, if elected.
    pub primary: Option<String>,
    /// Configuration version.
    pub config_version: i64,
    /// Members with their reported state.
    pub members: Vec<ReplSetMember>,
}

/// Replica set administration over one MongoDB deployment.
pub struct ReplicaSetService {
    mongo: Arc<MongoClient>,
}

impl ReplicaSetService {
    /// Creates a service for `mongo`.
    #[must_use]
    pub const fn new(mongo: Arc<MongoClient>) -> Self {
        Self { mongo }
    }

    /// Combines `replSetGetStatus` and `replSetGetConfig`.
    ///
    /// # Errors
    ///
    /// Returns an error if either command fails.
    pub async fn topology(&self, cancel: &CancellationToken) -> Result<ReplicaSetTopology> {
        let status = self.mongo.repl_set_status(cancel).await?;
        let config = self.mongo.repl_set_config(cancel).await?;
        topology_from(status, &config)
    }

    /// Initiates a replica set.
    ///
    /// With no hosts the server builds a default single-member config;
    /// otherwise `name` is required and members are numbered in order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when hosts are given without a name.
    #[instrument(skip(self, cancel), fields(instance = %self.mongo.name()))]
    pub async fn initiate(
        &self,
        name: Option<&str>,
        hosts: &[String],
        cancel: &CancellationToken,
    ) -> Result<()> {
        let config = initiate_config(name, hosts)?;
        self.mongo.repl_set_initiate(config, cancel).await
    }

    /// Adds `host` to the set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `host` is already a member, and
    /// [`Error::BackendRejected`] if the server refuses the new config.
    #[instrument(skip(self, cancel), fields(instance = %self.mongo.name()))]
    pub async fn add_member(
        &self,
        host: &str,
        priority: f64,
        votes: i32,
        cancel: &CancellationToken,
    ) -> Result<ReplSetConfig> {
        if host.trim().is_empty() {
            return Err(Error::InvalidInput("member host must not be empty".to_string()));
        }
        let current = self.mongo.repl_set_config(cancel).await?;
        let updated = current.with_member_added(host, priority, votes)?;
        self.mongo.repl_set_reconfig(&updated, false, cancel).await?;

        tracing::info!(host = %host, version = updated.version()?, "Added replica set member");
        metrics::counter!("replica_set_reconfig_total", "change" => "add").increment(1);
        Ok(updated)
    }

    /// Removes `host` from the set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `host` is empty or not a member.
    #[instrument(skip(self, cancel), fields(instance = %self.mongo.name()))]
    pub async fn remove_member(
        &self,
        host: &str,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<ReplSetConfig> {
        if host.trim().is_empty() {
            return Err(Error::InvalidInput("member host must not be empty".to_string()));
        }
        let current = self.mongo.repl_set_config(cancel).await?;
        let updated = current.with_member_removed(host)?;
        self.mongo.repl_set_reconfig(&updated, force, cancel).await?;

        tracing::info!(host = %host, version = updated.version()?, "Removed replica set member");
        metrics::counter!("replica_set_reconfig_total", "change" => "remove").increment(1);
        Ok(updated)
    }
}

/// Builds the `replSetInitiate` document; `None` lets the server pick a
/// single-member default.
fn initiate_config(name: Option<&str>, hosts: &[String]) -> Result<Option<Document>> {
    if hosts.is_empty() {
        return Ok(None);
    }
    let name = name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| Error::InvalidInput("replica set name is required with hosts".to_string()))?;
    if hosts.iter().any(|h| h.trim().is_empty()) {
        return Err(Error::InvalidInput("member host must not be empty".to_string()));
    }

    let members: Vec<Bson> = hosts
        .iter()
        .zip(0_i32..)
        .map(|(host, id)| Bson::Document(doc! { "_id": id, "host": host.as_str() }))
        .collect();
    Ok(Some(doc! { "_id": name, "members": members }))
}

fn topology_from(status: ReplSetStatus, config: &ReplSetConfig) -> Result<ReplicaSetTopology> {
    Ok(ReplicaSetTopology {
        primary: status.primary().map(|m| m.name.clone()),
        config_version: config.version()?,
        name: status.set,
        members: status.members,
    })
}
