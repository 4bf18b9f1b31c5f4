//! Sharded cluster administration through a mongos router.

use crate::backends::mongo::{
    InconsistentIndex, MongoClient, ShardInfo, ShardKeySpec, ShardedCollection, require,
};
use crate::Result;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Shards and sharded collections of a cluster.
#[derive(Debug, Clone, Serialize)]
pub struct ShardingOverview {
    /// Registered shards.
    pub shards: Vec<ShardInfo>,
    /// Live sharded collections.
    pub collections: Vec<ShardedCollection>,
}

/// Result of [`ShardingService::shard_collection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardOutcome {
    /// The collection was sharded now.
    Sharded,
    /// The collection was already sharded; nothing was sent.
    AlreadySharded,
}

/// Sharding operations over one router.
pub struct ShardingService {
    mongo: Arc<MongoClient>,
}

impl ShardingService {
    /// Creates a service for `mongo`.
    #[must_use]
    pub const fn new(mongo: Arc<MongoClient>) -> Self {
        Self { mongo }
    }

    /// Lists shards and sharded collections.
    ///
    /// # Errors
    ///
    /// Returns an error if either listing fails.
    pub async fn overview(&self, cancel: &CancellationToken) -> Result<ShardingOverview> {
        Ok(ShardingOverview {
            shards: self.mongo.list_shards(cancel).await?,
            collections: self.mongo.sharded_collections(cancel).await?,
        })
    }

    /// Enables sharding on the database and shards the collection.
    ///
    /// The key is validated first; a namespace that is already sharded is
    /// left alone.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] for an empty name or an invalid
    /// key before any network call.
    #[instrument(skip(self, key, cancel), fields(instance = %self.mongo.name()))]
    pub async fn shard_collection(
        &self,
        database: &str,
        collection: &str,
        key: &ShardKeySpec,
        cancel: &CancellationToken,
    ) -> Result<ShardOutcome> {
        require(database, "database name")?;
        require(collection, "collection name")?;
        key.key_document()?;

        let namespace = format!("{database}.{collection}");
        let existing = self.mongo.sharded_collections(cancel).await?;
        if already_sharded(&existing, &namespace) {
            tracing::info!(namespace = %namespace, "Collection already sharded");
            return Ok(ShardOutcome::AlreadySharded);
        }

        self.mongo.enable_sharding(database, cancel).await?;
        self.mongo
            .shard_collection(database, collection, key, cancel)
            .await?;
        metrics::counter!("shard_collection_total").increment(1);
        Ok(ShardOutcome::Sharded)
    }

    /// Reports indexes that differ across shards.
    ///
    /// `local` fetches raw `$indexStats` and compares them here instead of
    /// running the aggregation on the router.
    ///
    /// # Errors
    ///
    /// Returns an error if the index statistics cannot be read.
    pub async fn index_report(
        &self,
        database: &str,
        collection: &str,
        local: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<InconsistentIndex>> {
        let found = if local {
            self.mongo
                .inconsistent_indexes_local(database, collection, cancel)
                .await?
        } else {
            self.mongo
                .inconsistent_indexes(database, collection, cancel)
                .await?
        };
        if !found.is_empty() {
            tracing::warn!(
                namespace = %format!("{database}.{collection}"),
                count = found.len(),
                "Inconsistent indexes across shards"
            );
        }
        Ok(found)
    }
}

/// Dropped entries left behind by old config servers do not count.
fn already_sharded(existing: &[ShardedCollection], namespace: &str) -> bool {
    existing.iter().any(|c| !c.dropped && c.id == namespace)
}
