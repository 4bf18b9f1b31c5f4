//! Sharding commands issued through a mongos router.

use super::types::{ShardList, decode};
use super::{MongoClient, ShardInfo, ShardedCollection, driver_error, require};
use crate::backends::guarded;
use crate::{Error, Result};
use bson::{Document, doc};
use std::fmt;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

/// How documents are distributed by the shard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardKeyKind {
    /// Single field, hashed.
    Hashed,
    /// One or more fields, ascending ranges.
    Ranged,
}

impl fmt::Display for ShardKeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hashed => write!(f, "hashed"),
            Self::Ranged => write!(f, "ranged"),
        }
    }
}

impl FromStr for ShardKeyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "hashed" | "hash" => Ok(Self::Hashed),
            "ranged" | "range" => Ok(Self::Ranged),
            other => Err(Error::InvalidInput(format!(
                "unsupported shard key kind '{other}' (expected hashed or ranged)"
            ))),
        }
    }
}

/// Shard key requested for `shardCollection`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardKeySpec {
    /// Distribution kind.
    pub kind: ShardKeyKind,
    /// Key fields, in order.
    pub fields: Vec<String>,
    /// Enforce uniqueness of the key.
    pub unique: bool,
}

impl ShardKeySpec {
    /// Builds the key pattern document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when no field is given, a field name
    /// is empty, a hashed key names more than one field, or a hashed key is
    /// marked unique.
    pub fn key_document(&self) -> Result<Document> {
        if self.fields.is_empty() {
            return Err(Error::InvalidInput(
                "shard key needs at least one field".to_string(),
            ));
        }
        for field in &self.fields {
            require(field, "shard key field")?;
        }

        match self.kind {
            ShardKeyKind::Hashed => {
                if self.fields.len() != 1 {
                    return Err(Error::InvalidInput(format!(
                        "hashed shard key takes exactly one field, got {}",
                        self.fields.len()
                    )));
                }
                if self.unique {
                    return Err(Error::InvalidInput(
                        "hashed shard key cannot be unique".to_string(),
                    ));
                }
                let mut key = Document::new();
                key.insert(self.fields[0].as_str(), "hashed");
                Ok(key)
            },
            ShardKeyKind::Ranged => {
                let mut key = Document::new();
                for field in &self.fields {
                    key.insert(field.as_str(), 1);
                }
                Ok(key)
            },
        }
    }
}

impl MongoClient {
    /// Registers a shard with the cluster.
    ///
    /// `shard` is a host or `replSet/host1,host2` connection string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendRejected`] if the router refuses the shard.
    pub async fn add_shard(
        &self,
        shard: &str,
        name: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Document> {
        require(shard, "shard connection string")?;
        let mut command = doc! { "addShard": shard };
        if let Some(name) = name.filter(|n| !n.is_empty()) {
            command.insert("name", name);
        }
        tracing::info!(instance = %self.name, shard = %shard, "Adding shard");
        self.run_command("admin", command, cancel).await
    }

    /// Runs `listShards`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the reply does not decode.
    pub async fn list_shards(&self, cancel: &CancellationToken) -> Result<Vec<ShardInfo>> {
        let reply = self
            .run_command("admin", doc! { "listShards": 1 }, cancel)
            .await?;
        Ok(decode::<ShardList>("listShards reply", reply)?.shards)
    }

    /// Enables sharding for `database`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty name.
    pub async fn enable_sharding(&self, database: &str, cancel: &CancellationToken) -> Result<()> {
        require(database, "database name")?;
        self.run_command("admin", doc! { "enableSharding": database }, cancel)
            .await
            .map(|_| ())
    }

    /// Shards `database.collection` with `key`.
    ///
    /// The key is validated before anything is sent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an invalid key or empty names, and
    /// [`Error::BackendRejected`] if the router refuses the command.
    pub async fn shard_collection(
        &self,
        database: &str,
        collection: &str,
        key: &ShardKeySpec,
        cancel: &CancellationToken,
    ) -> Result<()> {
        require(database, "database name")?;
        require(collection, "collection name")?;
        let pattern = key.key_document()?;

        let namespace = format!("{database}.{collection}");
        tracing::info!(
            instance = %self.name,
            namespace = %namespace,
            kind = %key.kind,
            unique = key.unique,
            "Sharding collection"
        );
        let command = doc! {
            "shardCollection": namespace,
            "key": pattern,
            "unique": key.unique,
        };
        self.run_command("admin", command, cancel).await.map(|_| ())
    }

    /// Lists live sharded collections from `config.collections`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if an entry does not decode.
    pub async fn sharded_collections(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<ShardedCollection>> {
        let documents = guarded("mongo_sharded_collections", self.timeout, cancel, async {
            let mut cursor = self
                .client
                .database("config")
                .collection::<Document>("collections")
                .find(doc! { "dropped": { "$ne": true } })
                .await
                .map_err(|e| driver_error("mongo_sharded_collections", &e))?;

            let mut documents = Vec::new();
            while cursor
                .advance()
                .await
                .map_err(|e| driver_error("mongo_sharded_collections", &e))?
            {
                documents.push(
                    cursor
                        .deserialize_current()
                        .map_err(|e| driver_error("mongo_sharded_collections", &e))?,
                );
            }
            Ok(documents)
        })
        .await?;

        documents
            .into_iter()
            .map(|d| decode("config.collections entry", d))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::MongoConfig;
    use test_case::test_case;

    fn spec(kind: ShardKeyKind, fields: &[&str], unique: bool) -> ShardKeySpec {
        ShardKeySpec {
            kind,
            fields: fields.iter().map(ToString::to_string).collect(),
            unique,
        }
    }

    #[test]
    fn test_hashed_key_document() {
        let key = spec(ShardKeyKind::Hashed, &["user_id"], false);
        assert_eq!(key.key_document().unwrap(), doc! { "user_id": "hashed" });
    }

    #[test]
    fn test_ranged_key_document_keeps_order() {
        let key = spec(ShardKeyKind::Ranged, &["region", "created_at"], true);
        let document = key.key_document().unwrap();
        let keys: Vec<&str> = document.keys().map(String::as_str).collect();
        assert_eq!(keys, ["region", "created_at"]);
        assert_eq!(document.get_i32("region").unwrap(), 1);
    }

    #[test_case(ShardKeyKind::Hashed, &["a", "b"], false ; "hashed with two fields")]
    #[test_case(ShardKeyKind::Hashed, &["a"], true ; "hashed and unique")]
    #[test_case(ShardKeyKind::Ranged, &[], false ; "no fields")]
    #[test_case(ShardKeyKind::Ranged, &["a", ""], false ; "blank field")]
    fn test_invalid_key(kind: ShardKeyKind, fields: &[&str], unique: bool) {
        assert!(matches!(
            spec(kind, fields, unique).key_document(),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("Hashed".parse::<ShardKeyKind>().unwrap(), ShardKeyKind::Hashed);
        assert_eq!("range".parse::<ShardKeyKind>().unwrap(), ShardKeyKind::Ranged);
        assert!(matches!("zoned".parse::<ShardKeyKind>(), Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_invalid_key_fails_before_network() {
        // Nothing listens on port 1; a network attempt would surface as a
        // transport error instead.
        let config = MongoConfig {
            uri: Some("mongodb://127.0.0.1:1".to_string()),
            server_selection_timeout_ms: 100,
            ..Default::default()
        };
        let client = MongoClient::connect("router", &config).await.unwrap();
        let cancel = CancellationToken::new();

        for key in [
            spec(ShardKeyKind::Hashed, &["a", "b"], false),
            spec(ShardKeyKind::Hashed, &["a"], true),
        ] {
            let err = client
                .shard_collection("shop", "orders", &key, &cancel)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "got {err:?}");
        }
    }
}
