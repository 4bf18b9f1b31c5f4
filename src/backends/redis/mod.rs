//! Redis client.
//!
//! Wraps a [`redis::Client`] and a lazily created multiplexed
//! [`ConnectionManager`]. Construction only validates the URL; the first
//! command opens the connection. Transport errors surface immediately and
//! are never retried here.

pub mod parser;
mod types;

pub use types::{
    ClusterNode, DatabaseInfo, NodeRole, NodeStatus, RedisClusterInfo, RedisInfo, RedisModule,
    SlaveInfo,
};

use super::bounded;
use crate::config::RedisConfig;
use crate::{Error, Result};
use ::redis::aio::ConnectionManager;
use ::redis::{Cmd, FromRedisValue, RedisError, Value, cmd};
use std::time::Duration;
use tokio::sync::OnceCell;

/// Client for one Redis instance.
#[derive(Debug)]
pub struct RedisClient {
    name: String,
    client: ::redis::Client,
    manager: OnceCell<ConnectionManager>,
    timeout: Duration,
}

/// Maps a driver error onto the crate taxonomy.
///
/// Server error replies carry a code and become rejections; everything else
/// is transport.
fn redis_error(operation: &str, e: &RedisError) -> Error {
    if e.is_io_error() || e.is_timeout() || e.is_connection_dropped() || e.is_connection_refusal() {
        return Error::transport(operation, e);
    }
    match e.code() {
        Some(code) => Error::BackendRejected {
            operation: operation.to_string(),
            code: Some(code.to_string()),
            message: e.detail().map_or_else(|| e.to_string(), String::from),
        },
        None => Error::transport(operation, e),
    }
}

impl RedisClient {
    /// Builds a client from configuration without connecting.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection URL is invalid.
    pub fn new(name: &str, config: &RedisConfig) -> Result<Self> {
        let client = ::redis::Client::open(config.connection_url()).map_err(|e| {
            Error::OperationFailed {
                operation: "redis_open".to_string(),
                cause: e.to_string(),
            }
        })?;

        Ok(Self {
            name: name.to_string(),
            client,
            manager: OnceCell::new(),
            timeout: config.timeout(),
        })
    }

    /// Returns the instance name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        let manager = self
            .manager
            .get_or_try_init(|| {
                bounded("redis_connect", self.timeout, async {
                    let manager = ConnectionManager::new(self.client.clone())
                        .await
                        .map_err(|e| redis_error("redis_connect", &e))?;
                    tracing::debug!(instance = %self.name, "Opened Redis connection");
                    Ok(manager)
                })
            })
            .await?;
        Ok(manager.clone())
    }

    async fn command<T: FromRedisValue>(&self, operation: &str, command: Cmd) -> Result<T> {
        let mut conn = self.connection().await?;
        bounded(operation, self.timeout, async move {
            command
                .query_async::<T>(&mut conn)
                .await
                .map_err(|e| redis_error(operation, &e))
        })
        .await
    }

    /// Sends `PING`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] on connection failure or timeout.
    pub async fn ping(&self) -> Result<()> {
        let reply: String = self.command("redis_ping", cmd("PING")).await?;
        if reply.eq_ignore_ascii_case("PONG") {
            Ok(())
        } else {
            Err(Error::parse("redis PING", format!("unexpected reply '{reply}'")))
        }
    }

    /// Runs `INFO` and parses the reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if any numeric field is malformed.
    pub async fn info(&self) -> Result<RedisInfo> {
        let raw: String = self.command("redis_info", cmd("INFO")).await?;
        parser::parse_info(&raw)
    }

    /// Runs `CLUSTER INFO` and parses the reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendRejected`] when cluster mode is off.
    pub async fn cluster_info(&self) -> Result<RedisClusterInfo> {
        let raw: String = self
            .command("redis_cluster_info", cmd("CLUSTER").arg("INFO").clone())
            .await?;
        parser::parse_cluster_info(&raw)
    }

    /// Runs `CLUSTER NODES` and parses the reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendRejected`] when cluster mode is off and
    /// [`Error::Parse`] for malformed node lines.
    pub async fn cluster_nodes(&self) -> Result<Vec<ClusterNode>> {
        let raw: String = self
            .command("redis_cluster_nodes", cmd("CLUSTER").arg("NODES").clone())
            .await?;
        parser::parse_cluster_nodes(&raw)
    }

    /// Runs `MODULE LIST`.
    ///
    /// Servers without the `MODULE` command report no modules.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] for a malformed reply.
    pub async fn module_list(&self) -> Result<Vec<RedisModule>> {
        let result: Result<Value> = self
            .command("redis_module_list", cmd("MODULE").arg("LIST").clone())
            .await;
        match result {
            Ok(value) => parser::parse_module_list(&value),
            Err(Error::BackendRejected { message, .. })
                if message.to_lowercase().contains("unknown command") =>
            {
                tracing::debug!(instance = %self.name, "MODULE command not supported");
                Ok(Vec::new())
            },
            Err(e) => Err(e),
        }
    }

    /// Returns the indexes of databases that hold keys.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] for a malformed keyspace section.
    pub async fn db_list(&self) -> Result<Vec<u32>> {
        let raw: String = self
            .command("redis_db_list", cmd("INFO").arg("keyspace").clone())
            .await?;
        parser::parse_db_list(&raw)
    }

    /// Reads a string key.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or if the key holds another type.
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        self.command("redis_get", cmd("GET").arg(key).clone()).await
    }

    /// Writes a string key with a TTL in seconds.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure.
    pub async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let command = cmd("SET").arg(key).arg(value).arg("EX").arg(ttl_secs.max(1)).clone();
        self.command::<()>("redis_set_ex", command).await
    }

    /// Deletes a key, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure.
    pub async fn del(&self, key: &str) -> Result<bool> {
        let removed: u64 = self.command("redis_del", cmd("DEL").arg(key).clone()).await?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_invalid_url() {
        let config = RedisConfig {
            uri: Some("http://not-redis".to_string()),
            ..Default::default()
        };
        assert!(RedisClient::new("default", &config).is_err());
    }

    #[test]
    fn test_new_does_not_connect() {
        let config = RedisConfig {
            host: "10.255.255.1".to_string(),
            ..Default::default()
        };
        let client = RedisClient::new("cache", &config).unwrap();
        assert_eq!(client.name(), "cache");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let config = RedisConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            timeout: 1,
            ..Default::default()
        };
        let client = RedisClient::new("default", &config).unwrap();
        let err = client.ping().await.unwrap_err();
        assert!(matches!(err, Error::Transport { .. }), "got {err:?}");
    }
}
