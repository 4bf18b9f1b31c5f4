//! MongoDB client and administrative commands.
//!
//! Every command goes through [`MongoClient::run_command`], which bounds it by
//! the instance's `exec_wait_timeout`, aborts it when the caller's
//! [`CancellationToken`] fires and checks the reply's `ok` flag. A reply that
//! arrives over a healthy connection but says `ok: 0` is still a failure.
//!
//! # Operations
//!
//! | Area | Methods |
//! |------|---------|
//! | Replica set | `repl_set_name`, `repl_set_status`, `repl_set_config`, `repl_set_reconfig`, `repl_set_initiate`, `is_primary` |
//! | Sharding | `add_shard`, `list_shards`, `enable_sharding`, `shard_collection`, `sharded_collections` |
//! | Indexes | `inconsistent_indexes`, `inconsistent_indexes_local` |
//! | Catalog | `list_databases`, `database_exists`, `list_collections`, `collection_exists`, `create_database`, `drop_collection` |
//! | RBAC | `create_role`, `drop_role`, `role_exists`, `create_root_user`, `create_admin_user`, `user_exists`, `grant_roles_to_user`, `revoke_roles_from_user` |
//! | Tuning | `set_cache_size_gb` |

mod indexes;
mod rbac;
mod sharding;
mod types;

pub use indexes::{find_inconsistent_indexes, inconsistent_index_pipeline};
pub use rbac::{ADMIN_USER_ROLES, COLLECTION_ROLE_ACTIONS};
pub use sharding::{ShardKeyKind, ShardKeySpec};
pub use types::{
    InconsistentIndex, IndexStat, IsMasterReply, ReplSetConfig, ReplSetConfigMember,
    ReplSetMember, ReplSetStatus, ShardInfo, ShardedCollection,
};

use super::{bounded, guarded};
use crate::config::MongoConfig;
use crate::{Error, Result};
use bson::{Bson, Document, doc};
use mongodb::error::ErrorKind;
use mongodb::options::ClientOptions;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use types::decode;

/// Collection that receives the marker document in [`MongoClient::create_database`].
const MARKER_COLLECTION: &str = "test";

/// Client for one MongoDB deployment.
pub struct MongoClient {
    name: String,
    client: mongodb::Client,
    timeout: Duration,
}

/// Maps a driver error onto the crate taxonomy.
pub(crate) fn driver_error(operation: &str, e: &mongodb::error::Error) -> Error {
    match e.kind.as_ref() {
        ErrorKind::Command(command) => Error::BackendRejected {
            operation: operation.to_string(),
            code: Some(if command.code_name.is_empty() {
                command.code.to_string()
            } else {
                format!("{} {}", command.code, command.code_name)
            }),
            message: command.message.clone(),
        },
        ErrorKind::Authentication { message, .. } => Error::BackendRejected {
            operation: operation.to_string(),
            code: None,
            message: message.clone(),
        },
        ErrorKind::BsonDeserialization(de) => Error::parse(operation, de),
        _ => Error::transport(operation, e),
    }
}

/// Checks the `ok` flag of a command reply.
///
/// # Errors
///
/// Returns [`Error::Parse`] if `ok` is missing or not numeric, and
/// [`Error::BackendRejected`] with the reply's `errmsg` and `code` if it is
/// numeric but not 1.
pub fn ensure_ok(operation: &str, reply: &Document) -> Result<()> {
    let ok = match reply.get("ok") {
        Some(Bson::Double(v)) => (v - 1.0).abs() < f64::EPSILON,
        Some(Bson::Int32(v)) => *v == 1,
        Some(Bson::Int64(v)) => *v == 1,
        Some(other) => {
            return Err(Error::parse(
                format!("{operation} reply"),
                format!("'ok' is not numeric: {other:?}"),
            ));
        },
        None => {
            return Err(Error::parse(
                format!("{operation} reply"),
                "missing 'ok' field",
            ));
        },
    };

    if ok {
        return Ok(());
    }

    let code = match (reply.get("code"), reply.get_str("codeName")) {
        (Some(Bson::Int32(c)), Ok(name)) => Some(format!("{c} {name}")),
        (Some(Bson::Int32(c)), Err(_)) => Some(c.to_string()),
        (_, Ok(name)) => Some(name.to_string()),
        _ => None,
    };
    Err(Error::BackendRejected {
        operation: operation.to_string(),
        code,
        message: reply
            .get_str("errmsg")
            .unwrap_or("command reported failure")
            .to_string(),
    })
}

/// Reads an array field, treating absence as empty.
fn array_or_empty(reply: &Document, key: &str) -> Vec<Document> {
    reply
        .get_array(key)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_document().cloned())
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn require(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidInput(format!("{what} must not be empty")));
    }
    Ok(())
}

impl MongoClient {
    /// Builds a client from configuration.
    ///
    /// The driver connects in the background; no server round-trip happens
    /// here, so an unreachable deployment fails on first use instead.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection URI cannot be parsed.
    pub async fn connect(name: &str, config: &MongoConfig) -> Result<Self> {
        let uri = config.connection_uri();
        let connect_timeout = Duration::from_millis(config.connect_timeout_ms);

        let mut options = bounded("mongo_parse_uri", connect_timeout, async {
            ClientOptions::parse(&uri)
                .await
                .map_err(|e| Error::parse("mongodb connection uri", e))
        })
        .await?;
        options.connect_timeout = Some(connect_timeout);
        options.server_selection_timeout =
            Some(Duration::from_millis(config.server_selection_timeout_ms));
        options.app_name = Some("myadmin".to_string());

        let client = mongodb::Client::with_options(options)
            .map_err(|e| driver_error("mongo_connect", &e))?;

        Ok(Self {
            name: name.to_string(),
            client,
            timeout: config.exec_wait_timeout(),
        })
    }

    /// Returns the instance name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs a database command and checks its `ok` flag.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] on network failure or timeout,
    /// [`Error::Cancelled`] if `cancel` fires first, and the errors of
    /// [`ensure_ok`] for a failed reply.
    pub async fn run_command(
        &self,
        database: &str,
        command: Document,
        cancel: &CancellationToken,
    ) -> Result<Document> {
        let operation = command
            .keys()
            .next()
            .map_or_else(|| "mongo_command".to_string(), |k| format!("mongo_{k}"));
        tracing::debug!(instance = %self.name, database = %database, operation = %operation, "Running MongoDB command");

        let reply = guarded(&operation, self.timeout, cancel, async {
            self.client
                .database(database)
                .run_command(command)
                .await
                .map_err(|e| driver_error(&operation, &e))
        })
        .await?;

        ensure_ok(&operation, &reply)?;
        Ok(reply)
    }

    /// Returns the replica set name from `replSetGetStatus`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendRejected`] when not running as a replica set.
    pub async fn repl_set_name(&self, cancel: &CancellationToken) -> Result<String> {
        Ok(self.repl_set_status(cancel).await?.set)
    }

    /// Runs `replSetGetStatus`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the reply does not decode.
    pub async fn repl_set_status(&self, cancel: &CancellationToken) -> Result<ReplSetStatus> {
        let reply = self
            .run_command("admin", doc! { "replSetGetStatus": 1 }, cancel)
            .await?;
        decode("replSetGetStatus reply", reply)
    }

    /// Runs `isMaster`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the reply does not decode.
    pub async fn is_primary(&self, cancel: &CancellationToken) -> Result<IsMasterReply> {
        let reply = self
            .run_command("admin", doc! { "isMaster": 1 }, cancel)
            .await?;
        decode("isMaster reply", reply)
    }

    /// Runs `replSetInitiate`, with the server's default config when `config`
    /// is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendRejected`] if the set is already initialized.
    pub async fn repl_set_initiate(
        &self,
        config: Option<Document>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let value = config.map_or_else(|| Bson::String(String::new()), Bson::Document);
        self.run_command("admin", doc! { "replSetInitiate": value }, cancel)
            .await
            .map(|_| ())
    }

    /// Runs `replSetGetConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the reply has no usable `config` document.
    pub async fn repl_set_config(&self, cancel: &CancellationToken) -> Result<ReplSetConfig> {
        let mut reply = self
            .run_command("admin", doc! { "replSetGetConfig": 1 }, cancel)
            .await?;
        match reply.remove("config") {
            Some(Bson::Document(config)) => ReplSetConfig::from_document(config),
            other => Err(Error::parse(
                "replSetGetConfig reply",
                format!("expected a 'config' document, got {other:?}"),
            )),
        }
    }

    /// Runs `replSetReconfig` with `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendRejected`] if the server refuses the config.
    pub async fn repl_set_reconfig(
        &self,
        config: &ReplSetConfig,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let command = doc! {
            "replSetReconfig": config.as_document().clone(),
            "force": force,
        };
        self.run_command("admin", command, cancel).await.map(|_| ())
    }

    /// Lists database names.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] on network failure or timeout.
    pub async fn list_databases(&self, cancel: &CancellationToken) -> Result<Vec<String>> {
        guarded("mongo_list_databases", self.timeout, cancel, async {
            self.client
                .list_database_names()
                .await
                .map_err(|e| driver_error("mongo_list_databases", &e))
        })
        .await
    }

    /// Returns true if `database` exists.
    ///
    /// # Errors
    ///
    /// See [`Self::list_databases`].
    pub async fn database_exists(&self, database: &str, cancel: &CancellationToken) -> Result<bool> {
        Ok(self
            .list_databases(cancel)
            .await?
            .iter()
            .any(|name| name == database))
    }

    /// Lists collection names of `database`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] on network failure or timeout.
    pub async fn list_collections(
        &self,
        database: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        guarded("mongo_list_collections", self.timeout, cancel, async {
            self.client
                .database(database)
                .list_collection_names()
                .await
                .map_err(|e| driver_error("mongo_list_collections", &e))
        })
        .await
    }

    /// Returns true if `database.collection` exists.
    ///
    /// # Errors
    ///
    /// See [`Self::list_collections`].
    pub async fn collection_exists(
        &self,
        database: &str,
        collection: &str,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        Ok(self
            .list_collections(database, cancel)
            .await?
            .iter()
            .any(|name| name == collection))
    }

    /// Materializes `database` by inserting a marker document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty name.
    pub async fn create_database(&self, database: &str, cancel: &CancellationToken) -> Result<()> {
        require(database, "database name")?;
        guarded("mongo_create_database", self.timeout, cancel, async {
            self.client
                .database(database)
                .collection::<Document>(MARKER_COLLECTION)
                .insert_one(doc! { "dba": "init" })
                .await
                .map(|_| ())
                .map_err(|e| driver_error("mongo_create_database", &e))
        })
        .await
    }

    /// Drops `database.collection`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for empty names.
    pub async fn drop_collection(
        &self,
        database: &str,
        collection: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        require(database, "database name")?;
        require(collection, "collection name")?;
        guarded("mongo_drop_collection", self.timeout, cancel, async {
            self.client
                .database(database)
                .collection::<Document>(collection)
                .drop()
                .await
                .map_err(|e| driver_error("mongo_drop_collection", &e))
        })
        .await
    }

    /// Sets the `WiredTiger` cache size at runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a zero size.
    pub async fn set_cache_size_gb(&self, gigabytes: u32, cancel: &CancellationToken) -> Result<()> {
        if gigabytes == 0 {
            return Err(Error::InvalidInput("cache size must be at least 1G".to_string()));
        }
        let command = doc! {
            "setParameter": 1,
            "wiredTigerEngineRuntimeConfig": format!("cache_size={gigabytes}G"),
        };
        self.run_command("admin", command, cancel).await.map(|_| ())
    }
}
