//! MongoDB commands.

use super::{print_json, split_list};
use clap::Subcommand;
use myadmin::Registry;
use myadmin::backends::mongo::{ShardKeyKind, ShardKeySpec};
use myadmin::services::{AccessService, AccountKind, ReplicaSetService, ShardingService};
use secrecy::SecretString;
use serde_json::json;
use tokio_util::sync::CancellationToken;

/// MongoDB subcommands.
#[derive(Subcommand)]
pub enum MongoAction {
    /// Replica set status and configuration.
    Topology,
    /// Reply of isMaster.
    IsMaster,
    /// Initiate a replica set.
    Initiate {
        /// Replica set name; required with --hosts.
        #[arg(long)]
        name: Option<String>,
        /// Comma-separated member hosts.
        #[arg(long)]
        hosts: Option<String>,
    },
    /// Add a replica set member.
    AddMember {
        /// Member `host:port`.
        host: String,
        /// Election priority.
        #[arg(long, default_value = "1.0")]
        priority: f64,
        /// Votes in elections.
        #[arg(long, default_value = "1")]
        votes: i32,
    },
    /// Remove a replica set member.
    RemoveMember {
        /// Member `host:port`.
        host: String,
        /// Reconfigure without a majority.
        #[arg(long)]
        force: bool,
    },
    /// Register a shard.
    AddShard {
        /// Host or `replSet/host1,host2` connection string.
        shard: String,
        /// Shard name.
        #[arg(long)]
        name: Option<String>,
    },
    /// List shards and sharded collections.
    Shards,
    /// Shard a collection.
    ShardCollection {
        /// Database name.
        database: String,
        /// Collection name.
        collection: String,
        /// Key kind: hashed or ranged.
        #[arg(long, default_value = "hashed")]
        kind: String,
        /// Comma-separated key fields.
        #[arg(long)]
        fields: String,
        /// Enforce a unique key.
        #[arg(long)]
        unique: bool,
    },
    /// Report indexes that differ across shards.
    Indexes {
        /// Database name.
        database: String,
        /// Collection name.
        collection: String,
        /// Compare raw index stats locally.
        #[arg(long)]
        local: bool,
    },
    /// List databases.
    Databases,
    /// List collections of a database.
    Collections {
        /// Database name.
        database: String,
    },
    /// Create a database with a marker document.
    CreateDatabase {
        /// Database name.
        database: String,
    },
    /// Drop a collection.
    DropCollection {
        /// Database name.
        database: String,
        /// Collection name.
        collection: String,
    },
    /// Give a user a collection-scoped role, creating the role if needed.
    Grant {
        /// Database name.
        database: String,
        /// Collection the role covers.
        collection: String,
        /// User of the database.
        user: String,
        /// Role name.
        role: String,
    },
    /// Take a role away from a user.
    Revoke {
        /// Database name.
        database: String,
        /// User of the database.
        user: String,
        /// Role name.
        role: String,
        /// Drop the role afterwards.
        #[arg(long)]
        drop_role: bool,
    },
    /// Create an account on `admin` unless it exists.
    CreateUser {
        /// User name.
        user: String,
        /// Grant `root` instead of the administrative role set.
        #[arg(long)]
        root: bool,
        /// Password.
        #[arg(long, env = "MYADMIN_NEW_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Set the `WiredTiger` cache size.
    CacheSize {
        /// Size in gigabytes.
        gigabytes: u32,
    },
}

/// Runs a MongoDB subcommand against `instance`.
pub async fn cmd_mongo(
    registry: &Registry,
    instance: Option<&str>,
    action: MongoAction,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let mongo = registry.mongo(instance).await?;

    match action {
        MongoAction::Topology => {
            let topology = ReplicaSetService::new(mongo).topology(cancel).await?;
            print_json(&topology)
        },
        MongoAction::IsMaster => print_json(&mongo.is_primary(cancel).await?),
        MongoAction::Initiate { name, hosts } => {
            let hosts = hosts.as_deref().map(split_list).unwrap_or_default();
            ReplicaSetService::new(mongo)
                .initiate(name.as_deref(), &hosts, cancel)
                .await?;
            print_json(&json!({ "initiated": true }))
        },
        MongoAction::AddMember {
            host,
            priority,
            votes,
        } => {
            let config = ReplicaSetService::new(mongo)
                .add_member(&host, priority, votes, cancel)
                .await?;
            print_json(config.as_document())
        },
        MongoAction::RemoveMember { host, force } => {
            let config = ReplicaSetService::new(mongo)
                .remove_member(&host, force, cancel)
                .await?;
            print_json(config.as_document())
        },
        MongoAction::AddShard { shard, name } => {
            print_json(&mongo.add_shard(&shard, name.as_deref(), cancel).await?)
        },
        MongoAction::Shards => print_json(&ShardingService::new(mongo).overview(cancel).await?),
        MongoAction::ShardCollection {
            database,
            collection,
            kind,
            fields,
            unique,
        } => {
            let key = ShardKeySpec {
                kind: kind.parse::<ShardKeyKind>()?,
                fields: split_list(&fields),
                unique,
            };
            let outcome = ShardingService::new(mongo)
                .shard_collection(&database, &collection, &key, cancel)
                .await?;
            print_json(&json!({ "namespace": format!("{database}.{collection}"), "outcome": outcome }))
        },
        MongoAction::Indexes {
            database,
            collection,
            local,
        } => {
            let report = ShardingService::new(mongo)
                .index_report(&database, &collection, local, cancel)
                .await?;
            print_json(&report)
        },
        MongoAction::Databases => print_json(&mongo.list_databases(cancel).await?),
        MongoAction::Collections { database } => {
            print_json(&mongo.list_collections(&database, cancel).await?)
        },
        MongoAction::CreateDatabase { database } => {
            mongo.create_database(&database, cancel).await?;
            print_json(&json!({ "database": database, "created": true }))
        },
        MongoAction::DropCollection {
            database,
            collection,
        } => {
            mongo.drop_collection(&database, &collection, cancel).await?;
            print_json(&json!({ "namespace": format!("{database}.{collection}"), "dropped": true }))
        },
        MongoAction::Grant {
            database,
            collection,
            user,
            role,
        } => {
            let outcome = AccessService::new(mongo)
                .grant_collection_access(&database, &collection, &user, &role, cancel)
                .await?;
            print_json(&outcome)
        },
        MongoAction::Revoke {
            database,
            user,
            role,
            drop_role,
        } => {
            AccessService::new(mongo)
                .revoke_collection_access(&database, &user, &role, drop_role, cancel)
                .await?;
            print_json(&json!({ "revoked": true, "role_dropped": drop_role }))
        },
        MongoAction::CreateUser {
            user,
            root,
            password,
        } => {
            let kind = if root {
                AccountKind::Root
            } else {
                AccountKind::Admin
            };
            let created = AccessService::new(mongo)
                .ensure_account(kind, &user, &SecretString::from(password), cancel)
                .await?;
            print_json(&json!({ "user": user, "created": created }))
        },
        MongoAction::CacheSize { gigabytes } => {
            mongo.set_cache_size_gb(gigabytes, cancel).await?;
            print_json(&json!({ "cache_size_gb": gigabytes }))
        },
    }
}
