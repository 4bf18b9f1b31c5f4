//! Redis commands.

use super::print_json;
use anyhow::{Context, bail};
use clap::Subcommand;
use myadmin::Registry;
use myadmin::config::SessionSettings;
use myadmin::services::SessionStore;
use serde_json::json;

/// Redis subcommands.
#[derive(Subcommand)]
pub enum RedisAction {
    /// Send PING.
    Ping,
    /// Parsed INFO.
    Info,
    /// Parsed CLUSTER INFO.
    ClusterInfo,
    /// Parsed CLUSTER NODES.
    ClusterNodes,
    /// Loaded modules.
    Modules,
    /// Database indexes holding keys.
    Dbs,
    /// Show the stored login session of a user.
    SessionGet {
        /// User id.
        uid: u64,
    },
    /// Remove the login session and refresh marker of a user.
    SessionDelete {
        /// User id.
        uid: u64,
    },
}

/// Runs a Redis subcommand against `instance`.
pub async fn cmd_redis(
    registry: &Registry,
    instance: Option<&str>,
    session: &SessionSettings,
    action: RedisAction,
) -> anyhow::Result<()> {
    let redis = move || registry.redis(instance);
    match action {
        RedisAction::Ping => {
            let redis = redis().await?;
            redis.ping().await?;
            print_json(&json!({ "instance": redis.name(), "reply": "PONG" }))
        },
        RedisAction::Info => print_json(&redis().await?.info().await?),
        RedisAction::ClusterInfo => print_json(&redis().await?.cluster_info().await?),
        RedisAction::ClusterNodes => print_json(&redis().await?.cluster_nodes().await?),
        RedisAction::Modules => print_json(&redis().await?.module_list().await?),
        RedisAction::Dbs => print_json(&redis().await?.db_list().await?),
        RedisAction::SessionGet { uid } => {
            let store = session_store(registry, session).await?;
            let value: Option<serde_json::Value> = store.get(uid).await?;
            let refresh = store.refresh_token(uid).await?;
            print_json(&json!({ "uid": uid, "session": value, "refresh_token": refresh }))
        },
        RedisAction::SessionDelete { uid } => {
            let store = session_store(registry, session).await?;
            let session_removed = store.delete(uid).await?;
            let refresh_removed = store.delete_refresh_token(uid).await?;
            print_json(&json!({
                "uid": uid,
                "session_removed": session_removed,
                "refresh_removed": refresh_removed,
            }))
        },
    }
}

async fn session_store(registry: &Registry, settings: &SessionSettings) -> anyhow::Result<SessionStore> {
    if !settings.enabled {
        bail!("sessions are not kept in Redis (session.enabled = false)");
    }
    let redis = registry
        .redis(Some(&settings.instance))
        .await
        .with_context(|| format!("session instance '{}'", settings.instance))?;
    Ok(SessionStore::new(redis, settings.clone()))
}
