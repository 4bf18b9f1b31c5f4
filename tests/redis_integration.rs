//! Redis integration tests.
//!
//! Exercise the Redis client and the session store against a live server:
//! - Connectivity and INFO parsing
//! - Keyspace listing
//! - Key lifecycle (set with TTL, get, delete)
//! - MODULE LIST on servers with and without module support
//! - Session and refresh-marker storage
//!
//! These tests require a running Redis server. Set the environment variable
//! `MYADMIN_TEST_REDIS_URL` to enable them:
//!
//! ```bash
//! export MYADMIN_TEST_REDIS_URL="redis://localhost:6379"
//! cargo test --test redis_integration
//! ```

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::print_stderr,
    clippy::doc_markdown
)]

use myadmin::RedisClient;
use myadmin::config::{RedisConfig, SessionSettings};
use myadmin::services::SessionStore;
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Environment variable for the Redis test connection URL.
const REDIS_URL_ENV: &str = "MYADMIN_TEST_REDIS_URL";

/// Returns the Redis connection URL if available, or None to skip tests.
fn get_redis_url() -> Option<String> {
    env::var(REDIS_URL_ENV).ok()
}

/// Macro to skip tests when Redis is not available.
macro_rules! require_redis {
    () => {
        match get_redis_url() {
            Some(url) => url,
            None => {
                eprintln!(
                    "Skipping test: {} not set. Set this environment variable to run Redis tests.",
                    REDIS_URL_ENV
                );
                return;
            },
        }
    };
}

fn client(url: String) -> RedisClient {
    let config = RedisConfig {
        uri: Some(url),
        ..Default::default()
    };
    RedisClient::new("test", &config).expect("valid redis url")
}

/// Unique suffix so parallel runs do not share keys.
fn unique() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos()
        .try_into()
        .unwrap_or(u64::MAX)
}

// ============================================================================
// Client Tests
// ============================================================================

#[tokio::test]
async fn test_ping() {
    let url = require_redis!();
    client(url).ping().await.expect("ping");
}

#[tokio::test]
async fn test_info_reports_version_and_role() {
    let url = require_redis!();
    let info = client(url).info().await.expect("info");

    assert!(!info.redis_version.is_empty());
    assert!(info.role == "master" || info.role == "slave");
    assert!(info.used_memory > 0);
}

#[tokio::test]
async fn test_db_list_includes_written_database() {
    let url = require_redis!();
    let redis = client(url);
    let key = format!("myadmin_test_db_{}", unique());

    redis.set_ex(&key, "1", 30).await.expect("set");
    let dbs = redis.db_list().await.expect("db list");
    redis.del(&key).await.expect("del");

    assert!(!dbs.is_empty());
}

#[tokio::test]
async fn test_key_lifecycle() {
    let url = require_redis!();
    let redis = client(url);
    let key = format!("myadmin_test_key_{}", unique());

    assert_eq!(redis.get(&key).await.expect("get"), None);
    redis.set_ex(&key, "value", 30).await.expect("set");
    assert_eq!(redis.get(&key).await.expect("get").as_deref(), Some("value"));
    assert!(redis.del(&key).await.expect("del"));
    assert!(!redis.del(&key).await.expect("second del"));
}

#[tokio::test]
async fn test_module_list_never_fails_on_plain_server() {
    let url = require_redis!();
    let modules = client(url).module_list().await.expect("module list");
    assert!(modules.iter().all(|m| !m.name.is_empty()));
}

// ============================================================================
// Session Tests
// ============================================================================

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct LoginUser {
    uid: u64,
    name: String,
}

fn store(url: String) -> SessionStore {
    let settings = SessionSettings {
        key_prefix: "myadmin_test_user_".to_string(),
        refresh_prefix: "myadmin_test_refresh_".to_string(),
        ttl_secs: 60,
        ..Default::default()
    };
    SessionStore::new(Arc::new(client(url)), settings)
}

#[tokio::test]
async fn test_session_roundtrip() {
    let url = require_redis!();
    let sessions = store(url);
    let uid = unique();
    let user = LoginUser {
        uid,
        name: "alice".to_string(),
    };

    sessions.set(uid, &user).await.expect("set session");
    let loaded: Option<LoginUser> = sessions.get(uid).await.expect("get session");
    assert_eq!(loaded, Some(user));
    assert_eq!(
        sessions.refresh_token(uid).await.expect("refresh"),
        Some(uid.to_string())
    );

    assert!(sessions.delete(uid).await.expect("delete"));
    assert!(sessions.delete_refresh_token(uid).await.expect("delete refresh"));
    let gone: Option<LoginUser> = sessions.get(uid).await.expect("get after delete");
    assert_eq!(gone, None);
}

#[tokio::test]
async fn test_session_malformed_value_is_parse_error() {
    let url = require_redis!();
    let sessions = store(url.clone());
    let uid = unique();

    client(url)
        .set_ex(&sessions.session_key(uid), "not json", 30)
        .await
        .expect("set raw");

    let result: myadmin::Result<Option<LoginUser>> = sessions.get(uid).await;
    assert!(matches!(result, Err(myadmin::Error::Parse { .. })));
    sessions.delete(uid).await.expect("cleanup");
}
