//! Login sessions kept in Redis.
//!
//! A session is the JSON form of the logged-in user, stored under
//! `{key_prefix}{uid}` for `ttl_secs`. Storing a session also writes a
//! refresh marker under `{refresh_prefix}{uid}` that lives twice as long, so a
//! client can still refresh shortly after its session expired.

use crate::backends::redis::RedisClient;
use crate::config::SessionSettings;
use crate::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::instrument;

/// Session storage over one Redis instance.
pub struct SessionStore {
    redis: Arc<RedisClient>,
    settings: SessionSettings,
}

impl SessionStore {
    /// Creates a store.
    #[must_use]
    pub const fn new(redis: Arc<RedisClient>, settings: SessionSettings) -> Self {
        Self { redis, settings }
    }

    /// Key holding the session of `uid`.
    #[must_use]
    pub fn session_key(&self, uid: u64) -> String {
        format!("{}{uid}", self.settings.key_prefix)
    }

    /// Key holding the refresh marker of `uid`.
    #[must_use]
    pub fn refresh_key(&self, uid: u64) -> String {
        format!("{}{uid}", self.settings.refresh_prefix)
    }

    /// Lifetime of a refresh marker in seconds.
    #[must_use]
    pub const fn refresh_ttl_secs(&self) -> u64 {
        self.settings.ttl_secs.saturating_mul(2)
    }

    /// Loads the session of `uid`; `None` when not logged in.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the stored value is not valid JSON for `T`.
    #[instrument(skip(self))]
    pub async fn get<T: DeserializeOwned>(&self, uid: u64) -> Result<Option<T>> {
        let Some(raw) = self.redis.get(&self.session_key(uid)).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| Error::parse(format!("session of user {uid}"), e))
    }

    /// Stores the session of `uid` and its refresh marker.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if `session` cannot be serialized.
    #[instrument(skip(self, session))]
    pub async fn set<T: Serialize + Sync>(&self, uid: u64, session: &T) -> Result<()> {
        let raw = serde_json::to_string(session)
            .map_err(|e| Error::parse(format!("session of user {uid}"), e))?;

        self.redis
            .set_ex(&self.refresh_key(uid), &uid.to_string(), self.refresh_ttl_secs())
            .await?;
        self.redis
            .set_ex(&self.session_key(uid), &raw, self.settings.ttl_secs)
            .await?;

        tracing::debug!(uid, ttl_secs = self.settings.ttl_secs, "Stored session");
        metrics::counter!("session_store_total", "operation" => "set").increment(1);
        Ok(())
    }

    /// Removes the session of `uid`; true if one existed.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure.
    #[instrument(skip(self))]
    pub async fn delete(&self, uid: u64) -> Result<bool> {
        let removed = self.redis.del(&self.session_key(uid)).await?;
        metrics::counter!("session_store_total", "operation" => "delete").increment(1);
        Ok(removed)
    }

    /// Reads the refresh marker of `uid`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure.
    pub async fn refresh_token(&self, uid: u64) -> Result<Option<String>> {
        self.redis.get(&self.refresh_key(uid)).await
    }

    /// Removes the refresh marker of `uid`; true if one existed.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure.
    pub async fn delete_refresh_token(&self, uid: u64) -> Result<bool> {
        self.redis.del(&self.refresh_key(uid)).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::RedisConfig;

    fn store(settings: SessionSettings) -> SessionStore {
        let redis = RedisClient::new("default", &RedisConfig::default()).unwrap();
        SessionStore::new(Arc::new(redis), settings)
    }

    #[test]
    fn test_keys_use_configured_prefixes() {
        let store = store(SessionSettings::default());
        assert_eq!(store.session_key(42), "myadmin_user_42");
        assert_eq!(store.refresh_key(42), "refresh_token_myadmin_user_42");

        let custom = self::store(SessionSettings {
            key_prefix: "ops_".to_string(),
            ..Default::default()
        });
        assert_eq!(custom.session_key(7), "ops_7");
    }

    #[test]
    fn test_refresh_marker_outlives_session() {
        let store = store(SessionSettings {
            ttl_secs: 3_600,
            ..Default::default()
        });
        assert_eq!(store.refresh_ttl_secs(), 7_200);
    }
}
