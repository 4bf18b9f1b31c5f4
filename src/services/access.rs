//! MongoDB access control flows.

use crate::backends::mongo::{MongoClient, require};
use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// What [`AccessService::grant_collection_access`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GrantOutcome {
    /// The role did not exist and was created.
    pub role_created: bool,
}

/// Privilege of a bootstrap account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountKind {
    /// `root` on `admin`.
    Root,
    /// Cluster and any-database administration without `root`.
    Admin,
}

/// Role and user administration over one deployment.
pub struct AccessService {
    mongo: Arc<MongoClient>,
}

impl AccessService {
    /// Creates a service for `mongo`.
    #[must_use]
    pub const fn new(mongo: Arc<MongoClient>) -> Self {
        Self { mongo }
    }

    /// Gives `user` of `database` the collection role `role`, creating the
    /// role on `database.collection` first if needed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] for empty names.
    #[instrument(skip(self, cancel), fields(instance = %self.mongo.name()))]
    pub async fn grant_collection_access(
        &self,
        database: &str,
        collection: &str,
        user: &str,
        role: &str,
        cancel: &CancellationToken,
    ) -> Result<GrantOutcome> {
        require(database, "database name")?;
        require(collection, "collection name")?;
        require(user, "user name")?;
        require(role, "role name")?;

        let role_created = if self.mongo.role_exists(database, role, cancel).await? {
            false
        } else {
            self.mongo
                .create_role(database, role, collection, cancel)
                .await?;
            true
        };

        self.mongo
            .grant_roles_to_user(database, user, &[role.to_string()], cancel)
            .await?;
        tracing::info!(database = %database, user = %user, role = %role, role_created, "Granted collection access");
        Ok(GrantOutcome { role_created })
    }

    /// Takes `role` away from `user` and drops the role when `drop_role` is set.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] for empty names, or an error if
    /// the revoke or drop is rejected.
    #[instrument(skip(self, cancel), fields(instance = %self.mongo.name()))]
    pub async fn revoke_collection_access(
        &self,
        database: &str,
        user: &str,
        role: &str,
        drop_role: bool,
        cancel: &CancellationToken,
    ) -> Result<()> {
        require(database, "database name")?;
        require(user, "user name")?;
        require(role, "role name")?;

        self.mongo
            .revoke_roles_from_user(database, user, &[role.to_string()], cancel)
            .await?;
        if drop_role {
            self.mongo.drop_role(database, role, cancel).await?;
        }
        Ok(())
    }

    /// Creates a bootstrap account on `admin` unless it already exists.
    ///
    /// Returns true if the account was created.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] for an empty user or password.
    #[instrument(skip(self, password, cancel), fields(instance = %self.mongo.name()))]
    pub async fn ensure_account(
        &self,
        kind: AccountKind,
        user: &str,
        password: &SecretString,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        require(user, "user name")?;
        if password.expose_secret().is_empty() {
            return Err(Error::InvalidInput("password must not be empty".to_string()));
        }

        if self.mongo.user_exists("admin", user, cancel).await? {
            tracing::debug!(user = %user, "Account already exists");
            return Ok(false);
        }
        match kind {
            AccountKind::Root => self.mongo.create_root_user(user, password, cancel).await?,
            AccountKind::Admin => self.mongo.create_admin_user(user, password, cancel).await?,
        }
        Ok(true)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::MongoConfig;

    async fn unreachable_service() -> AccessService {
        let config = MongoConfig {
            uri: Some("mongodb://127.0.0.1:1".to_string()),
            server_selection_timeout_ms: 100,
            ..Default::default()
        };
        AccessService::new(Arc::new(
            MongoClient::connect("default", &config).await.unwrap(),
        ))
    }

    #[tokio::test]
    async fn test_grant_rejects_empty_names_before_any_round_trip() {
        let access = unreachable_service().await;
        let cancel = CancellationToken::new();

        for (db, coll, user, role) in [
            ("", "orders", "app", "orders_rw"),
            ("shop", " ", "app", "orders_rw"),
            ("shop", "orders", "", "orders_rw"),
            ("shop", "orders", "app", ""),
        ] {
            let err = access
                .grant_collection_access(db, coll, user, role, &cancel)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "unexpected error: {err}");
        }
    }

    #[tokio::test]
    async fn test_grant_against_unreachable_deployment_is_transport() {
        let access = unreachable_service().await;
        let err = access
            .grant_collection_access("shop", "orders", "app", "orders_rw", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport { .. }), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_revoke_rejects_empty_role() {
        let access = unreachable_service().await;
        let err = access
            .revoke_collection_access("shop", "app", "", true, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_ensure_account_validates_credentials() {
        let access = unreachable_service().await;
        let cancel = CancellationToken::new();

        let err = access
            .ensure_account(AccountKind::Root, "root", &SecretString::from(String::new()), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let err = access
            .ensure_account(AccountKind::Admin, "", &SecretString::from("pw".to_string()), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let err = access
            .ensure_account(AccountKind::Admin, "ops", &SecretString::from("pw".to_string()), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport { .. }), "unexpected error: {err}");
    }
}
