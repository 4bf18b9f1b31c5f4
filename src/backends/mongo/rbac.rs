//! Role and user administration.

use super::{MongoClient, array_or_empty, require};
use crate::{Error, Result};
use bson::{Bson, Document, doc};
use secrecy::{ExposeSecret, SecretString};
use tokio_util::sync::CancellationToken;

/// Actions granted by [`MongoClient::create_role`] on its collection.
///
/// Reads, writes and index maintenance; `dropCollection` is not granted.
pub const COLLECTION_ROLE_ACTIONS: [&str; 15] = [
    "listCollections",
    "createCollection",
    "convertToCapped",
    "killCursors",
    "collStats",
    "find",
    "insert",
    "remove",
    "update",
    "listIndexes",
    "createIndex",
    "dropIndex",
    "dbStats",
    "renameCollectionSameDB",
    "dbHash",
];

/// Built-in roles held by an administrative user.
pub const ADMIN_USER_ROLES: [&str; 4] = [
    "readWriteAnyDatabase",
    "dbAdminAnyDatabase",
    "clusterManager",
    "clusterMonitor",
];

fn role_refs(database: &str, roles: &[String]) -> Result<Vec<Bson>> {
    if roles.is_empty() {
        return Err(Error::InvalidInput("at least one role is required".to_string()));
    }
    roles
        .iter()
        .map(|role| {
            require(role, "role name")?;
            Ok(Bson::Document(doc! { "role": role.as_str(), "db": database }))
        })
        .collect()
}

impl MongoClient {
    /// Runs `rolesInfo` for `role` defined on `database`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for empty names.
    pub async fn roles_info(
        &self,
        database: &str,
        role: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Document>> {
        require(database, "database name")?;
        require(role, "role name")?;
        let reply = self
            .run_command(
                "admin",
                doc! { "rolesInfo": { "role": role, "db": database } },
                cancel,
            )
            .await?;
        Ok(array_or_empty(&reply, "roles"))
    }

    /// Returns true if `role` exists on `database`.
    ///
    /// # Errors
    ///
    /// See [`Self::roles_info`].
    pub async fn role_exists(
        &self,
        database: &str,
        role: &str,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        Ok(!self.roles_info(database, role, cancel).await?.is_empty())
    }

    /// Runs `usersInfo` for `user` defined on `database`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for empty names.
    pub async fn users_info(
        &self,
        database: &str,
        user: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Document>> {
        require(database, "database name")?;
        require(user, "user name")?;
        let reply = self
            .run_command(
                "admin",
                doc! { "usersInfo": { "user": user, "db": database } },
                cancel,
            )
            .await?;
        Ok(array_or_empty(&reply, "users"))
    }

    /// Returns true if `user` exists on `database`.
    ///
    /// # Errors
    ///
    /// See [`Self::users_info`].
    pub async fn user_exists(
        &self,
        database: &str,
        user: &str,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        Ok(!self.users_info(database, user, cancel).await?.is_empty())
    }

    /// Creates `role` on `database` with [`COLLECTION_ROLE_ACTIONS`] on
    /// `database.collection`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendRejected`] if the role already exists.
    pub async fn create_role(
        &self,
        database: &str,
        role: &str,
        collection: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        require(database, "database name")?;
        require(role, "role name")?;
        require(collection, "collection name")?;

        let command = doc! {
            "createRole": role,
            "privileges": [{
                "resource": { "db": database, "collection": collection },
                "actions": COLLECTION_ROLE_ACTIONS.to_vec(),
            }],
            "roles": [],
        };
        tracing::info!(instance = %self.name, database = %database, role = %role, "Creating role");
        self.run_command(database, command, cancel).await.map(|_| ())
    }

    /// Drops `role` from `database`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendRejected`] if the role does not exist.
    pub async fn drop_role(
        &self,
        database: &str,
        role: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        require(database, "database name")?;
        require(role, "role name")?;
        tracing::info!(instance = %self.name, database = %database, role = %role, "Dropping role");
        self.run_command(database, doc! { "dropRole": role }, cancel)
            .await
            .map(|_| ())
    }

    async fn create_user_on_admin(
        &self,
        user: &str,
        password: &SecretString,
        roles: &[&str],
        cancel: &CancellationToken,
    ) -> Result<()> {
        require(user, "user name")?;
        if password.expose_secret().is_empty() {
            return Err(Error::InvalidInput("password must not be empty".to_string()));
        }
        let roles: Vec<Bson> = roles
            .iter()
            .map(|role| Bson::Document(doc! { "role": *role, "db": "admin" }))
            .collect();
        let command = doc! {
            "createUser": user,
            "pwd": password.expose_secret(),
            "roles": roles,
        };
        tracing::info!(instance = %self.name, user = %user, "Creating user");
        self.run_command("admin", command, cancel).await.map(|_| ())
    }

    /// Creates `user` on `admin` with the `root` role.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty user or password.
    pub async fn create_root_user(
        &self,
        user: &str,
        password: &SecretString,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.create_user_on_admin(user, password, &["root"], cancel)
            .await
    }

    /// Creates `user` on `admin` with [`ADMIN_USER_ROLES`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty user or password.
    pub async fn create_admin_user(
        &self,
        user: &str,
        password: &SecretString,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.create_user_on_admin(user, password, &ADMIN_USER_ROLES, cancel)
            .await
    }

    /// Grants roles defined on `database` to `user` of that database.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for empty names or no roles.
    pub async fn grant_roles_to_user(
        &self,
        database: &str,
        user: &str,
        roles: &[String],
        cancel: &CancellationToken,
    ) -> Result<()> {
        require(database, "database name")?;
        require(user, "user name")?;
        let refs = role_refs(database, roles)?;
        tracing::info!(instance = %self.name, database = %database, user = %user, roles = ?roles, "Granting roles");
        self.run_command(
            database,
            doc! { "grantRolesToUser": user, "roles": refs },
            cancel,
        )
        .await
        .map(|_| ())
    }

    /// Revokes roles defined on `database` from `user` of that database.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for empty names or no roles.
    pub async fn revoke_roles_from_user(
        &self,
        database: &str,
        user: &str,
        roles: &[String],
        cancel: &CancellationToken,
    ) -> Result<()> {
        require(database, "database name")?;
        require(user, "user name")?;
        let refs = role_refs(database, roles)?;
        tracing::info!(instance = %self.name, database = %database, user = %user, roles = ?roles, "Revoking roles");
        self.run_command(
            database,
            doc! { "revokeRolesFromUser": user, "roles": refs },
            cancel,
        )
        .await
        .map(|_| ())
    }
}
