//! Named-instance resource registry.
//!
//! The registry owns one lazily constructed client per configured
//! `(family, name)` pair. Callers receive `Arc` handles per call.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized ──resolve ok──▶ Ready (never replaced)
//!       │
//!       └──resolve err──▶ Unavailable { reason } ──resolve──▶ retry
//! ```
//!
//! Construction failures are absorbed: they are logged, counted, recorded on
//! the slot and returned to the caller as [`Error::ConstructionFailed`]. No
//! failure is cached; every resolve of an unavailable slot tries again.

mod slots;

use crate::backends::mongo::MongoClient;
use crate::backends::redis::RedisClient;
use crate::backends::s3::S3Client;
use crate::backends::sql::SqlClient;
use crate::config::BackendsConfig;
use crate::{DEFAULT_INSTANCE, Error, Result};
use serde::Serialize;
use slots::Slots;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Backend family of a named instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendFamily {
    /// Relational database.
    Sql,
    /// Redis server or cluster.
    Redis,
    /// MongoDB deployment.
    Mongo,
    /// S3-compatible object store.
    S3,
}

impl BackendFamily {
    /// All families, in setup order.
    pub const ALL: [Self; 4] = [Self::Sql, Self::Redis, Self::Mongo, Self::S3];

    /// Returns the lowercase family name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sql => "sql",
            Self::Redis => "redis",
            Self::Mongo => "mongo",
            Self::S3 => "s3",
        }
    }
}

impl fmt::Display for BackendFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendFamily {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sql" | "db" => Ok(Self::Sql),
            "redis" => Ok(Self::Redis),
            "mongo" | "mongodb" => Ok(Self::Mongo),
            "s3" => Ok(Self::S3),
            other => Err(Error::InvalidInput(format!("unknown backend family: {other}"))),
        }
    }
}

/// State of one named instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SlotStatus {
    /// Configured but never resolved.
    Uninitialized,
    /// A live client exists.
    Ready,
    /// The last construction attempt failed.
    Unavailable {
        /// Why construction failed.
        reason: String,
    },
}

impl SlotStatus {
    /// Returns true if a live client exists.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Status of one configured instance, for health tooling.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceStatus {
    /// Backend family.
    pub family: BackendFamily,
    /// Instance name.
    pub name: String,
    /// Slot state.
    #[serde(flatten)]
    pub status: SlotStatus,
}

/// Outcome of eager [`Registry::setup`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SetupSummary {
    /// Instances with a live client.
    pub ready: usize,
    /// Instances whose construction failed.
    pub unavailable: usize,
}

/// A resolved client of any family.
#[derive(Clone)]
pub enum Client {
    /// Relational client.
    Sql(Arc<SqlClient>),
    /// Redis client.
    Redis(Arc<RedisClient>),
    /// MongoDB client.
    Mongo(Arc<MongoClient>),
    /// S3 client.
    S3(Arc<S3Client>),
}

impl Client {
    /// Returns the family of this client.
    #[must_use]
    pub const fn family(&self) -> BackendFamily {
        match self {
            Self::Sql(_) => BackendFamily::Sql,
            Self::Redis(_) => BackendFamily::Redis,
            Self::Mongo(_) => BackendFamily::Mongo,
            Self::S3(_) => BackendFamily::S3,
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Client").field(&self.family()).finish()
    }
}

/// Registry of named backend clients.
///
/// # Example
///
/// ```rust,ignore
/// let registry = Registry::new(config.backends);
/// let mongo = registry.mongo(Some("shard01")).await?;
/// let status = mongo.repl_set_status(&CancellationToken::new()).await?;
/// ```
pub struct Registry {
    config: BackendsConfig,
    sql: Slots<SqlClient>,
    redis: Slots<RedisClient>,
    mongo: Slots<MongoClient>,
    s3: Slots<S3Client>,
}

impl Registry {
    /// Creates a registry over the given backend configuration.
    ///
    /// Nothing is constructed until the first resolve or [`Self::setup`].
    #[must_use]
    pub fn new(config: BackendsConfig) -> Self {
        Self {
            config,
            sql: Slots::new(BackendFamily::Sql),
            redis: Slots::new(BackendFamily::Redis),
            mongo: Slots::new(BackendFamily::Mongo),
            s3: Slots::new(BackendFamily::S3),
        }
    }

    /// Returns the backend configuration.
    #[must_use]
    pub const fn config(&self) -> &BackendsConfig {
        &self.config
    }

    /// Resolves a client of any family.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationMissing`] if `name` is not configured for
    /// `family`, or [`Error::ConstructionFailed`] if the client cannot be built.
    pub async fn resolve(&self, family: BackendFamily, name: Option<&str>) -> Result<Client> {
        Ok(match family {
            BackendFamily::Sql => Client::Sql(self.sql(name).await?),
            BackendFamily::Redis => Client::Redis(self.redis(name).await?),
            BackendFamily::Mongo => Client::Mongo(self.mongo(name).await?),
            BackendFamily::S3 => Client::S3(self.s3(name).await?),
        })
    }

    /// Resolves a relational client; `None` means `"default"`.
    ///
    /// # Errors
    ///
    /// See [`Self::resolve`].
    pub async fn sql(&self, name: Option<&str>) -> Result<Arc<SqlClient>> {
        let name = name.unwrap_or(DEFAULT_INSTANCE);
        let config = lookup(&self.config.sql, BackendFamily::Sql, name)?;
        self.sql
            .get_or_init(name, || async { SqlClient::new(name, config) })
            .await
    }

    /// Resolves a Redis client; `None` means `"default"`.
    ///
    /// # Errors
    ///
    /// See [`Self::resolve`].
    pub async fn redis(&self, name: Option<&str>) -> Result<Arc<RedisClient>> {
        let name = name.unwrap_or(DEFAULT_INSTANCE);
        let config = lookup(&self.config.redis, BackendFamily::Redis, name)?;
        self.redis
            .get_or_init(name, || async { RedisClient::new(name, config) })
            .await
    }

    /// Resolves a MongoDB client; `None` means `"default"`.
    ///
    /// # Errors
    ///
    /// See [`Self::resolve`].
    pub async fn mongo(&self, name: Option<&str>) -> Result<Arc<MongoClient>> {
        let name = name.unwrap_or(DEFAULT_INSTANCE);
        let config = lookup(&self.config.mongo, BackendFamily::Mongo, name)?;
        self.mongo
            .get_or_init(name, || MongoClient::connect(name, config))
            .await
    }

    /// Resolves an S3 client; `None` means `"default"`.
    ///
    /// # Errors
    ///
    /// See [`Self::resolve`].
    pub async fn s3(&self, name: Option<&str>) -> Result<Arc<S3Client>> {
        let name = name.unwrap_or(DEFAULT_INSTANCE);
        let config = lookup(&self.config.s3, BackendFamily::S3, name)?;
        self.s3
            .get_or_init(name, || async { Ok(S3Client::new(name, config)) })
            .await
    }

    /// Eagerly constructs every configured instance of every family.
    ///
    /// Failures are logged and recorded on their slots; startup proceeds.
    pub async fn setup(&self) -> SetupSummary {
        let mut summary = SetupSummary::default();

        for (family, name) in self.configured() {
            match self.resolve(family, Some(&name)).await {
                Ok(_) => summary.ready += 1,
                Err(_) => summary.unavailable += 1,
            }
        }

        tracing::info!(
            ready = summary.ready,
            unavailable = summary.unavailable,
            "Registry setup complete"
        );
        summary
    }

    /// Lists every configured instance with its slot state.
    #[must_use]
    pub fn status(&self) -> Vec<InstanceStatus> {
        self.configured()
            .into_iter()
            .map(|(family, name)| {
                let status = self.slot_status(family, &name);
                InstanceStatus {
                    family,
                    name,
                    status,
                }
            })
            .collect()
    }

    /// Returns the slot state of one instance without constructing it.
    #[must_use]
    pub fn slot_status(&self, family: BackendFamily, name: &str) -> SlotStatus {
        match family {
            BackendFamily::Sql => self.sql.status(name),
            BackendFamily::Redis => self.redis.status(name),
            BackendFamily::Mongo => self.mongo.status(name),
            BackendFamily::S3 => self.s3.status(name),
        }
    }

    /// Returns true if a slot exists for the instance, live or not.
    #[must_use]
    pub fn has_slot(&self, family: BackendFamily, name: &str) -> bool {
        match family {
            BackendFamily::Sql => self.sql.contains(name),
            BackendFamily::Redis => self.redis.contains(name),
            BackendFamily::Mongo => self.mongo.contains(name),
            BackendFamily::S3 => self.s3.contains(name),
        }
    }

    fn configured(&self) -> Vec<(BackendFamily, String)> {
        let names = |family: BackendFamily| -> Vec<String> {
            match family {
                BackendFamily::Sql => self.config.sql.keys().cloned().collect(),
                BackendFamily::Redis => self.config.redis.keys().cloned().collect(),
                BackendFamily::Mongo => self.config.mongo.keys().cloned().collect(),
                BackendFamily::S3 => self.config.s3.keys().cloned().collect(),
            }
        };

        BackendFamily::ALL
            .into_iter()
            .flat_map(|family| names(family).into_iter().map(move |name| (family, name)))
            .collect()
    }
}

fn lookup<'a, T>(
    map: &'a std::collections::BTreeMap<String, T>,
    family: BackendFamily,
    name: &str,
) -> Result<&'a T> {
    map.get(name).ok_or_else(|| {
        tracing::warn!(family = %family, name = %name, "No configuration for backend instance");
        Error::ConfigurationMissing {
            family,
            name: name.to_string(),
        }
    })
}
