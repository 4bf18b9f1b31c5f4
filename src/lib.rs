//! # myadmin
//!
//! Named-instance registry and cluster administration for heterogeneous
//! storage backends.
//!
//! The crate owns one lazily constructed client per named backend instance
//! (SQL, Redis, MongoDB, S3-compatible object storage), issues administrative
//! commands over each backend's native protocol, and parses the loosely typed
//! replies into typed topology and health facts.
//!
//! ## Features
//!
//! - Process-wide [`Registry`] with per-instance once-only construction
//! - Redis `INFO` / `CLUSTER INFO` / `CLUSTER NODES` / `MODULE LIST` parsing
//! - MongoDB replica-set, sharding, RBAC and index-consistency administration
//! - S3 bucket/object lifecycle with confirmed deletes, presigned URLs and STS
//!
//! ## Example
//!
//! ```rust,ignore
//! use myadmin::{AdminConfig, Registry};
//!
//! let config = AdminConfig::load_from_file("config.toml".as_ref())?;
//! let registry = Registry::new(config.backends);
//! registry.setup().await;
//!
//! let redis = registry.redis(None).await?;
//! let info = redis.info().await?;
//! println!("{} connected clients", info.connected_clients);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
// Transitive duplicates from the aws-sdk and mongodb dependency trees.
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod backends;
pub mod config;
pub mod observability;
pub mod registry;
pub mod services;

// Re-exports for convenience
pub use backends::mongo::MongoClient;
pub use backends::redis::RedisClient;
pub use backends::s3::S3Client;
pub use backends::sql::SqlClient;
pub use config::{AdminConfig, BackendsConfig};
pub use registry::{BackendFamily, Client, Registry, SlotStatus};

/// Error type for myadmin operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Local validation rejects arguments before any network call |
/// | `ConfigurationMissing` | No config entry exists for the requested instance |
/// | `ConstructionFailed` | A client could not be built from its config |
/// | `Transport` | Network failure or timeout during a backend call |
/// | `BackendRejected` | The backend answered but reported failure |
/// | `Parse` | A reply did not have the expected shape |
/// | `Cancelled` | The caller cancelled an in-flight command |
/// | `OperationFailed` | Local I/O: config files, log files, transfers |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A hashed shard key has more than one field or is marked unique
    /// - A shard key has no fields
    /// - Role, user or database names are empty
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No configuration entry exists for the requested instance.
    #[error("no {family} configuration named '{name}'")]
    ConfigurationMissing {
        /// Backend family that was requested.
        family: BackendFamily,
        /// Instance name that was requested.
        name: String,
    },

    /// A client could not be constructed.
    ///
    /// The registry logs this and marks the slot unavailable; the next
    /// resolve for the same instance tries again.
    #[error("failed to construct {family} client '{name}': {cause}")]
    ConstructionFailed {
        /// Backend family of the instance.
        family: BackendFamily,
        /// Instance name.
        name: String,
        /// The underlying cause.
        cause: String,
    },

    /// Network or timeout failure while talking to a backend.
    #[error("transport failure during '{operation}': {cause}")]
    Transport {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// The backend answered but reported failure.
    ///
    /// Raised when:
    /// - A MongoDB reply carries `ok: 0`
    /// - A MongoDB command error is returned by the driver
    /// - An S3 service error is returned (access denied, bucket not empty)
    /// - A Redis server error reply is returned
    #[error("backend rejected '{operation}'{}: {message}", code_suffix(.code.as_deref()))]
    BackendRejected {
        /// The operation that was rejected.
        operation: String,
        /// Backend-specific error code, if one was reported.
        code: Option<String>,
        /// Backend-supplied message.
        message: String,
    },

    /// A reply did not match the expected shape.
    #[error("failed to parse {context}: {cause}")]
    Parse {
        /// What was being parsed.
        context: String,
        /// The underlying cause.
        cause: String,
    },

    /// The caller cancelled the operation while it was in flight.
    #[error("operation '{operation}' was cancelled")]
    Cancelled {
        /// The operation that was cancelled.
        operation: String,
    },

    /// A local operation failed.
    ///
    /// Raised when:
    /// - The config file cannot be read or parsed
    /// - The log file cannot be opened
    /// - A local file cannot be read or written during an S3 transfer
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Builds a [`Error::Parse`] from any displayable cause.
    pub fn parse(context: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Parse {
            context: context.into(),
            cause: cause.to_string(),
        }
    }

    /// Builds a [`Error::Transport`] from any displayable cause.
    pub fn transport(operation: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Transport {
            operation: operation.into(),
            cause: cause.to_string(),
        }
    }

    /// Returns true if the backend itself reported the failure.
    #[must_use]
    pub const fn is_backend_rejection(&self) -> bool {
        matches!(self, Self::BackendRejected { .. })
    }
}

fn code_suffix(code: Option<&str>) -> String {
    code.map(|c| format!(" ({c})")).unwrap_or_default()
}

/// Result type alias for myadmin operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Instance name used when a caller does not specify one.
pub const DEFAULT_INSTANCE: &str = "default";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("hashed shard keys must be single-field".to_string());
        assert_eq!(
            err.to_string(),
            "invalid input: hashed shard keys must be single-field"
        );

        let err = Error::ConfigurationMissing {
            family: BackendFamily::Redis,
            name: "cache".to_string(),
        };
        assert_eq!(err.to_string(), "no redis configuration named 'cache'");

        let err = Error::BackendRejected {
            operation: "mongo_add_shard".to_string(),
            code: Some("96".to_string()),
            message: "operation failed".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "backend rejected 'mongo_add_shard' (96): operation failed"
        );

        let err = Error::BackendRejected {
            operation: "s3_delete_bucket".to_string(),
            code: None,
            message: "bucket not empty".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "backend rejected 's3_delete_bucket': bucket not empty"
        );
    }

    #[test]
    fn test_error_helpers() {
        let err = Error::parse("redis INFO", "invalid digit found in string");
        assert!(matches!(err, Error::Parse { .. }));
        assert!(!err.is_backend_rejection());

        let err = Error::transport("redis_ping", "connection refused");
        assert_eq!(
            err.to_string(),
            "transport failure during 'redis_ping': connection refused"
        );
    }
}
