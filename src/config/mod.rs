//! Configuration management.
//!
//! The config file is TOML. Backend tables are keyed by instance name:
//!
//! ```toml
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [session]
//! enabled = true
//! ttl_secs = 86400
//!
//! [redis.default]
//! host = "127.0.0.1"
//!
//! [mongodb.shard01]
//! uri = "mongodb://root:pw@mongos:27017/?authSource=admin"
//!
//! [db.default]
//! dialect = "postgres"
//! uri = "postgresql://admin@localhost/myadmin"
//!
//! [s3.default]
//! endpoint = "rgw.local:7480"
//! access_key = "AK"
//! secret_key = "SK"
//! disable_ssl = true
//! ```

mod backends;
pub mod secret;

pub use backends::{BackendsConfig, MongoConfig, RedisConfig, S3Config, SqlConfig, SqlDialect};

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "MYADMIN_CONFIG";

/// Main configuration for myadmin.
#[derive(Debug, Clone, Default)]
pub struct AdminConfig {
    /// Logging settings.
    pub logging: LoggingSettings,
    /// Session store settings.
    pub session: SessionSettings,
    /// Backend instances by family.
    pub backends: BackendsConfig,
}

/// Logging settings from the config file.
///
/// Environment variables override these at observability initialization.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive, e.g. `info` or `myadmin=debug,warn`.
    pub level: Option<String>,
    /// Output format: `json` or `pretty`.
    pub format: Option<String>,
    /// Log file path; stderr when absent.
    #[serde(alias = "file_path")]
    pub file: Option<PathBuf>,
}

/// Session store settings.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Whether sessions are kept in Redis.
    pub enabled: bool,
    /// Redis instance that holds sessions.
    pub instance: String,
    /// Key prefix for session entries.
    pub key_prefix: String,
    /// Key prefix for refresh-token markers.
    pub refresh_prefix: String,
    /// Session lifetime in seconds; refresh markers live twice as long.
    pub ttl_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            instance: crate::DEFAULT_INSTANCE.to_string(),
            key_prefix: "myadmin_user_".to_string(),
            refresh_prefix: "refresh_token_myadmin_user_".to_string(),
            ttl_secs: 86_400,
        }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Logging section.
    pub logging: Option<LoggingSettings>,
    /// Session section.
    pub session: Option<ConfigFileSession>,
    /// Backend tables, flattened into the top level.
    #[serde(flatten)]
    pub backends: BackendsConfig,
}

/// Session section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileSession {
    /// Whether sessions are kept in Redis.
    #[serde(alias = "use_redis")]
    pub enabled: Option<bool>,
    /// Redis instance name.
    pub instance: Option<String>,
    /// Session key prefix.
    #[serde(alias = "redis_login_user_prefix")]
    pub key_prefix: Option<String>,
    /// Refresh-token key prefix.
    pub refresh_prefix: Option<String>,
    /// Session lifetime in seconds.
    #[serde(alias = "token_max_age")]
    pub ttl_secs: Option<u64>,
}

impl AdminConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        Self::from_toml(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for this schema.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;

        Ok(Self::from_config_file(file))
    }

    /// Resolves the config path from an explicit value, `MYADMIN_CONFIG`, or
    /// `./config.toml`, in that order.
    #[must_use]
    pub fn resolve_path(explicit: Option<&str>) -> PathBuf {
        explicit
            .map(PathBuf::from)
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Converts a `ConfigFile` to `AdminConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self {
            logging: file.logging.unwrap_or_default(),
            backends: file.backends,
            ..Self::default()
        };

        if let Some(session) = file.session {
            if let Some(v) = session.enabled {
                config.session.enabled = v;
            }
            if let Some(v) = session.instance {
                config.session.instance = v;
            }
            if let Some(v) = session.key_prefix.filter(|p| !p.is_empty()) {
                config.session.key_prefix = v;
            }
            if let Some(v) = session.refresh_prefix.filter(|p| !p.is_empty()) {
                config.session.refresh_prefix = v;
            }
            if let Some(v) = session.ttl_secs {
                config.session.ttl_secs = v;
            }
        }

        config
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
        [logging]
        level = "debug"
        format = "json"

        [session]
        use_redis = true
        redis_login_user_prefix = "admin_user_"
        token_max_age = 3600

        [db.default]
        dialect = "sqlite"
        database = ":memory:"

        [redis.default]
        host = "127.0.0.1"

        [redis.cache]
        uri = "redis://cache:6379/3"

        [mongodb.default]
        host = "mongos"
    "#;

    #[test]
    fn test_from_toml_reads_all_sections() {
        let config = AdminConfig::from_toml(SAMPLE).unwrap();

        assert_eq!(config.logging.level.as_deref(), Some("debug"));
        assert_eq!(config.session.key_prefix, "admin_user_");
        assert_eq!(config.session.ttl_secs, 3600);
        assert_eq!(
            config.session.refresh_prefix,
            "refresh_token_myadmin_user_"
        );

        assert_eq!(config.backends.sql["default"].dialect, SqlDialect::Sqlite);
        assert_eq!(config.backends.redis.len(), 2);
        assert_eq!(config.backends.mongo["default"].host, "mongos");
        assert!(config.backends.s3.is_empty());
    }

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = AdminConfig::from_toml("").unwrap();
        assert!(config.backends.is_empty());
        assert!(config.session.enabled);
        assert_eq!(config.session.instance, "default");
    }

    #[test]
    fn test_invalid_toml_is_operation_failure() {
        let err = AdminConfig::from_toml("[redis.default\nhost=").unwrap_err();
        assert!(matches!(err, Error::OperationFailed { ref operation, .. } if operation == "parse_config_file"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = AdminConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.backends.redis["cache"].connection_url(), "redis://cache:6379/3");
    }

    #[test]
    fn test_load_missing_file() {
        let err = AdminConfig::load_from_file(Path::new("/nonexistent/myadmin.toml")).unwrap_err();
        assert!(err.to_string().contains("read_config_file"));
    }

    #[test]
    fn test_resolve_path_prefers_explicit() {
        assert_eq!(
            AdminConfig::resolve_path(Some("/etc/myadmin.toml")),
            PathBuf::from("/etc/myadmin.toml")
        );
    }
}
