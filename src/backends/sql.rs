//! Relational client.
//!
//! PostgreSQL instances are served from a deadpool connection pool and MySQL
//! instances from a `mysql_async` pool; both connect lazily. `SQLite`
//! instances hold one connection behind a mutex and run statements on the
//! blocking pool. Results come back as text cells so that callers can render
//! arbitrary queries without knowing their schema.
//!
//! Errors the server reports (syntax, constraints, permissions) become
//! [`Error::BackendRejected`] with the server's code; a failing link becomes
//! [`Error::Transport`].

use super::bounded;
use crate::config::{SqlConfig, SqlDialect};
use crate::{Error, Result};
use deadpool_postgres::{Pool, Runtime};
use mysql_async::prelude::Queryable;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode};
use secrecy::ExposeSecret;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_postgres::{NoTls, SimpleQueryMessage};

/// Rows returned by [`SqlClient::query`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryResult {
    /// Column names in select order.
    pub columns: Vec<String>,
    /// Row cells as text; SQL `NULL` is `None`.
    pub rows: Vec<Vec<Option<String>>>,
}

#[derive(Debug)]
enum Driver {
    Postgres(Pool),
    Mysql(mysql_async::Pool),
    Sqlite(Arc<Mutex<Connection>>),
}

/// Client for one relational instance.
#[derive(Debug)]
pub struct SqlClient {
    name: String,
    driver: Driver,
    timeout: Duration,
}

fn postgres_error(operation: &str, e: &tokio_postgres::Error) -> Error {
    match e.as_db_error() {
        Some(db) => Error::BackendRejected {
            operation: operation.to_string(),
            code: Some(db.code().code().to_string()),
            message: db.message().to_string(),
        },
        None => Error::transport(operation, e),
    }
}

fn mysql_error(operation: &str, e: mysql_async::Error) -> Error {
    match e {
        mysql_async::Error::Server(server) => Error::BackendRejected {
            operation: operation.to_string(),
            code: Some(server.code.to_string()),
            message: server.message,
        },
        other => Error::transport(operation, other),
    }
}

fn sqlite_error(operation: &str, e: &rusqlite::Error) -> Error {
    match e.sqlite_error_code() {
        Some(
            ErrorCode::SystemIoFailure
            | ErrorCode::CannotOpen
            | ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::DiskFull,
        ) => Error::transport(operation, e),
        code => Error::BackendRejected {
            operation: operation.to_string(),
            code: code.map(|c| format!("{c:?}")),
            message: e.to_string(),
        },
    }
}

fn pool_error(e: impl std::fmt::Display) -> Error {
    Error::transport("sql_get_client", e)
}

fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("SQLite mutex was poisoned, recovering");
            poisoned.into_inner()
        },
    }
}

impl SqlClient {
    /// Builds a client from configuration.
    ///
    /// PostgreSQL and MySQL pools connect lazily; `SQLite` opens its file
    /// immediately.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an unsupported dialect, and an error
    /// if the configuration is unusable or the `SQLite` file cannot be opened.
    pub fn new(name: &str, config: &SqlConfig) -> Result<Self> {
        let driver = match &config.dialect {
            SqlDialect::Postgres => Driver::Postgres(Self::build_pool(config)?),
            SqlDialect::Mysql => Driver::Mysql(Self::build_mysql_pool(config)?),
            SqlDialect::Sqlite => Driver::Sqlite(Arc::new(Mutex::new(Self::open_sqlite(config)?))),
            SqlDialect::Unsupported(dialect) => {
                return Err(Error::InvalidInput(format!(
                    "unsupported sql dialect '{dialect}'"
                )));
            },
        };

        Ok(Self {
            name: name.to_string(),
            driver,
            timeout: config.query_timeout(),
        })
    }

    /// Returns the instance name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the dialect of this instance.
    #[must_use]
    pub const fn dialect(&self) -> SqlDialect {
        match self.driver {
            Driver::Postgres(_) => SqlDialect::Postgres,
            Driver::Mysql(_) => SqlDialect::Mysql,
            Driver::Sqlite(_) => SqlDialect::Sqlite,
        }
    }

    fn build_pool(config: &SqlConfig) -> Result<Pool> {
        let mut cfg = match config.uri.as_deref().filter(|u| !u.is_empty()) {
            Some(uri) => Self::pool_config_from_url(uri)?,
            None => {
                let mut cfg = deadpool_postgres::Config::new();
                cfg.host = Some(config.host.clone());
                cfg.port = Some(config.port());
                cfg.user.clone_from(&config.username);
                cfg.password = config
                    .password
                    .as_ref()
                    .map(|p| p.expose_secret().to_string());
                cfg.dbname = Some(config.database.clone()).filter(|d| !d.is_empty());
                cfg
            },
        };

        cfg.connect_timeout = Some(config.connect_timeout());
        cfg.ssl_mode = match config.sslmode.as_deref() {
            Some("disable") => Some(deadpool_postgres::SslMode::Disable),
            Some("require" | "verify-ca" | "verify-full") => {
                Some(deadpool_postgres::SslMode::Require)
            },
            Some(_) => Some(deadpool_postgres::SslMode::Prefer),
            None => None,
        };
        cfg.target_session_attrs = match config.target_session_attrs.as_deref() {
            Some("read-write") => Some(deadpool_postgres::TargetSessionAttrs::ReadWrite),
            Some(_) => Some(deadpool_postgres::TargetSessionAttrs::Any),
            None => None,
        };
        cfg.pool = Some(deadpool_postgres::PoolConfig {
            max_size: config.max_open_conns.max(1),
            timeouts: deadpool_postgres::Timeouts {
                wait: Some(config.connect_timeout()),
                create: Some(config.connect_timeout()),
                recycle: Some(config.connect_timeout()),
            },
            ..Default::default()
        });
        cfg.manager = Some(deadpool_postgres::ManagerConfig {
            recycling_method: deadpool_postgres::RecyclingMethod::Fast,
        });

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| Error::OperationFailed {
                operation: "sql_create_pool".to_string(),
                cause: e.to_string(),
            })
    }

    fn pool_config_from_url(url: &str) -> Result<deadpool_postgres::Config> {
        let parsed = url
            .parse::<tokio_postgres::Config>()
            .map_err(|e| Error::parse("postgres connection url", e))?;

        let mut cfg = deadpool_postgres::Config::new();
        cfg.host = parsed.get_hosts().first().map(|h| match h {
            tokio_postgres::config::Host::Tcp(s) => s.clone(),
            #[cfg(unix)]
            tokio_postgres::config::Host::Unix(p) => p.to_string_lossy().to_string(),
        });
        cfg.port = parsed.get_ports().first().copied();
        cfg.user = parsed.get_user().map(String::from);
        cfg.password = parsed
            .get_password()
            .map(|p| String::from_utf8_lossy(p).to_string());
        cfg.dbname = parsed.get_dbname().map(String::from);
        Ok(cfg)
    }

    fn build_mysql_pool(config: &SqlConfig) -> Result<mysql_async::Pool> {
        let opts = match config.uri.as_deref().filter(|u| !u.is_empty()) {
            Some(uri) => mysql_async::OptsBuilder::from_opts(
                mysql_async::Opts::from_url(uri)
                    .map_err(|e| Error::parse("mysql connection url", e))?,
            ),
            None => mysql_async::OptsBuilder::default()
                .ip_or_hostname(config.host.clone())
                .tcp_port(config.port())
                .user(config.username.clone())
                .pass(
                    config
                        .password
                        .as_ref()
                        .map(|p| p.expose_secret().to_string()),
                )
                .db_name(Some(config.database.clone()).filter(|d| !d.is_empty())),
        };

        let constraints = mysql_async::PoolConstraints::new(0, config.max_open_conns.max(1))
            .unwrap_or_default();
        let opts = opts.pool_opts(mysql_async::PoolOpts::default().with_constraints(constraints));
        Ok(mysql_async::Pool::new(opts))
    }

    fn open_sqlite(config: &SqlConfig) -> Result<Connection> {
        if config.database.is_empty() {
            return Err(Error::InvalidInput(
                "sqlite instances need a database path".to_string(),
            ));
        }
        let conn = if config.database == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(&config.database)
        };
        conn.map_err(|e| Error::OperationFailed {
            operation: "open_sqlite".to_string(),
            cause: e.to_string(),
        })
    }

    /// Checks that the server answers.
    ///
    /// # Errors
    ///
    /// Returns an error if no connection can be made or the ping fails.
    pub async fn ping(&self) -> Result<()> {
        self.query("SELECT 1").await.map(|_| ())
    }

    /// Executes a statement and returns the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendRejected`] if the server rejects the statement
    /// and [`Error::Transport`] on connection failure or timeout.
    pub async fn execute(&self, sql: &str) -> Result<u64> {
        tracing::debug!(instance = %self.name, "Executing SQL statement");
        match &self.driver {
            Driver::Postgres(pool) => {
                bounded("sql_execute", self.timeout, async {
                    let client = pool.get().await.map_err(pool_error)?;
                    client
                        .execute(sql, &[])
                        .await
                        .map_err(|e| postgres_error("sql_execute", &e))
                })
                .await
            },
            Driver::Mysql(pool) => {
                bounded("sql_execute", self.timeout, async {
                    let mut conn = pool
                        .get_conn()
                        .await
                        .map_err(|e| mysql_error("sql_get_client", e))?;
                    conn.query_drop(sql)
                        .await
                        .map_err(|e| mysql_error("sql_execute", e))?;
                    Ok(conn.affected_rows())
                })
                .await
            },
            Driver::Sqlite(conn) => {
                let conn = Arc::clone(conn);
                let sql = sql.to_string();
                self.run_blocking("sql_execute", move || {
                    let conn = acquire_lock(&conn);
                    conn.execute(&sql, [])
                        .map(|n| u64::try_from(n).unwrap_or(u64::MAX))
                        .map_err(|e| sqlite_error("sql_execute", &e))
                })
                .await
            },
        }
    }

    /// Runs a query and returns its rows as text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendRejected`] if the server rejects the query
    /// and [`Error::Transport`] on connection failure or timeout.
    pub async fn query(&self, sql: &str) -> Result<QueryResult> {
        tracing::debug!(instance = %self.name, "Running SQL query");
        match &self.driver {
            Driver::Postgres(pool) => {
                bounded("sql_query", self.timeout, async {
                    let client = pool.get().await.map_err(pool_error)?;
                    let messages = client
                        .simple_query(sql)
                        .await
                        .map_err(|e| postgres_error("sql_query", &e))?;
                    Ok(collect_simple_rows(&messages))
                })
                .await
            },
            Driver::Mysql(pool) => {
                bounded("sql_query", self.timeout, async {
                    let mut conn = pool
                        .get_conn()
                        .await
                        .map_err(|e| mysql_error("sql_get_client", e))?;
                    let result = conn
                        .query_iter(sql)
                        .await
                        .map_err(|e| mysql_error("sql_query", e))?;
                    let columns: Vec<String> = result
                        .columns()
                        .map(|cols| cols.iter().map(|c| c.name_str().into_owned()).collect())
                        .unwrap_or_default();
                    let rows: Vec<mysql_async::Row> = result
                        .collect_and_drop()
                        .await
                        .map_err(|e| mysql_error("sql_query", e))?;
                    Ok(QueryResult {
                        columns,
                        rows: rows.iter().map(mysql_cells).collect(),
                    })
                })
                .await
            },
            Driver::Sqlite(conn) => {
                let conn = Arc::clone(conn);
                let sql = sql.to_string();
                self.run_blocking("sql_query", move || {
                    let conn = acquire_lock(&conn);
                    query_sqlite(&conn, &sql)
                })
                .await
            },
        }
    }

    /// Lists user tables, sorted by name.
    ///
    /// # Errors
    ///
    /// See [`Self::query`].
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        let sql = match &self.driver {
            Driver::Postgres(_) => {
                "SELECT tablename FROM pg_catalog.pg_tables \
                 WHERE schemaname NOT IN ('pg_catalog', 'information_schema') \
                 ORDER BY tablename"
            },
            Driver::Mysql(_) => "SHOW TABLES",
            Driver::Sqlite(_) => {
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
                 ORDER BY name"
            },
        };

        let result = self.query(sql).await?;
        Ok(result
            .rows
            .into_iter()
            .filter_map(|row| row.into_iter().next().flatten())
            .collect())
    }

    async fn run_blocking<T, F>(&self, operation: &str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        bounded(operation, self.timeout, async {
            tokio::task::spawn_blocking(f)
                .await
                .map_err(|e| Error::OperationFailed {
                    operation: operation.to_string(),
                    cause: e.to_string(),
                })?
        })
        .await
    }
}

fn collect_simple_rows(messages: &[SimpleQueryMessage]) -> QueryResult {
    let mut result = QueryResult::default();
    for message in messages {
        if let SimpleQueryMessage::Row(row) = message {
            if result.columns.is_empty() {
                result.columns = row.columns().iter().map(|c| c.name().to_string()).collect();
            }
            result.rows.push(
                (0..row.len())
                    .map(|i| row.get(i).map(String::from))
                    .collect(),
            );
        }
    }
    result
}

fn query_sqlite(conn: &Connection, sql: &str) -> Result<QueryResult> {
    let mut stmt = conn.prepare(sql).map_err(|e| sqlite_error("sql_query", &e))?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| (*c).to_string()).collect();
    let width = columns.len();

    let mut rows = stmt.query([]).map_err(|e| sqlite_error("sql_query", &e))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(|e| sqlite_error("sql_query", &e))? {
        let mut cells = Vec::with_capacity(width);
        for i in 0..width {
            let value = row.get_ref(i).map_err(|e| Error::parse("sqlite row", e))?;
            cells.push(cell_text(value));
        }
        out.push(cells);
    }

    Ok(QueryResult { columns, rows: out })
}

fn cell_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Some(format!("<{} bytes>", b.len())),
    }
}

fn mysql_cells(row: &mysql_async::Row) -> Vec<Option<String>> {
    (0..row.len())
        .map(|i| row.as_ref(i).and_then(mysql_cell_text))
        .collect()
}

fn mysql_cell_text(value: &mysql_async::Value) -> Option<String> {
    use mysql_async::Value;
    match value {
        Value::NULL => None,
        Value::Bytes(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        Value::Int(i) => Some(i.to_string()),
        Value::UInt(u) => Some(u.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Double(d) => Some(d.to_string()),
        Value::Date(y, mo, d, h, mi, s, us) => Some(format!(
            "{y:04}-{mo:02}-{d:02} {h:02}:{mi:02}:{s:02}.{us:06}"
        )),
        Value::Time(negative, days, h, mi, s, us) => {
            let sign = if *negative { "-" } else { "" };
            Some(format!("{sign}{days}d {h:02}:{mi:02}:{s:02}.{us:06}"))
        },
    }
}
