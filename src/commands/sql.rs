//! SQL commands.

use super::print_json;
use clap::Subcommand;
use myadmin::Registry;
use serde_json::json;

/// SQL subcommands.
#[derive(Subcommand)]
pub enum SqlAction {
    /// Check connectivity.
    Ping,
    /// List tables.
    Tables,
    /// Run a query and print its rows.
    Query {
        /// SQL text.
        sql: String,
    },
    /// Run a statement and print the affected row count.
    Execute {
        /// SQL text.
        sql: String,
    },
}

/// Runs an SQL subcommand against `instance`.
pub async fn cmd_sql(
    registry: &Registry,
    instance: Option<&str>,
    action: SqlAction,
) -> anyhow::Result<()> {
    let sql = registry.sql(instance).await?;

    match action {
        SqlAction::Ping => {
            sql.ping().await?;
            print_json(&json!({ "instance": sql.name(), "reachable": true }))
        },
        SqlAction::Tables => print_json(&sql.list_tables().await?),
        SqlAction::Query { sql: text } => print_json(&sql.query(&text).await?),
        SqlAction::Execute { sql: text } => {
            let affected = sql.execute(&text).await?;
            print_json(&json!({ "rows_affected": affected }))
        },
    }
}
