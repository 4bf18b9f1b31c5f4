//! Command handlers module.
//!
//! One file per backend family:
//! - `status.rs`: registry status and health pings
//! - `redis.rs`: Redis topology and session commands
//! - `mongo.rs`: MongoDB replica set, sharding, index and RBAC commands
//! - `s3.rs`: bucket, object, presign and STS commands
//! - `sql.rs`: relational ping, query and execute

mod mongo;
mod redis;
mod s3;
mod sql;
mod status;

pub use mongo::{MongoAction, cmd_mongo};
pub use redis::{RedisAction, cmd_redis};
pub use s3::{S3Action, cmd_s3};
pub use sql::{SqlAction, cmd_sql};
pub use status::cmd_status;

use serde::Serialize;

/// Prints `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Splits a comma-separated list, dropping blanks.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("a, b,,c "), vec!["a", "b", "c"]);
        assert!(split_list(" , ").is_empty());
    }
}
