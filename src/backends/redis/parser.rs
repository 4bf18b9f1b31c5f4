//! Pure parsers for Redis administrative replies.
//!
//! `INFO` and `CLUSTER INFO` replies are `\r\n` separated `key:value` lines.
//! Lines without a `:` (section headers, blanks) are skipped and unknown keys
//! are ignored. Numeric fields are parsed strictly: one malformed value fails
//! the whole reply.

use super::types::{
    ClusterNode, DatabaseInfo, NodeRole, NodeStatus, RedisClusterInfo, RedisInfo, RedisModule,
    SlaveInfo,
};
use crate::{Error, Result};
use ::redis::Value;
use std::fmt::Display;
use std::str::FromStr;

/// Iterates the `key:value` lines of a reply, trimmed.
fn fields(raw: &str) -> impl Iterator<Item = (&str, &str)> {
    raw.lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim(), value.trim()))
}

fn number<T>(context: &str, key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse::<T>()
        .map_err(|e| Error::parse(format!("{context} field '{key}' = '{value}'"), e))
}

fn flag(context: &str, key: &str, value: &str) -> Result<bool> {
    match value {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(Error::parse(
            format!("{context} field '{key}'"),
            format!("expected 0 or 1, got '{other}'"),
        )),
    }
}

/// Returns true for `prefix` followed by one or more ASCII digits.
fn numbered_key(key: &str, prefix: &str) -> bool {
    key.strip_prefix(prefix)
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}

/// Splits `a=1,b=2` into pairs; pieces without `=` are skipped.
fn sub_pairs(value: &str) -> impl Iterator<Item = (&str, &str)> {
    value
        .split(',')
        .filter_map(|piece| piece.split_once('='))
        .map(|(k, v)| (k.trim(), v.trim()))
}

fn parse_slave(value: &str) -> Result<SlaveInfo> {
    const CTX: &str = "redis INFO slave";
    let mut slave = SlaveInfo::default();
    for (key, v) in sub_pairs(value) {
        match key {
            "ip" => slave.ip = v.to_string(),
            "port" => slave.port = number(CTX, key, v)?,
            "state" => slave.state = v.to_string(),
            "offset" => slave.offset = number(CTX, key, v)?,
            "lag" => slave.lag = number(CTX, key, v)?,
            _ => {},
        }
    }
    Ok(slave)
}

fn parse_database(db_name: &str, value: &str) -> Result<DatabaseInfo> {
    const CTX: &str = "redis INFO keyspace";
    let mut db = DatabaseInfo {
        db_name: db_name.to_string(),
        ..DatabaseInfo::default()
    };
    for (key, v) in sub_pairs(value) {
        match key {
            "keys" => db.keys = number(CTX, key, v)?,
            "expires" => db.expires = number(CTX, key, v)?,
            "avg_ttl" => db.avg_ttl = number(CTX, key, v)?,
            _ => {},
        }
    }
    Ok(db)
}

/// Parses an `INFO` reply.
///
/// # Errors
///
/// Returns [`Error::Parse`] if any recognized numeric or flag field is
/// malformed.
pub fn parse_info(raw: &str) -> Result<RedisInfo> {
    const CTX: &str = "redis INFO";
    let mut info = RedisInfo::default();

    for (key, value) in fields(raw) {
        match key {
            "redis_version" => info.redis_version = value.to_string(),
            "uptime_in_seconds" => info.uptime_in_seconds = number(CTX, key, value)?,
            "used_memory" => info.used_memory = number(CTX, key, value)?,
            "maxmemory" => info.maxmemory = number(CTX, key, value)?,
            "maxmemory_policy" => info.maxmemory_policy = value.to_string(),
            "mem_replication_backlog" => info.mem_replication_backlog = number(CTX, key, value)?,
            "mem_fragmentation_ratio" => info.mem_fragmentation_ratio = number(CTX, key, value)?,
            "aof_enabled" => info.aof_enabled = flag(CTX, key, value)?,
            "total_connections_received" => {
                info.total_connections_received = number(CTX, key, value)?;
            },
            "total_commands_processed" => {
                info.total_commands_processed = number(CTX, key, value)?;
            },
            "instantaneous_ops_per_sec" => {
                info.instantaneous_ops_per_sec = number(CTX, key, value)?;
            },
            "total_net_input_bytes" => info.total_net_input_bytes = number(CTX, key, value)?,
            "total_net_output_bytes" => info.total_net_output_bytes = number(CTX, key, value)?,
            "instantaneous_input_kbps" => {
                info.instantaneous_input_kbps = number(CTX, key, value)?;
            },
            "instantaneous_output_kbps" => {
                info.instantaneous_output_kbps = number(CTX, key, value)?;
            },
            "connected_clients" => info.connected_clients = number(CTX, key, value)?,
            "rejected_connections" => info.rejected_connections = number(CTX, key, value)?,
            "expired_keys" => info.expired_keys = number(CTX, key, value)?,
            "evicted_keys" => info.evicted_keys = number(CTX, key, value)?,
            "keyspace_hits" => info.keyspace_hits = number(CTX, key, value)?,
            "keyspace_misses" => info.keyspace_misses = number(CTX, key, value)?,
            "role" => info.role = value.to_string(),
            "used_cpu_sys" => info.used_cpu_sys = number(CTX, key, value)?,
            "used_cpu_user" => info.used_cpu_user = number(CTX, key, value)?,
            "used_cpu_sys_children" => info.used_cpu_sys_children = number(CTX, key, value)?,
            "used_cpu_user_children" => info.used_cpu_user_children = number(CTX, key, value)?,
            "cluster_enabled" => info.cluster_enabled = flag(CTX, key, value)?,
            k if numbered_key(k, "slave") => info.slaves.push(parse_slave(value)?),
            k if numbered_key(k, "db") => info.databases.push(parse_database(k, value)?),
            _ => {},
        }
    }

    Ok(info)
}

/// Parses a `CLUSTER INFO` reply.
///
/// # Errors
///
/// Returns [`Error::Parse`] if any recognized numeric field is malformed.
pub fn parse_cluster_info(raw: &str) -> Result<RedisClusterInfo> {
    const CTX: &str = "redis CLUSTER INFO";
    let mut info = RedisClusterInfo::default();

    for (key, value) in fields(raw) {
        match key {
            "cluster_state" => info.cluster_state = value.to_string(),
            "cluster_slots_assigned" => info.cluster_slots_assigned = number(CTX, key, value)?,
            "cluster_slots_ok" => info.cluster_slots_ok = number(CTX, key, value)?,
            "cluster_slots_pfail" => info.cluster_slots_pfail = number(CTX, key, value)?,
            "cluster_slots_fail" => info.cluster_slots_fail = number(CTX, key, value)?,
            "cluster_known_nodes" => info.cluster_known_nodes = number(CTX, key, value)?,
            "cluster_size" => info.cluster_size = number(CTX, key, value)?,
            "cluster_current_epoch" => info.cluster_current_epoch = number(CTX, key, value)?,
            "cluster_my_epoch" => info.cluster_my_epoch = number(CTX, key, value)?,
            _ => {},
        }
    }

    Ok(info)
}

/// Parses a `CLUSTER NODES` reply, preserving line order.
///
/// # Errors
///
/// Returns [`Error::Parse`] for a line with fewer than eight fields or an
/// address without a numeric port.
pub fn parse_cluster_nodes(raw: &str) -> Result<Vec<ClusterNode>> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(parse_cluster_node)
        .collect()
}

fn parse_cluster_node(line: &str) -> Result<ClusterNode> {
    const CTX: &str = "redis CLUSTER NODES";
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 8 {
        return Err(Error::parse(
            CTX,
            format!("expected at least 8 fields, got {}: '{line}'", parts.len()),
        ));
    }

    let (endpoint, bus) = match parts[1].split_once('@') {
        Some((endpoint, bus)) => (endpoint, Some(bus)),
        None => (parts[1], None),
    };
    let (host, port) = endpoint
        .rsplit_once(':')
        .ok_or_else(|| Error::parse(CTX, format!("address without port: '{}'", parts[1])))?;
    let port = number(CTX, "port", port)?;
    // Redis 7 appends `,hostname` after the bus port.
    let cluster_port = bus
        .map(|b| b.split(',').next().unwrap_or(b))
        .map(|b| number(CTX, "cport", b))
        .transpose()?;

    let flags = parts[2];
    let role = if flags.contains("slave") {
        NodeRole::Slave
    } else {
        NodeRole::Master
    };
    let status = if flags.contains("fail") {
        NodeStatus::Fail
    } else {
        NodeStatus::Online
    };

    Ok(ClusterNode {
        id: parts[0].to_string(),
        host: host.to_string(),
        port,
        cluster_port,
        flags: flags.to_string(),
        role,
        status,
        master_id: Some(parts[3]).filter(|m| *m != "-").map(String::from),
        link_state: parts[7].to_string(),
        slots: parts[8..].iter().map(|s| (*s).to_string()).collect(),
    })
}

/// Parses `INFO keyspace` into numeric database indexes.
///
/// # Errors
///
/// Returns [`Error::Parse`] if a keyspace line is malformed.
pub fn parse_db_list(raw: &str) -> Result<Vec<u32>> {
    parse_info(raw)?
        .databases
        .iter()
        .map(|db| {
            let index = db.db_name.strip_prefix("db").unwrap_or(&db.db_name);
            number("redis INFO keyspace", "db", index)
        })
        .collect()
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::BulkString(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        Value::SimpleString(s) => Some(s.clone()),
        Value::VerbatimString { text, .. } => Some(text.clone()),
        Value::Int(i) => Some(i.to_string()),
        _ => None,
    }
}

fn value_int(value: &Value) -> Option<i64> {
    match value {
        Value::Int(i) => Some(*i),
        other => value_text(other).and_then(|s| s.parse().ok()),
    }
}

fn module_pairs(entry: &Value) -> Result<Vec<(String, &Value)>> {
    const CTX: &str = "redis MODULE LIST entry";
    match entry {
        Value::Array(items) => {
            if items.len() % 2 != 0 {
                return Err(Error::parse(CTX, "odd number of name/value items"));
            }
            items
                .chunks_exact(2)
                .map(|pair| {
                    value_text(&pair[0])
                        .map(|k| (k, &pair[1]))
                        .ok_or_else(|| Error::parse(CTX, "non-string field name"))
                })
                .collect()
        },
        Value::Map(pairs) => pairs
            .iter()
            .map(|(k, v)| {
                value_text(k)
                    .map(|k| (k, v))
                    .ok_or_else(|| Error::parse(CTX, "non-string field name"))
            })
            .collect(),
        other => Err(Error::parse(CTX, format!("unexpected reply {other:?}"))),
    }
}

/// Parses a `MODULE LIST` reply (RESP2 arrays or RESP3 maps).
///
/// # Errors
///
/// Returns [`Error::Parse`] if the reply is not a list of modules or a
/// module has no name.
pub fn parse_module_list(value: &Value) -> Result<Vec<RedisModule>> {
    let entries = match value {
        Value::Array(entries) | Value::Set(entries) => entries,
        Value::Nil => return Ok(Vec::new()),
        other => {
            return Err(Error::parse(
                "redis MODULE LIST",
                format!("expected an array, got {other:?}"),
            ));
        },
    };

    entries
        .iter()
        .map(|entry| {
            let mut name = None;
            let mut version = 0;
            for (key, v) in module_pairs(entry)? {
                match key.as_str() {
                    "name" => name = value_text(v),
                    "ver" => version = value_int(v).unwrap_or_default(),
                    _ => {},
                }
            }
            name.filter(|n| !n.is_empty())
                .map(|name| RedisModule { name, version })
                .ok_or_else(|| Error::parse("redis MODULE LIST entry", "module without a name"))
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const INFO_REPLY: &str = "# Server\r\n\
        redis_version:7.2.4\r\n\
        uptime_in_seconds:3600\r\n\
        \r\n\
        # Clients\r\n\
        connected_clients:12\r\n\
        # Memory\r\n\
        used_memory:1048576\r\n\
        maxmemory:0\r\n\
        maxmemory_policy:noeviction\r\n\
        mem_fragmentation_ratio:1.25\r\n\
        # Persistence\r\n\
        aof_enabled:1\r\n\
        # Stats\r\n\
        keyspace_hits:40\r\n\
        keyspace_misses:2\r\n\
        instantaneous_input_kbps:0.12\r\n\
        some_future_field:whatever\r\n\
        # Replication\r\n\
        role:master\r\n\
        connected_slaves:2\r\n\
        slave0:ip=10.0.0.2,port=6380,state=online,offset=1024,lag=0\r\n\
        slave1:ip=10.0.0.3,port=6381,state=wait_bgsave,offset=0,lag=1\r\n\
        # CPU\r\n\
        used_cpu_sys:1.5\r\n\
        # Cluster\r\n\
        cluster_enabled:0\r\n\
        # Keyspace\r\n\
        db0:keys=5,expires=2,avg_ttl=100\r\n";

    #[test]
    fn test_parse_info_slaves_and_databases() {
        let info = parse_info(INFO_REPLY).unwrap();

        assert_eq!(info.redis_version, "7.2.4");
        assert_eq!(info.connected_clients, 12);
        assert!(info.aof_enabled);
        assert!(!info.cluster_enabled);
        assert_eq!(info.role, "master");
        assert!((info.mem_fragmentation_ratio - 1.25).abs() < f64::EPSILON);

        assert_eq!(info.slaves.len(), 2);
        assert_eq!(info.slaves[0].ip, "10.0.0.2");
        assert_eq!(info.slaves[0].port, 6380);
        assert_eq!(info.slaves[1].ip, "10.0.0.3");
        assert_eq!(info.slaves[1].state, "wait_bgsave");

        assert_eq!(
            info.databases,
            vec![DatabaseInfo {
                db_name: "db0".to_string(),
                keys: 5,
                expires: 2,
                avg_ttl: 100,
            }]
        );
    }

    #[test]
    fn test_parse_info_is_idempotent() {
        assert_eq!(parse_info(INFO_REPLY).unwrap(), parse_info(INFO_REPLY).unwrap());
    }

    #[test]
    fn test_parse_info_malformed_number_fails_whole_reply() {
        let raw = "redis_version:7.0.0\r\nused_memory:12abc\r\nrole:master\r\n";
        let err = parse_info(raw).unwrap_err();
        assert!(matches!(err, Error::Parse { ref context, .. } if context.contains("used_memory")));

        let raw = "db0:keys=five,expires=0,avg_ttl=0\r\n";
        assert!(matches!(parse_info(raw), Err(Error::Parse { .. })));

        let raw = "aof_enabled:yes\r\n";
        assert!(matches!(parse_info(raw), Err(Error::Parse { .. })));
    }

    #[test]
    fn test_numbered_key() {
        assert!(numbered_key("slave0", "slave"));
        assert!(numbered_key("db15", "db"));
        assert!(!numbered_key("slave", "slave"));
        assert!(!numbered_key("slave_repl_offset", "slave"));
        assert!(!numbered_key("dbfilename", "db"));
    }

    #[test]
    fn test_parse_cluster_info() {
        let raw = "cluster_state:ok\r\ncluster_slots_assigned:16384\r\ncluster_slots_ok:16384\r\n\
                   cluster_slots_pfail:0\r\ncluster_slots_fail:0\r\ncluster_known_nodes:6\r\n\
                   cluster_size:3\r\ncluster_current_epoch:6\r\ncluster_my_epoch:2\r\n\
                   cluster_stats_messages_sent:1483972\r\n";
        let info = parse_cluster_info(raw).unwrap();
        assert_eq!(info.cluster_state, "ok");
        assert_eq!(info.cluster_slots_assigned, 16384);
        assert_eq!(info.cluster_known_nodes, 6);
        assert_eq!(info.cluster_size, 3);
        assert_eq!(info.cluster_my_epoch, 2);

        assert!(parse_cluster_info("cluster_size:three\r\n").is_err());
    }

    const NODES_REPLY: &str = "\
07c37dfeb235213a872192d90877d0cd55635b91 127.0.0.1:30004@31004 slave,fail e7d1eecce10fd6bb5eb35b9f99a514335d9ba9ca 0 1426238317239 4 disconnected
67ed2db8d677e59ec4a4cefb06858cf2a1a89fa1 127.0.0.1:30002@31002 master - 0 1426238316232 2 connected 5461-10922
e7d1eecce10fd6bb5eb35b9f99a514335d9ba9ca 127.0.0.1:30001@31001,node-1.local myself,master - 0 0 1 connected 0-5460
";

    #[test]
    fn test_parse_cluster_nodes_classification() {
        let nodes = parse_cluster_nodes(NODES_REPLY).unwrap();
        assert_eq!(nodes.len(), 3);

        let replica = &nodes[0];
        assert_eq!(replica.role, NodeRole::Slave);
        assert_eq!(replica.status, NodeStatus::Fail);
        assert_eq!(
            replica.master_id.as_deref(),
            Some("e7d1eecce10fd6bb5eb35b9f99a514335d9ba9ca")
        );
        assert_eq!(replica.link_state, "disconnected");
        assert_eq!(replica.port, 30004);
        assert_eq!(replica.cluster_port, Some(31004));

        let myself = &nodes[2];
        assert_eq!(myself.role, NodeRole::Master);
        assert_eq!(myself.status, NodeStatus::Online);
        assert_eq!(myself.host, "127.0.0.1");
        assert_eq!(myself.cluster_port, Some(31001));
        assert!(myself.master_id.is_none());
        assert_eq!(myself.slots, vec!["0-5460"]);
    }

    #[test]
    fn test_parse_cluster_nodes_rejects_short_or_bad_lines() {
        assert!(parse_cluster_nodes("abc 127.0.0.1:30001@31001 master -").is_err());
        assert!(
            parse_cluster_nodes("abc 127.0.0.1:port@31001 master - 0 0 1 connected").is_err()
        );
        assert!(parse_cluster_nodes("abc hostonly master - 0 0 1 connected").is_err());
        assert!(parse_cluster_nodes("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_db_list() {
        let raw = "# Keyspace\r\ndb0:keys=1,expires=0,avg_ttl=0\r\ndb3:keys=9,expires=1,avg_ttl=5\r\n";
        assert_eq!(parse_db_list(raw).unwrap(), vec![0, 3]);
        assert!(parse_db_list("# Keyspace\r\n").unwrap().is_empty());
    }

    fn bulk(s: &str) -> Value {
        Value::BulkString(s.as_bytes().to_vec())
    }

    #[test]
    fn test_parse_module_list_resp2_and_resp3() {
        let resp2 = Value::Array(vec![Value::Array(vec![
            bulk("name"),
            bulk("search"),
            bulk("ver"),
            Value::Int(20_809),
        ])]);
        assert_eq!(
            parse_module_list(&resp2).unwrap(),
            vec![RedisModule {
                name: "search".to_string(),
                version: 20_809,
            }]
        );

        let resp3 = Value::Array(vec![Value::Map(vec![
            (Value::SimpleString("name".to_string()), bulk("ReJSON")),
            (Value::SimpleString("ver".to_string()), Value::Int(20_607)),
            (Value::SimpleString("path".to_string()), bulk("/opt/rejson.so")),
        ])]);
        assert_eq!(parse_module_list(&resp3).unwrap()[0].name, "ReJSON");

        assert!(parse_module_list(&Value::Array(vec![])).unwrap().is_empty());
    }

    #[test]
    fn test_parse_module_list_requires_name() {
        let reply = Value::Array(vec![Value::Array(vec![bulk("ver"), Value::Int(1)])]);
        assert!(matches!(parse_module_list(&reply), Err(Error::Parse { .. })));

        assert!(parse_module_list(&Value::Int(3)).is_err());
    }
}
