//! Typed Redis topology facts.

use serde::Serialize;

/// Snapshot parsed from one `INFO` reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RedisInfo {
    /// Server version string.
    pub redis_version: String,
    /// Seconds since server start.
    pub uptime_in_seconds: u64,
    /// Bytes allocated by Redis.
    pub used_memory: u64,
    /// Configured memory limit in bytes; 0 means unlimited.
    pub maxmemory: u64,
    /// Eviction policy.
    pub maxmemory_policy: String,
    /// Bytes used by the replication backlog.
    pub mem_replication_backlog: u64,
    /// RSS to allocated memory ratio.
    pub mem_fragmentation_ratio: f64,
    /// Whether AOF persistence is on.
    pub aof_enabled: bool,
    /// Connections accepted since start.
    pub total_connections_received: u64,
    /// Commands processed since start.
    pub total_commands_processed: u64,
    /// Current commands per second.
    pub instantaneous_ops_per_sec: u64,
    /// Network bytes read since start.
    pub total_net_input_bytes: u64,
    /// Network bytes written since start.
    pub total_net_output_bytes: u64,
    /// Current network input rate.
    pub instantaneous_input_kbps: f64,
    /// Current network output rate.
    pub instantaneous_output_kbps: f64,
    /// Client connections, excluding replicas.
    pub connected_clients: u64,
    /// Connections rejected by `maxclients`.
    pub rejected_connections: u64,
    /// Keys expired since start.
    pub expired_keys: u64,
    /// Keys evicted since start.
    pub evicted_keys: u64,
    /// Successful key lookups.
    pub keyspace_hits: u64,
    /// Failed key lookups.
    pub keyspace_misses: u64,
    /// `master` or `slave`.
    pub role: String,
    /// System CPU seconds of the server.
    pub used_cpu_sys: f64,
    /// User CPU seconds of the server.
    pub used_cpu_user: f64,
    /// System CPU seconds of background children.
    pub used_cpu_sys_children: f64,
    /// User CPU seconds of background children.
    pub used_cpu_user_children: f64,
    /// Whether cluster mode is on.
    pub cluster_enabled: bool,
    /// Connected replicas, in reply order.
    pub slaves: Vec<SlaveInfo>,
    /// Keyspace entries, in reply order.
    pub databases: Vec<DatabaseInfo>,
}

/// One `slaveN:` line of the replication section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SlaveInfo {
    /// Replica address.
    pub ip: String,
    /// Replica port.
    pub port: u16,
    /// Replication state, e.g. `online`.
    pub state: String,
    /// Acknowledged replication offset.
    pub offset: u64,
    /// Seconds since the last acknowledgement.
    pub lag: u64,
}

/// One `dbN:` line of the keyspace section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatabaseInfo {
    /// Database label, e.g. `db0`.
    pub db_name: String,
    /// Key count.
    pub keys: u64,
    /// Keys with an expiry.
    pub expires: u64,
    /// Average TTL in milliseconds.
    pub avg_ttl: u64,
}

/// Snapshot parsed from one `CLUSTER INFO` reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RedisClusterInfo {
    /// `ok` or `fail`.
    pub cluster_state: String,
    /// Slots bound to a node.
    pub cluster_slots_assigned: u64,
    /// Slots whose node is healthy.
    pub cluster_slots_ok: u64,
    /// Slots whose node is probably failing.
    pub cluster_slots_pfail: u64,
    /// Slots whose node has failed.
    pub cluster_slots_fail: u64,
    /// Nodes known to this node, including handshakes.
    pub cluster_known_nodes: u64,
    /// Masters serving at least one slot.
    pub cluster_size: u64,
    /// Highest epoch seen.
    pub cluster_current_epoch: u64,
    /// Config epoch of this node.
    pub cluster_my_epoch: u64,
}

/// Node role derived from the flags field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Serves slots.
    Master,
    /// Replicates a master.
    Slave,
}

/// Node health derived from the flags field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// No failure flag set.
    Online,
    /// `fail` or `fail?` flag set.
    Fail,
}

/// One line of `CLUSTER NODES`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterNode {
    /// Node id.
    pub id: String,
    /// Client host.
    pub host: String,
    /// Client port.
    pub port: u16,
    /// Cluster bus port, when reported.
    pub cluster_port: Option<u16>,
    /// Raw flags, e.g. `myself,master`.
    pub flags: String,
    /// Role.
    pub role: NodeRole,
    /// Health.
    pub status: NodeStatus,
    /// Master id for replicas; `None` for masters.
    pub master_id: Option<String>,
    /// `connected` or `disconnected`.
    pub link_state: String,
    /// Slot ranges served, as reported.
    pub slots: Vec<String>,
}

/// One loaded server module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedisModule {
    /// Module name.
    pub name: String,
    /// Module version number.
    pub version: i64,
}
