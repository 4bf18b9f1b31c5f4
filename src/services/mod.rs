//! Administrative services.
//!
//! Services combine backend client calls into complete administrative flows:
//! replica set membership, sharding, access control, bucket lifecycle, health
//! reporting and login sessions.

mod access;
mod buckets;
mod health;
mod replica_set;
mod session;
mod sharding;

pub use access::{AccessService, AccountKind, GrantOutcome};
pub use buckets::{BucketService, PurgeSummary};
pub use health::{HealthReport, HealthService, InstanceHealth};
pub use replica_set::{ReplicaSetService, ReplicaSetTopology};
pub use session::SessionStore;
pub use sharding::{ShardOutcome, ShardingOverview, ShardingService};
