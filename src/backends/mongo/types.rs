//! Typed decodings of MongoDB administrative replies.
//!
//! Each struct lists only the fields callers rely on; unknown fields are
//! ignored. A reply whose shape does not match fails with [`Error::Parse`].

use crate::{Error, Result};
use bson::{Bson, Document, doc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Decodes a reply document into `T`.
pub(crate) fn decode<T: DeserializeOwned>(context: &str, document: Document) -> Result<T> {
    bson::from_document(document).map_err(|e| Error::parse(context, e))
}

/// Reply of `replSetGetStatus`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplSetStatus {
    /// Replica set name.
    pub set: String,
    /// State code of the answering member.
    #[serde(default)]
    pub my_state: i32,
    /// Term of the current primary, when reported.
    #[serde(default)]
    pub term: Option<i64>,
    /// Members as seen from the answering node.
    #[serde(default)]
    pub members: Vec<ReplSetMember>,
}

impl ReplSetStatus {
    /// Returns the current primary, if any member reports `PRIMARY`.
    #[must_use]
    pub fn primary(&self) -> Option<&ReplSetMember> {
        self.members.iter().find(|m| m.state_str == "PRIMARY")
    }
}

/// One member of `replSetGetStatus`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplSetMember {
    /// Member id.
    #[serde(rename = "_id")]
    pub id: i32,
    /// `host:port`.
    pub name: String,
    /// 1 when reachable.
    #[serde(default)]
    pub health: f64,
    /// State code.
    #[serde(default)]
    pub state: i32,
    /// State name, e.g. `PRIMARY`.
    #[serde(default)]
    pub state_str: String,
    /// Seconds the member has been up.
    #[serde(default)]
    pub uptime: Option<i64>,
    /// Last applied operation time.
    #[serde(default)]
    pub optime_date: Option<bson::DateTime>,
    /// Host this member syncs from.
    #[serde(default)]
    pub sync_source_host: Option<String>,
}

/// Reply of `isMaster`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IsMasterReply {
    /// True on a primary or standalone.
    #[serde(rename = "ismaster")]
    pub is_master: bool,
    /// True on a secondary.
    #[serde(default)]
    pub secondary: bool,
    /// Replica set name.
    #[serde(default)]
    pub set_name: Option<String>,
    /// Current primary `host:port`.
    #[serde(default)]
    pub primary: Option<String>,
    /// Data-bearing members.
    #[serde(default)]
    pub hosts: Vec<String>,
    /// `isdbgrid` when talking to a mongos.
    #[serde(default)]
    pub msg: Option<String>,
}

impl IsMasterReply {
    /// Returns true if the server is a mongos router.
    #[must_use]
    pub fn is_router(&self) -> bool {
        self.msg.as_deref() == Some("isdbgrid")
    }
}

/// One member entry of a replica set configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplSetConfigMember {
    /// Member id.
    #[serde(rename = "_id")]
    pub id: i32,
    /// `host:port`.
    pub host: String,
    /// Election priority.
    #[serde(default = "default_priority")]
    pub priority: f64,
    /// Votes in elections.
    #[serde(default = "default_votes")]
    pub votes: i32,
    /// True for arbiters.
    #[serde(default)]
    pub arbiter_only: bool,
    /// True for hidden members.
    #[serde(default)]
    pub hidden: bool,
}

const fn default_priority() -> f64 {
    1.0
}

const fn default_votes() -> i32 {
    1
}

/// Replica set configuration from `replSetGetConfig`.
///
/// Held as the raw document so that a reconfig round-trips every field the
/// server sent, including ones this crate does not model.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplSetConfig {
    raw: Document,
}

impl ReplSetConfig {
    /// Wraps a `config` sub-document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if `_id`, `version` or `members` is missing.
    pub fn from_document(raw: Document) -> Result<Self> {
        let config = Self { raw };
        config.name()?;
        config.version()?;
        config.members()?;
        Ok(config)
    }

    /// Returns the raw document.
    #[must_use]
    pub const fn as_document(&self) -> &Document {
        &self.raw
    }

    /// Replica set name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if `_id` is not a string.
    pub fn name(&self) -> Result<&str> {
        self.raw
            .get_str("_id")
            .map_err(|e| Error::parse("replica set config _id", e))
    }

    /// Config version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if `version` is not an integer.
    pub fn version(&self) -> Result<i64> {
        match self.raw.get("version") {
            Some(Bson::Int32(v)) => Ok(i64::from(*v)),
            Some(Bson::Int64(v)) => Ok(*v),
            other => Err(Error::parse(
                "replica set config version",
                format!("expected an integer, got {other:?}"),
            )),
        }
    }

    /// Version + 1, keeping the integer width the server sent.
    fn next_version(&self) -> Result<Bson> {
        match self.raw.get("version") {
            Some(Bson::Int32(v)) => Ok(Bson::Int32(v.saturating_add(1))),
            _ => Ok(Bson::Int64(self.version()?.saturating_add(1))),
        }
    }

    /// Configured members.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if `members` is not an array of member
    /// documents.
    pub fn members(&self) -> Result<Vec<ReplSetConfigMember>> {
        let members = self
            .raw
            .get_array("members")
            .map_err(|e| Error::parse("replica set config members", e))?;
        members
            .iter()
            .map(|m| match m {
                Bson::Document(d) => decode("replica set config member", d.clone()),
                other => Err(Error::parse(
                    "replica set config member",
                    format!("expected a document, got {other:?}"),
                )),
            })
            .collect()
    }

    /// Returns a copy with `host` appended as a new member and the version
    /// bumped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `host` is already a member.
    pub fn with_member_added(&self, host: &str, priority: f64, votes: i32) -> Result<Self> {
        let members = self.members()?;
        if members.iter().any(|m| m.host == host) {
            return Err(Error::InvalidInput(format!(
                "{host} is already a member of {}",
                self.name()?
            )));
        }
        let next_id = members.iter().map(|m| m.id).max().map_or(0, |id| id + 1);

        let mut raw = self.raw.clone();
        let mut array = self
            .raw
            .get_array("members")
            .map_err(|e| Error::parse("replica set config members", e))?
            .clone();
        array.push(Bson::Document(doc! {
            "_id": next_id,
            "host": host,
            "priority": priority,
            "votes": votes,
        }));
        raw.insert("members", array);
        raw.insert("version", self.next_version()?);
        Ok(Self { raw })
    }

    /// Returns a copy without the member at `host` and the version bumped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `host` is not a member.
    pub fn with_member_removed(&self, host: &str) -> Result<Self> {
        let array = self
            .raw
            .get_array("members")
            .map_err(|e| Error::parse("replica set config members", e))?;
        let kept: Vec<Bson> = array
            .iter()
            .filter(|m| {
                !matches!(m, Bson::Document(d) if d.get_str("host").is_ok_and(|h| h == host))
            })
            .cloned()
            .collect();
        if kept.len() == array.len() {
            return Err(Error::InvalidInput(format!(
                "{host} is not a member of {}",
                self.name()?
            )));
        }

        let mut raw = self.raw.clone();
        raw.insert("members", kept);
        raw.insert("version", self.next_version()?);
        Ok(Self { raw })
    }
}

/// One entry of `listShards`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShardInfo {
    /// Shard name.
    #[serde(rename = "_id")]
    pub id: String,
    /// Connection string, e.g. `rs0/host1:27018,host2:27018`.
    pub host: String,
    /// 1 when the shard is shard-aware.
    #[serde(default)]
    pub state: Option<i32>,
    /// Zone tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// True while the shard is being removed.
    #[serde(default)]
    pub draining: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ShardList {
    #[serde(default)]
    pub(crate) shards: Vec<ShardInfo>,
}

/// One entry of `config.collections`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardedCollection {
    /// Namespace, `db.collection`.
    #[serde(rename = "_id")]
    pub id: String,
    /// Shard key pattern.
    #[serde(default)]
    pub key: Document,
    /// Whether the shard key is unique.
    #[serde(default)]
    pub unique: bool,
    /// Whether the collection was dropped (pre-5.0 metadata).
    #[serde(default)]
    pub dropped: bool,
    /// Last metadata change.
    #[serde(default)]
    pub lastmod: Option<bson::DateTime>,
}

/// One index found inconsistent across shards.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InconsistentIndex {
    /// Index name.
    pub index_name: String,
    /// Shards that lack the index.
    #[serde(default)]
    pub missing_from_shards: Vec<String>,
    /// Spec properties not shared by every shard, as `{k, v}` documents.
    #[serde(default)]
    pub inconsistent_properties: Vec<Document>,
}

impl InconsistentIndex {
    /// Returns the names of the differing spec properties.
    #[must_use]
    pub fn property_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .inconsistent_properties
            .iter()
            .filter_map(|p| p.get_str("k").ok())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

/// One `$indexStats` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexStat {
    /// Index name.
    pub name: String,
    /// Reporting shard; empty on an unsharded deployment.
    #[serde(default)]
    pub shard: String,
    /// Index specification.
    #[serde(default)]
    pub spec: Document,
}
