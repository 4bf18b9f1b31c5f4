//! Index consistency across the shards of a collection.
//!
//! An index is inconsistent when some shard lacks it, or when the shards
//! disagree on its specification. The check runs either as an aggregation on
//! the router ([`MongoClient::inconsistent_indexes`]) or locally over raw
//! `$indexStats` output ([`MongoClient::inconsistent_indexes_local`]); both
//! report the same thing.

use super::types::decode;
use super::{InconsistentIndex, IndexStat, MongoClient, driver_error, require};
use crate::backends::guarded;
use crate::Result;
use bson::{Bson, Document, doc};
use std::collections::{BTreeMap, BTreeSet};
use tokio_util::sync::CancellationToken;

/// Builds the aggregation that reports inconsistent indexes.
///
/// Stages: collect every index stat and the set of all shards, regroup by
/// index name, then keep indexes missing from some shard or whose spec
/// key/value pairs are not shared by every shard.
#[must_use]
pub fn inconsistent_index_pipeline() -> Vec<Document> {
    let first_spec = doc! { "$arrayElemAt": ["$specs", 0] };
    vec![
        doc! { "$indexStats": {} },
        doc! {
            "$group": {
                "_id": Bson::Null,
                "indexDoc": { "$push": "$$ROOT" },
                "allShards": { "$addToSet": "$shard" },
            }
        },
        doc! { "$unwind": "$indexDoc" },
        doc! {
            "$group": {
                "_id": "$indexDoc.name",
                "shards": { "$push": "$indexDoc.shard" },
                "specs": { "$push": { "$objectToArray": { "$ifNull": ["$indexDoc.spec", {}] } } },
                "allShards": { "$first": "$allShards" },
            }
        },
        doc! {
            "$project": {
                "missingFromShards": { "$setDifference": ["$allShards", "$shards"] },
                "inconsistentProperties": {
                    "$setDifference": [
                        { "$reduce": {
                            "input": "$specs",
                            "initialValue": first_spec.clone(),
                            "in": { "$setUnion": ["$$value", "$$this"] },
                        } },
                        { "$reduce": {
                            "input": "$specs",
                            "initialValue": first_spec,
                            "in": { "$setIntersection": ["$$value", "$$this"] },
                        } },
                    ]
                },
            }
        },
        doc! {
            "$match": {
                "$expr": {
                    "$or": [
                        { "$gt": [{ "$size": "$missingFromShards" }, 0] },
                        { "$gt": [{ "$size": "$inconsistentProperties" }, 0] },
                    ]
                }
            }
        },
        doc! {
            "$project": {
                "_id": 0,
                "indexName": "$$ROOT._id",
                "missingFromShards": 1,
                "inconsistentProperties": 1,
            }
        },
    ]
}

/// Spec as `{k, v}` pairs, matching `$objectToArray`.
fn spec_pairs(spec: &Document) -> Vec<Document> {
    spec.iter()
        .map(|(k, v)| doc! { "k": k.as_str(), "v": v.clone() })
        .collect()
}

fn push_unique(into: &mut Vec<Document>, pair: &Document) {
    if !into.contains(pair) {
        into.push(pair.clone());
    }
}

/// Finds inconsistent indexes in raw `$indexStats` entries.
///
/// Results are ordered by index name; missing shards are sorted.
#[must_use]
pub fn find_inconsistent_indexes(stats: &[IndexStat]) -> Vec<InconsistentIndex> {
    let all_shards: BTreeSet<&str> = stats.iter().map(|s| s.shard.as_str()).collect();

    let mut by_name: BTreeMap<&str, Vec<&IndexStat>> = BTreeMap::new();
    for stat in stats {
        by_name.entry(stat.name.as_str()).or_default().push(stat);
    }

    by_name
        .into_iter()
        .filter_map(|(name, entries)| {
            let present: BTreeSet<&str> = entries.iter().map(|s| s.shard.as_str()).collect();
            let missing_from_shards: Vec<String> = all_shards
                .difference(&present)
                .map(ToString::to_string)
                .collect();

            let specs: Vec<Vec<Document>> = entries.iter().map(|s| spec_pairs(&s.spec)).collect();
            let mut union = Vec::new();
            for pair in specs.iter().flatten() {
                push_unique(&mut union, pair);
            }
            let inconsistent_properties: Vec<Document> = union
                .into_iter()
                .filter(|pair| !specs.iter().all(|spec| spec.contains(pair)))
                .collect();

            if missing_from_shards.is_empty() && inconsistent_properties.is_empty() {
                return None;
            }
            Some(InconsistentIndex {
                index_name: name.to_string(),
                missing_from_shards,
                inconsistent_properties,
            })
        })
        .collect()
}

impl MongoClient {
    async fn aggregate(
        &self,
        operation: &str,
        database: &str,
        collection: &str,
        pipeline: Vec<Document>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Document>> {
        require(database, "database name")?;
        require(collection, "collection name")?;
        guarded(operation, self.timeout, cancel, async {
            let mut cursor = self
                .client
                .database(database)
                .collection::<Document>(collection)
                .aggregate(pipeline)
                .await
                .map_err(|e| driver_error(operation, &e))?;

            let mut documents = Vec::new();
            while cursor.advance().await.map_err(|e| driver_error(operation, &e))? {
                documents.push(
                    cursor
                        .deserialize_current()
                        .map_err(|e| driver_error(operation, &e))?,
                );
            }
            Ok(documents)
        })
        .await
    }

    /// Runs the consistency aggregation for `database.collection` on the
    /// server.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::BackendRejected`] if the server refuses the
    /// pipeline and [`crate::Error::Parse`] if a result does not decode.
    pub async fn inconsistent_indexes(
        &self,
        database: &str,
        collection: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<InconsistentIndex>> {
        let documents = self
            .aggregate(
                "mongo_inconsistent_indexes",
                database,
                collection,
                inconsistent_index_pipeline(),
                cancel,
            )
            .await?;
        let mut found: Vec<InconsistentIndex> = documents
            .into_iter()
            .map(|d| decode("inconsistent index", d))
            .collect::<Result<_>>()?;
        found.sort_by(|a, b| a.index_name.cmp(&b.index_name));
        for index in &mut found {
            index.missing_from_shards.sort();
        }
        tracing::debug!(
            instance = %self.name,
            namespace = %format!("{database}.{collection}"),
            count = found.len(),
            "Checked index consistency"
        );
        Ok(found)
    }

    /// Fetches `$indexStats` for `database.collection` and checks consistency
    /// locally.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Parse`] if an index stat does not decode.
    pub async fn inconsistent_indexes_local(
        &self,
        database: &str,
        collection: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<InconsistentIndex>> {
        let documents = self
            .aggregate(
                "mongo_index_stats",
                database,
                collection,
                vec![doc! { "$indexStats": {} }],
                cancel,
            )
            .await?;
        let stats: Vec<IndexStat> = documents
            .into_iter()
            .map(|d| decode("index stat", d))
            .collect::<Result<_>>()?;
        Ok(find_inconsistent_indexes(&stats))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn stat(name: &str, shard: &str, spec: Document) -> IndexStat {
        IndexStat {
            name: name.to_string(),
            shard: shard.to_string(),
            spec,
        }
    }

    #[test]
    fn test_missing_and_divergent_indexes() {
        let id_spec = doc! { "v": 2, "key": { "_id": 1 }, "name": "_id_" };
        let stats = vec![
            stat("_id_", "A", id_spec.clone()),
            stat("_id_", "B", id_spec.clone()),
            stat("_id_", "C", id_spec),
            stat("email_1", "A", doc! { "key": { "email": 1 }, "name": "email_1" }),
            stat("email_1", "B", doc! { "key": { "email": 1 }, "name": "email_1" }),
            stat("sku_1", "A", doc! { "key": { "sku": 1 }, "name": "sku_1", "unique": true }),
            stat("sku_1", "B", doc! { "key": { "sku": 1 }, "name": "sku_1" }),
            stat("sku_1", "C", doc! { "key": { "sku": 1 }, "name": "sku_1" }),
        ];

        let found = find_inconsistent_indexes(&stats);
        assert_eq!(found.len(), 2);

        assert_eq!(found[0].index_name, "email_1");
        assert_eq!(found[0].missing_from_shards, vec!["C".to_string()]);
        assert!(found[0].inconsistent_properties.is_empty());

        assert_eq!(found[1].index_name, "sku_1");
        assert!(found[1].missing_from_shards.is_empty());
        assert_eq!(found[1].property_names(), vec!["unique"]);
    }

    #[test]
    fn test_index_both_missing_and_divergent() {
        let id_spec = doc! { "v": 2, "key": { "_id": 1 }, "name": "_id_" };
        let stats = vec![
            stat("_id_", "A", id_spec.clone()),
            stat("_id_", "B", id_spec.clone()),
            stat("_id_", "C", id_spec),
            stat("email_1", "A", doc! { "key": { "email": 1 }, "name": "email_1" }),
            stat(
                "email_1",
                "B",
                doc! { "key": { "email": 1 }, "name": "email_1", "unique": true },
            ),
        ];

        let found = find_inconsistent_indexes(&stats);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].index_name, "email_1");
        assert_eq!(found[0].missing_from_shards, vec!["C".to_string()]);
        assert_eq!(found[0].property_names(), vec!["unique"]);
        assert_eq!(
            found[0].inconsistent_properties,
            vec![doc! { "k": "unique", "v": true }]
        );
    }

    #[test]
    fn test_differing_values_report_both_sides() {
        let stats = vec![
            stat("ttl", "A", doc! { "name": "ttl", "expireAfterSeconds": 60 }),
            stat("ttl", "B", doc! { "name": "ttl", "expireAfterSeconds": 120 }),
        ];
        let found = find_inconsistent_indexes(&stats);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].inconsistent_properties.len(), 2);
        assert_eq!(found[0].property_names(), vec!["expireAfterSeconds"]);
    }

    #[test]
    fn test_consistent_and_empty_input() {
        assert!(find_inconsistent_indexes(&[]).is_empty());

        let spec = doc! { "key": { "a": 1 }, "name": "a_1" };
        let stats = vec![stat("a_1", "", spec)];
        assert!(find_inconsistent_indexes(&stats).is_empty());
    }

    #[test]
    fn test_pipeline_shape() {
        let pipeline = inconsistent_index_pipeline();
        assert_eq!(pipeline.len(), 7);
        assert!(pipeline[0].contains_key("$indexStats"));
        assert!(pipeline[5].contains_key("$match"));
        let last = pipeline[6].get_document("$project").unwrap();
        assert_eq!(last.get_str("indexName").unwrap(), "$$ROOT._id");
    }
}
