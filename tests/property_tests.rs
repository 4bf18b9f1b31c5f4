//! Property-based tests for the reply parsers.
//!
//! Uses proptest to verify invariants across random inputs:
//! - INFO numeric fields survive parsing exactly
//! - Unknown keys and colon-free lines never affect the result
//! - A malformed numeric field always fails the whole reply
//! - CLUSTER NODES keeps one node per line, in order
//! - Identical index specs on every shard are never reported

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bson::doc;
use myadmin::Error;
use myadmin::backends::mongo::{IndexStat, find_inconsistent_indexes};
use myadmin::backends::redis::parser::{parse_cluster_nodes, parse_db_list, parse_info};
use proptest::prelude::*;

fn index_spec(name: &str) -> bson::Document {
    let mut key = bson::Document::new();
    key.insert(name.trim_end_matches("_1"), 1);
    doc! { "key": key, "name": name, "v": 2 }
}

proptest! {
    /// Property: numeric INFO fields are parsed exactly.
    #[test]
    fn prop_info_numbers_exact(used in any::<u64>(), clients in any::<u64>(), uptime in any::<u64>()) {
        let raw = format!(
            "# Memory\r\nused_memory:{used}\r\n# Clients\r\nconnected_clients:{clients}\r\nuptime_in_seconds:{uptime}\r\n"
        );
        let info = parse_info(&raw).unwrap();
        prop_assert_eq!(info.used_memory, used);
        prop_assert_eq!(info.connected_clients, clients);
        prop_assert_eq!(info.uptime_in_seconds, uptime);
    }

    /// Property: unknown keys and header lines do not change the result.
    #[test]
    fn prop_info_ignores_noise(
        noise in prop::collection::vec(("[a-z]{3,12}_x", "[ -~]{0,20}"), 0..10),
        headers in prop::collection::vec("# [A-Za-z]{1,10}", 0..5),
    ) {
        let base = "redis_version:7.2.4\r\nused_memory:1024\r\nrole:master\r\n";
        let mut raw = String::from(base);
        for (key, value) in &noise {
            raw.push_str(&format!("{key}:{value}\r\n"));
        }
        for header in &headers {
            raw.push_str(header);
            raw.push_str("\r\n");
        }
        prop_assert_eq!(parse_info(&raw).unwrap(), parse_info(base).unwrap());
    }

    /// Property: a non-numeric value in a numeric field fails the reply.
    #[test]
    fn prop_info_malformed_number_fails(garbage in "[a-z][a-z0-9]{0,8}") {
        let raw = format!("redis_version:7.0.0\r\nused_memory:{garbage}\r\nconnected_clients:3\r\n");
        let is_parse_error = matches!(parse_info(&raw), Err(Error::Parse { .. }));
        prop_assert!(is_parse_error);
    }

    /// Property: db_list returns every keyspace index in order.
    #[test]
    fn prop_db_list_indexes(indexes in prop::collection::vec(0_u32..16, 0..8)) {
        let mut raw = String::from("# Keyspace\r\n");
        for index in &indexes {
            raw.push_str(&format!("db{index}:keys=1,expires=0,avg_ttl=0\r\n"));
        }
        prop_assert_eq!(parse_db_list(&raw).unwrap(), indexes);
    }

    /// Property: CLUSTER NODES yields one node per line, in input order.
    #[test]
    fn prop_cluster_nodes_order(ports in prop::collection::vec(1_u16..65535, 1..12)) {
        let raw: String = ports
            .iter()
            .enumerate()
            .map(|(i, port)| {
                format!("node{i:02} 10.0.0.{i}:{port}@{port} master - 0 0 {i} connected\n")
            })
            .collect();
        let nodes = parse_cluster_nodes(&raw).unwrap();
        prop_assert_eq!(nodes.len(), ports.len());
        for (i, (node, port)) in nodes.iter().zip(&ports).enumerate() {
            prop_assert_eq!(&node.id, &format!("node{i:02}"));
            prop_assert_eq!(node.port, *port);
        }
    }

    /// Property: identical specs on every shard are never inconsistent.
    #[test]
    fn prop_consistent_indexes_not_reported(
        shards in prop::collection::btree_set("[a-z]{1,6}", 1..6),
        names in prop::collection::btree_set("[a-z]{1,8}_1", 1..6),
    ) {
        let stats: Vec<IndexStat> = shards
            .iter()
            .flat_map(|shard| {
                names.iter().map(move |name| IndexStat {
                    name: name.clone(),
                    shard: shard.clone(),
                    spec: index_spec(name),
                })
            })
            .collect();
        prop_assert!(find_inconsistent_indexes(&stats).is_empty());
    }

    /// Property: dropping an index from one shard reports exactly that shard.
    #[test]
    fn prop_missing_index_names_the_shard(
        shards in prop::collection::btree_set("[a-z]{1,6}", 2..6),
        pick in any::<prop::sample::Index>(),
    ) {
        let shards: Vec<String> = shards.into_iter().collect();
        let missing = &shards[pick.index(shards.len())];
        let stats: Vec<IndexStat> = shards
            .iter()
            .flat_map(|shard| {
                let mut stats = vec![IndexStat {
                    name: "_id_".to_string(),
                    shard: shard.clone(),
                    spec: doc! { "key": { "_id": 1 } },
                }];
                if shard != missing {
                    stats.push(IndexStat {
                        name: "email_1".to_string(),
                        shard: shard.clone(),
                        spec: doc! { "key": { "email": 1 } },
                    });
                }
                stats
            })
            .collect();

        let found = find_inconsistent_indexes(&stats);
        prop_assert_eq!(found.len(), 1);
        prop_assert_eq!(&found[0].index_name, "email_1");
        prop_assert_eq!(&found[0].missing_from_shards, &vec![missing.clone()]);
    }
}
