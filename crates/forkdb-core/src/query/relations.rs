//! Parent, fork and ancestor-chain lookups.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::Record;
use crate::store::sharding::family::by_stars_then_name;
use crate::store::Store;

/// The record `full_name` points at, if both exist in the store.
pub fn get_parent(store: &Store, full_name: &str) -> Option<Record> {
    let parent = store.get(full_name)?.parent.as_deref()?;
    store.get(parent).cloned()
}

/// Direct forks of `full_name`, most-starred first.
pub fn get_forks(store: &Store, full_name: &str) -> Vec<Record> {
    let mut forks: Vec<Record> = store.forks_of(full_name).cloned().collect();
    forks.sort_by(by_stars_then_name);
    forks
}

/// Why a fork chain stopped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "at", rename_all = "snake_case")]
pub enum ChainEnd {
    /// The last record has no parent.
    Root,
    /// The last record's parent is not in the store.
    Missing(String),
    /// The last record's parent was already visited.
    Cycle(String),
}

/// A record followed by its ancestors, nearest first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ForkChain {
    pub records: Vec<Record>,
    pub end: ChainEnd,
}

impl ForkChain {
    /// True when the chain reaches a record without a parent.
    pub fn is_complete(&self) -> bool {
        self.end == ChainEnd::Root
    }

    pub fn names(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.full_name.as_str()).collect()
    }
}

/// Walk `parent` links from `full_name` upwards.
///
/// Stops at a record without a parent, at a parent missing from the store,
/// or at a repeated key. Never takes more than `store.len()` steps.
pub fn get_fork_chain(store: &Store, full_name: &str) -> Option<ForkChain> {
    let start = store.get(full_name)?;
    let mut visited: HashSet<&str> = HashSet::from([start.full_name.as_str()]);
    let mut records = vec![start.clone()];
    let mut current = start;

    for _ in 0..store.len() {
        let Some(parent) = current.parent.as_deref() else {
            return Some(ForkChain {
                records,
                end: ChainEnd::Root,
            });
        };
        if !visited.insert(parent) {
            return Some(ForkChain {
                records,
                end: ChainEnd::Cycle(parent.to_string()),
            });
        }
        let Some(next) = store.get(parent) else {
            return Some(ForkChain {
                records,
                end: ChainEnd::Missing(parent.to_string()),
            });
        };
        records.push(next.clone());
        current = next;
    }

    let at = current.parent.clone().unwrap_or_default();
    Some(ForkChain {
        records,
        end: ChainEnd::Cycle(at),
    })
}

/// A fork whose parent is tracked, with its resolved source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ForkRelationship {
    pub fork: String,
    pub fork_url: Option<String>,
    pub fork_stars: u64,
    pub parent: String,
    pub parent_url: Option<String>,
    pub parent_stars: u64,
    /// The fork's recorded `source`, falling back to the parent.
    pub source: String,
    pub source_url: Option<String>,
    /// Remote `updated_at` of each end.
    pub fork_updated: Option<DateTime<Utc>>,
    pub parent_updated: Option<DateTime<Utc>>,
}

/// Every fork → parent edge where both ends are in the store, by fork name.
pub fn fork_relationships(store: &Store) -> Vec<ForkRelationship> {
    store
        .records()
        .filter(|record| record.is_fork)
        .filter_map(|fork| {
            let parent = store.get(fork.parent.as_deref()?)?;
            let source_name = fork.source.clone().unwrap_or_else(|| parent.full_name.clone());
            let source_url = store
                .get(&source_name)
                .unwrap_or(parent)
                .html_url
                .clone();
            Some(ForkRelationship {
                fork: fork.full_name.clone(),
                fork_url: fork.html_url.clone(),
                fork_stars: fork.stars,
                parent: parent.full_name.clone(),
                parent_url: parent.html_url.clone(),
                parent_stars: parent.stars,
                source: source_name,
                source_url,
                fork_updated: fork.updated_at,
                parent_updated: parent.updated_at,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::ts;
    use crate::store::StoreFormat;

    fn store_of(records: Vec<Record>) -> Store {
        let mut store = Store::new(StoreFormat::Flat);
        for record in records {
            store.insert_unchecked(record);
        }
        store
    }

    fn scenario() -> Store {
        store_of(vec![
            Record::new("A/x", ts(0)).with_stars(10),
            Record::fork_of("B/x", "A/x", ts(0)).with_stars(2),
            Record::fork_of("D/y", "missing/y", ts(0)),
        ])
    }

    #[test]
    fn test_parent_and_forks() {
        let store = scenario();
        assert_eq!(get_parent(&store, "B/x").unwrap().full_name, "A/x");
        assert_eq!(get_parent(&store, "A/x"), None);
        assert_eq!(get_parent(&store, "D/y"), None);
        assert_eq!(get_parent(&store, "nobody/x"), None);

        let forks = get_forks(&store, "A/x");
        assert_eq!(forks.len(), 1);
        assert_eq!(forks[0].full_name, "B/x");
        assert!(get_forks(&store, "B/x").is_empty());
    }

    #[test]
    fn test_forks_ordered_by_stars_then_name() {
        let store = store_of(vec![
            Record::new("A/x", ts(0)),
            Record::fork_of("c/x", "A/x", ts(0)).with_stars(1),
            Record::fork_of("b/x", "A/x", ts(0)).with_stars(5),
            Record::fork_of("a/x", "A/x", ts(0)).with_stars(1),
        ]);
        let names: Vec<String> = get_forks(&store, "A/x")
            .into_iter()
            .map(|r| r.full_name)
            .collect();
        assert_eq!(names, ["b/x", "a/x", "c/x"]);
    }

    #[test]
    fn test_chain_to_root() {
        let store = store_of(vec![
            Record::new("A/x", ts(0)),
            Record::fork_of("B/x", "A/x", ts(0)),
            Record::fork_of("C/x", "B/x", ts(0)),
        ]);
        let chain = get_fork_chain(&store, "C/x").unwrap();
        assert_eq!(chain.names(), ["C/x", "B/x", "A/x"]);
        assert!(chain.is_complete());
    }

    #[test]
    fn test_chain_with_missing_parent_is_incomplete() {
        let chain = get_fork_chain(&scenario(), "D/y").unwrap();
        assert_eq!(chain.names(), ["D/y"]);
        assert_eq!(chain.end, ChainEnd::Missing("missing/y".into()));
        assert!(!chain.is_complete());
    }

    #[test]
    fn test_chain_detects_cycle() {
        let store = store_of(vec![
            Record::fork_of("a/x", "b/x", ts(0)),
            Record::fork_of("b/x", "c/x", ts(0)),
            Record::fork_of("c/x", "a/x", ts(0)),
        ]);
        let chain = get_fork_chain(&store, "a/x").unwrap();
        assert_eq!(chain.names(), ["a/x", "b/x", "c/x"]);
        assert_eq!(chain.end, ChainEnd::Cycle("a/x".into()));
    }

    #[test]
    fn test_chain_self_loop_terminates() {
        let store = store_of(vec![Record::fork_of("a/x", "a/x", ts(0))]);
        let chain = get_fork_chain(&store, "a/x").unwrap();
        assert_eq!(chain.names(), ["a/x"]);
        assert_eq!(chain.end, ChainEnd::Cycle("a/x".into()));
    }

    #[test]
    fn test_chain_of_unknown_record_is_none() {
        assert_eq!(get_fork_chain(&scenario(), "nobody/x"), None);
    }

    #[test]
    fn test_relationships_resolve_source() {
        let mut parent = Record::new("A/x", ts(0)).with_stars(10);
        parent.html_url = Some("https://example.test/A/x".into());
        parent.updated_at = Some(ts(-50));
        let mut fork = Record::fork_of("B/x", "A/x", ts(0)).with_stars(2);
        fork.updated_at = Some(ts(-5));
        let store = store_of(vec![
            parent,
            fork,
            Record::fork_of("D/y", "missing/y", ts(0)),
        ]);
        let edges = fork_relationships(&store);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].fork, "B/x");
        assert_eq!(edges[0].source, "A/x");
        assert_eq!(edges[0].source_url.as_deref(), Some("https://example.test/A/x"));
        assert_eq!((edges[0].fork_stars, edges[0].parent_stars), (2, 10));
        assert_eq!(edges[0].fork_updated, Some(ts(-5)));
        assert_eq!(edges[0].parent_updated, Some(ts(-50)));
    }
}
