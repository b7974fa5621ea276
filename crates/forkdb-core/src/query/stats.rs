//! Aggregate statistics over a store.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::query::guards::TOP_FORKED_LIMIT;
use crate::store::Store;

/// Histogram bucket for records without a language.
pub const UNKNOWN_LANGUAGE: &str = "unknown";

/// A parent and how many of its forks the store tracks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ForkCount {
    pub full_name: String,
    pub forks: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StoreStats {
    pub total_repos: usize,
    pub total_forks: usize,
    pub total_original: usize,
    /// Distinct parents referenced by at least one tracked fork.
    pub total_parents: usize,
    pub by_language: BTreeMap<String, usize>,
    pub average_stars: f64,
    pub top_forked: Vec<ForkCount>,
}

pub fn stats(store: &Store) -> StoreStats {
    let mut total_forks = 0usize;
    let mut star_sum = 0u128;
    let mut parents: HashSet<&str> = HashSet::new();
    let mut by_language: BTreeMap<String, usize> = BTreeMap::new();

    for record in store.records() {
        if record.is_fork {
            total_forks += 1;
        }
        if let Some(parent) = record.parent.as_deref() {
            parents.insert(parent);
        }
        star_sum += u128::from(record.stars);
        let language = record.language.as_deref().unwrap_or(UNKNOWN_LANGUAGE);
        *by_language.entry(language.to_string()).or_default() += 1;
    }

    let total_repos = store.len();
    let average_stars = if total_repos == 0 {
        0.0
    } else {
        star_sum as f64 / total_repos as f64
    };

    StoreStats {
        total_repos,
        total_forks,
        total_original: total_repos - total_forks,
        total_parents: parents.len(),
        by_language,
        average_stars,
        top_forked: top_forked(store, TOP_FORKED_LIMIT),
    }
}

/// Parents with the most tracked forks, ties broken by name.
pub fn top_forked(store: &Store, limit: usize) -> Vec<ForkCount> {
    let mut counts: Vec<ForkCount> = store
        .parent_fan_out()
        .map(|(parent, forks)| ForkCount {
            full_name: parent.to_string(),
            forks,
        })
        .collect();
    counts.sort_by(|a, b| b.forks.cmp(&a.forks).then_with(|| a.full_name.cmp(&b.full_name)));
    counts.truncate(limit);
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::ts;
    use crate::models::Record;
    use crate::store::StoreFormat;

    #[test]
    fn test_stats_single_pass_totals() {
        let mut store = Store::new(StoreFormat::Flat);
        store.put(Record::new("A/x", ts(0)).with_stars(10).with_language("Rust")).unwrap();
        store.put(Record::fork_of("B/x", "A/x", ts(0)).with_stars(2).with_language("Rust")).unwrap();
        store.put(Record::fork_of("C/x", "A/x", ts(0))).unwrap();
        store.put(Record::fork_of("D/y", "missing/y", ts(0)).with_stars(4)).unwrap();

        let stats = stats(&store);
        assert_eq!(stats.total_repos, 4);
        assert_eq!(stats.total_forks, 3);
        assert_eq!(stats.total_original, 1);
        assert_eq!(stats.total_parents, 2);
        assert_eq!(stats.by_language.get("Rust"), Some(&2));
        assert_eq!(stats.by_language.get(UNKNOWN_LANGUAGE), Some(&2));
        assert!((stats.average_stars - 4.0).abs() < f64::EPSILON);
        assert_eq!(
            stats.top_forked,
            vec![
                ForkCount { full_name: "A/x".into(), forks: 2 },
                ForkCount { full_name: "missing/y".into(), forks: 1 },
            ]
        );
    }

    #[test]
    fn test_empty_store_stats() {
        let stats = stats(&Store::default());
        assert_eq!(stats.total_repos, 0);
        assert_eq!(stats.average_stars, 0.0);
        assert!(stats.top_forked.is_empty());
    }
}
