//! Name search and star ranking.

use crate::models::Record;
use crate::query::guards::{clamp_limit, truncate_query, MAX_RESULT_LIMIT};
use crate::store::sharding::family::by_stars_then_name;
use crate::store::Store;

/// Records whose `name` contains `needle`, ignoring case, most-starred first.
///
/// An empty needle matches every record. At most `MAX_RESULT_LIMIT` results.
pub fn search(store: &Store, needle: &str) -> Vec<Record> {
    let needle = truncate_query(needle).to_lowercase();
    let mut hits: Vec<&Record> = store
        .records()
        .filter(|record| record.name.to_lowercase().contains(&needle))
        .collect();
    hits.sort_by(|a, b| by_stars_then_name(a, b));
    hits.into_iter().take(MAX_RESULT_LIMIT).cloned().collect()
}

/// The `n` most-starred records, ties broken by `full_name`.
pub fn top(store: &Store, n: usize) -> Vec<Record> {
    let n = clamp_limit(n, MAX_RESULT_LIMIT);
    if n == 0 {
        return Vec::new();
    }
    let mut ranked: Vec<&Record> = store.records().collect();
    if ranked.len() > n {
        ranked.select_nth_unstable_by(n - 1, |a, b| by_stars_then_name(a, b));
        ranked.truncate(n);
    }
    ranked.sort_by(|a, b| by_stars_then_name(a, b));
    ranked.into_iter().cloned().collect()
}
