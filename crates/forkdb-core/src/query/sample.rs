//! Random sampling. Callers supply the RNG, so tests can seed it.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use crate::models::Record;
use crate::query::relations::get_forks;
use crate::store::Store;

/// `k` distinct records chosen uniformly at random.
pub fn random_sample<R: Rng + ?Sized>(store: &Store, k: usize, rng: &mut R) -> Vec<Record> {
    let all: Vec<&Record> = store.records().collect();
    all.choose_multiple(rng, k).map(|r| (*r).clone()).collect()
}

/// A randomly picked original repository and what the store knows of its forks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FamilySample {
    /// An original whose forks are tracked, ordered like `get_forks`.
    Tracked { root: Record, forks: Vec<Record> },
    /// An original that reports forks, none of which are tracked.
    Untracked { root: Record },
}

/// Pick a random original with tracked forks, falling back to one that
/// merely reports a non-zero `forks_count`.
pub fn random_fork_family<R: Rng + ?Sized>(store: &Store, rng: &mut R) -> Option<FamilySample> {
    let (tracked, untracked): (Vec<&Record>, Vec<&Record>) = store
        .records()
        .filter(|record| !record.is_fork)
        .filter(|record| store.forks_of(&record.full_name).next().is_some() || record.forks_count > 0)
        .partition(|record| store.forks_of(&record.full_name).next().is_some());

    if let Some(root) = tracked.choose(rng) {
        return Some(FamilySample::Tracked {
            root: (*root).clone(),
            forks: get_forks(store, &root.full_name),
        });
    }
    untracked.choose(rng).map(|root| FamilySample::Untracked {
        root: (*root).clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::ts;
    use crate::store::StoreFormat;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn store_of(records: Vec<Record>) -> Store {
        let mut store = Store::new(StoreFormat::Flat);
        for record in records {
            store.put(record).unwrap();
        }
        store
    }

    #[test]
    fn test_sample_is_without_replacement() {
        let store = store_of((0..20).map(|i| Record::new(format!("o{i}/r"), ts(0))).collect());
        let mut rng = StdRng::seed_from_u64(7);
        let sample = random_sample(&store, 5, &mut rng);
        assert_eq!(sample.len(), 5);
        let distinct: HashSet<_> = sample.iter().map(|r| &r.full_name).collect();
        assert_eq!(distinct.len(), 5);

        assert_eq!(random_sample(&store, 50, &mut rng).len(), 20);
        assert!(random_sample(&Store::default(), 1, &mut rng).is_empty());
    }

    #[test]
    fn test_seeded_sample_is_reproducible() {
        let store = store_of((0..20).map(|i| Record::new(format!("o{i}/r"), ts(0))).collect());
        let a = random_sample(&store, 3, &mut StdRng::seed_from_u64(42));
        let b = random_sample(&store, 3, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_family_sample_prefers_tracked_forks() {
        let mut reported = Record::new("C/z", ts(0));
        reported.forks_count = 3;
        let store = store_of(vec![
            Record::new("A/x", ts(0)),
            Record::fork_of("B/x", "A/x", ts(0)),
            reported,
        ]);
        let mut rng = StdRng::seed_from_u64(1);
        match random_fork_family(&store, &mut rng) {
            Some(FamilySample::Tracked { root, forks }) => {
                assert_eq!(root.full_name, "A/x");
                assert_eq!(forks.len(), 1);
            }
            other => panic!("unexpected sample {other:?}"),
        }
    }

    #[test]
    fn test_family_sample_falls_back_to_reported_forks() {
        let mut reported = Record::new("C/z", ts(0));
        reported.forks_count = 3;
        let store = store_of(vec![reported, Record::new("D/z", ts(0))]);
        let sample = random_fork_family(&store, &mut StdRng::seed_from_u64(1));
        assert!(matches!(sample, Some(FamilySample::Untracked { root }) if root.full_name == "C/z"));

        assert_eq!(
            random_fork_family(&Store::default(), &mut StdRng::seed_from_u64(1)),
            None
        );
    }
}
