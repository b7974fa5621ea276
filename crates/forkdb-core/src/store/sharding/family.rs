//! Fork-family grouping for one name group.
//!
//! Families are a write-time view recomputed from the store on every
//! sharded save; loading flattens them straight back into the store.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::Record;

/// A root repository and the forks that point directly at it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkFamily {
    pub root: Record,
    #[serde(default)]
    pub forks: Vec<Record>,
}

/// A name group split into families and orphaned forks.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FamilyPartition {
    pub families: Vec<ForkFamily>,
    pub orphaned: Vec<Record>,
}

impl FamilyPartition {
    /// Every record in the partition, families first.
    pub fn into_records(self) -> impl Iterator<Item = Record> {
        self.families
            .into_iter()
            .flat_map(|family| std::iter::once(family.root).chain(family.forks))
            .chain(self.orphaned)
    }

    pub fn len(&self) -> usize {
        self.families.iter().map(|f| 1 + f.forks.len()).sum::<usize>() + self.orphaned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty() && self.orphaned.is_empty()
    }
}

/// Most-starred first, then by name.
pub fn by_stars_then_name(a: &Record, b: &Record) -> Ordering {
    b.stars
        .cmp(&a.stars)
        .then_with(|| a.full_name.cmp(&b.full_name))
}

/// Partition one name group.
///
/// Every non-fork is a root. A fork whose `parent` is one of those roots
/// joins that root's family. Any other fork is orphaned; only a single hop
/// is resolved here, longer chains are walked at query time.
pub fn build_families<'a, I>(group: I) -> FamilyPartition
where
    I: IntoIterator<Item = &'a Record>,
{
    let (roots, forks): (Vec<&Record>, Vec<&Record>) =
        group.into_iter().partition(|record| !record.is_fork);

    let mut families: Vec<ForkFamily> = roots
        .into_iter()
        .map(|root| ForkFamily {
            root: root.clone(),
            forks: Vec::new(),
        })
        .collect();
    let slots: HashMap<String, usize> = families
        .iter()
        .enumerate()
        .map(|(i, family)| (family.root.full_name.clone(), i))
        .collect();

    let mut orphaned = Vec::new();
    for fork in forks {
        match fork.parent.as_ref().and_then(|parent| slots.get(parent)) {
            Some(&slot) => families[slot].forks.push(fork.clone()),
            None => orphaned.push(fork.clone()),
        }
    }

    for family in &mut families {
        family.forks.sort_by(by_stars_then_name);
    }
    families.sort_by(|a, b| by_stars_then_name(&a.root, &b.root));
    orphaned.sort_by(by_stars_then_name);

    FamilyPartition { families, orphaned }
}
