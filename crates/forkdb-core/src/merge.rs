//! Offline merge of several stores into one.
//!
//! Records are combined field by field with [`merge_fields`]. Nothing is
//! ever removed from the target. Where two observations differ in
//! `last_checked`, the final field values do not depend on source order.
//! On a tie the record already in the target keeps its values. The
//! inserted/updated split in [`MergeStats`] can depend on order even then.

use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use crate::models::merge_fields;
use crate::store::Store;

/// A source record that failed validation and was left out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    pub full_name: String,
    pub reason: String,
}

/// What a merge did, for reporting.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    /// Records new to the target.
    pub inserted: usize,
    /// Existing records whose merged value differs from before.
    pub updated: usize,
    /// Existing records the source had nothing new for.
    pub unchanged: usize,
    /// Populated fields that disagreed and were settled by `last_checked`.
    pub conflicts_resolved: usize,
    pub skipped: Vec<SkippedRecord>,
}

impl MergeStats {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    /// Records that were inserted or changed.
    pub fn changed(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Merge every source into `target`, in order.
pub fn merge(mut target: Store, sources: &[Store]) -> (Store, MergeStats) {
    let mut stats = MergeStats::default();
    for source in sources {
        merge_into(&mut target, source, &mut stats);
    }
    (target, stats)
}

/// Merge one source into `target`, accumulating into `stats`.
///
/// A source record that fails validation is recorded in `stats.skipped`
/// and the rest of the source is still merged.
pub fn merge_into(target: &mut Store, source: &Store, stats: &mut MergeStats) {
    let started = Instant::now();
    let before = stats.clone();

    for incoming in source.records() {
        if let Err(err) = incoming.validate() {
            debug!(full_name = %incoming.full_name, error = %err, "skipping invalid record");
            stats.skipped.push(SkippedRecord {
                full_name: incoming.full_name.clone(),
                reason: err.to_string(),
            });
            continue;
        }

        let Some(existing) = target.get(&incoming.full_name) else {
            target.insert_unchecked(incoming.clone());
            stats.inserted += 1;
            continue;
        };

        let merged = merge_fields(existing, incoming);
        stats.conflicts_resolved += merged.conflicts;
        if &merged.record == existing {
            stats.unchanged += 1;
        } else {
            target.insert_unchecked(merged.record);
            stats.updated += 1;
        }
    }

    info!(
        source = %source.origin().map(|p| p.display().to_string()).unwrap_or_default(),
        inserted = stats.inserted - before.inserted,
        updated = stats.updated - before.updated,
        unchanged = stats.unchanged - before.unchanged,
        skipped = stats.skipped.len() - before.skipped.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "merged source"
    );
}
