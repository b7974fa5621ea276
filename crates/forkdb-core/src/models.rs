//! Record model shared by the codecs, the merge engine and the query engine.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::{ForkDbError, ForkDbResult};

static FULL_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^/\s]+/[^/\s]+$").expect("static pattern"));

fn unix_epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// Explicit `null` decodes as an empty string, left for `normalize` to fill.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Split `owner/name` into its two parts, or `None` if malformed.
pub fn split_full_name(full_name: &str) -> Option<(&str, &str)> {
    if !FULL_NAME_RE.is_match(full_name) {
        return None;
    }
    full_name.split_once('/')
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// One tracked repository and its fork relationship.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub full_name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub owner: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default)]
    pub is_fork: bool,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub stars: u64,
    #[serde(default)]
    pub forks_count: u64,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default = "unix_epoch")]
    pub last_checked: DateTime<Utc>,
}

impl Record {
    /// A non-fork record with `owner`/`name` derived from `full_name`.
    pub fn new(full_name: impl Into<String>, last_checked: DateTime<Utc>) -> Self {
        let full_name = full_name.into();
        let (owner, name) = split_full_name(&full_name)
            .map(|(o, n)| (o.to_string(), n.to_string()))
            .unwrap_or_default();
        Self {
            full_name,
            owner,
            name,
            is_fork: false,
            parent: None,
            source: None,
            stars: 0,
            forks_count: 0,
            language: None,
            description: None,
            html_url: None,
            created_at: None,
            updated_at: None,
            last_checked,
        }
    }

    /// A fork of `parent`. `source` starts out equal to the parent.
    pub fn fork_of(
        full_name: impl Into<String>,
        parent: impl Into<String>,
        last_checked: DateTime<Utc>,
    ) -> Self {
        let parent = parent.into();
        let mut record = Self::new(full_name, last_checked);
        record.is_fork = true;
        record.source = Some(parent.clone());
        record.parent = Some(parent);
        record
    }

    pub fn with_stars(mut self, stars: u64) -> Self {
        self.stars = stars;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Lower-cased `name`, the key records are grouped by when sharded.
    pub fn name_key(&self) -> String {
        self.name.to_lowercase()
    }

    /// Fill `owner`/`name` from `full_name` when a decoded entry omitted them.
    pub(crate) fn normalize(&mut self) {
        if self.owner.is_empty() || self.name.is_empty() {
            if let Some((owner, name)) = split_full_name(&self.full_name) {
                self.owner = owner.to_string();
                self.name = name.to_string();
            }
        }
    }

    /// Check the record-level invariants.
    pub fn validate(&self) -> ForkDbResult<()> {
        let (owner, name) = split_full_name(&self.full_name)
            .ok_or_else(|| ForkDbError::invalid(&self.full_name, "full_name is not owner/name"))?;
        if self.owner != owner || self.name != name {
            return Err(ForkDbError::invalid(
                &self.full_name,
                format!("owner/name {}/{} disagree with full_name", self.owner, self.name),
            ));
        }
        match (&self.parent, self.is_fork) {
            (Some(parent), _) if parent == &self.full_name => {
                Err(ForkDbError::invalid(&self.full_name, "parent equals full_name"))
            }
            (Some(parent), true) if split_full_name(parent).is_none() => Err(
                ForkDbError::invalid(&self.full_name, format!("parent {parent:?} is not owner/name")),
            ),
            (Some(_), false) => Err(ForkDbError::invalid(
                &self.full_name,
                "parent set on a non-fork",
            )),
            (None, true) => Err(ForkDbError::invalid(
                &self.full_name,
                "fork flag without parent",
            )),
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Field-level merge
// ---------------------------------------------------------------------------

/// Result of combining two observations of the same record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldMerge {
    pub record: Record,
    /// Fields populated on both sides with different values.
    pub conflicts: usize,
}

struct Resolver {
    incoming_newer: bool,
    conflicts: usize,
}

impl Resolver {
    fn value<T: Clone + PartialEq>(&mut self, existing: &T, incoming: &T) -> T {
        if existing == incoming {
            return existing.clone();
        }
        self.conflicts += 1;
        if self.incoming_newer {
            incoming.clone()
        } else {
            existing.clone()
        }
    }

    fn option<T: Clone + PartialEq>(&mut self, existing: &Option<T>, incoming: &Option<T>) -> Option<T> {
        match (existing, incoming) {
            (None, _) => incoming.clone(),
            (Some(_), None) => existing.clone(),
            (Some(_), Some(_)) => self.value(existing, incoming),
        }
    }
}

/// Merge two observations of the same `full_name`.
///
/// Missing values are filled from the other side. Disagreements go to the
/// side with the later `last_checked`; ties keep `existing`. `is_fork`,
/// `parent` and `source` move together so lineage is never half-updated.
pub fn merge_fields(existing: &Record, incoming: &Record) -> FieldMerge {
    debug_assert_eq!(existing.full_name, incoming.full_name);

    let mut r = Resolver {
        incoming_newer: incoming.last_checked > existing.last_checked,
        conflicts: 0,
    };

    let (is_fork, parent, source) =
        if existing.is_fork == incoming.is_fork && existing.parent == incoming.parent {
            let source = r.option(&existing.source, &incoming.source);
            (existing.is_fork, existing.parent.clone(), source)
        } else {
            r.conflicts += 1;
            let winner = if r.incoming_newer { incoming } else { existing };
            (winner.is_fork, winner.parent.clone(), winner.source.clone())
        };

    let record = Record {
        full_name: existing.full_name.clone(),
        owner: r.value(&existing.owner, &incoming.owner),
        name: r.value(&existing.name, &incoming.name),
        is_fork,
        parent,
        source,
        stars: r.value(&existing.stars, &incoming.stars),
        forks_count: r.value(&existing.forks_count, &incoming.forks_count),
        language: r.option(&existing.language, &incoming.language),
        description: r.option(&existing.description, &incoming.description),
        html_url: r.option(&existing.html_url, &incoming.html_url),
        created_at: r.option(&existing.created_at, &incoming.created_at),
        updated_at: r.option(&existing.updated_at, &incoming.updated_at),
        last_checked: existing.last_checked.max(incoming.last_checked),
    };

    FieldMerge {
        record,
        conflicts: r.conflicts,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
