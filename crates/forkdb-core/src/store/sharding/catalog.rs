//! `_metadata.json`: the summary document at the root of a sharded store.
//!
//! It is written after every shard so its counts never describe shard
//! files that are not on disk yet.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{ForkDbError, ForkDbResult};
use crate::store::sharding::SHARDED_FORMAT_TAG;
use crate::store::{to_sorted_json, write_atomic};

/// File name of the metadata document inside a sharded store.
pub const METADATA_FILE: &str = "_metadata.json";

/// Store-wide totals for a sharded store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMetadata {
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_repos: usize,
    #[serde(default)]
    pub total_forks: usize,
    #[serde(default)]
    pub total_files: usize,
    #[serde(default, alias = "unique_repo_names")]
    pub unique_names: usize,
}

impl StoreMetadata {
    pub fn new(
        updated_at: Option<DateTime<Utc>>,
        total_repos: usize,
        total_forks: usize,
        total_files: usize,
        unique_names: usize,
    ) -> Self {
        Self {
            format: Some(SHARDED_FORMAT_TAG.to_string()),
            updated_at,
            total_repos,
            total_forks,
            total_files,
            unique_names,
        }
    }
}

/// Read the metadata document, `None` if the store has none yet.
pub fn read_metadata(root: &Path) -> ForkDbResult<Option<StoreMetadata>> {
    let path = root.join(METADATA_FILE);
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ForkDbError::io(&path, e)),
    };
    let metadata: StoreMetadata = serde_json::from_slice(&bytes)
        .map_err(|e| ForkDbError::corrupt(&path, format!("invalid metadata: {e}")))?;
    match metadata.format.as_deref() {
        None | Some(SHARDED_FORMAT_TAG) => Ok(Some(metadata)),
        Some(other) => Err(ForkDbError::corrupt(
            &path,
            format!("unsupported format tag {other:?}"),
        )),
    }
}

pub fn write_metadata(root: &Path, metadata: &StoreMetadata) -> ForkDbResult<()> {
    let bytes = to_sorted_json(metadata)?;
    write_atomic(&root.join(METADATA_FILE), &bytes)
}
