//! Reading and writing whole sharded stores.
//!
//! Shard files are independent, so both directions fan out over a bounded
//! rayon pool. Loaded records funnel through one mutex-guarded sink, which
//! is also where duplicate keys across shards are caught.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::StoreOptions;
use crate::errors::{ForkDbError, ForkDbResult};
use crate::models::Record;
use crate::store::sharding::catalog::{read_metadata, write_metadata, StoreMetadata};
use crate::store::sharding::family::{build_families, FamilyPartition, ForkFamily};
use crate::store::sharding::router::{shard_path, SHARD_EXTENSION};
use crate::store::sharding::SHARDED_FORMAT_TAG;
use crate::store::{to_sorted_json, write_atomic, Store};

/// SHA-256 of each shard file as last read or written, keyed by path
/// relative to the store root.
pub type ShardDigests = HashMap<PathBuf, String>;

// ---------------------------------------------------------------------------
// Shard document
// ---------------------------------------------------------------------------

/// On-disk content of one name group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardDocument {
    #[serde(default)]
    pub format: Option<String>,
    pub repo_name: String,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_repos: usize,
    #[serde(default)]
    pub fork_families: Vec<ForkFamily>,
    #[serde(default)]
    pub orphaned_forks: Vec<Record>,
}

impl ShardDocument {
    /// Build the document for the records sharing lower-cased name `key`.
    pub fn from_group(key: &str, group: &[&Record]) -> Self {
        let repo_name = match group.first() {
            Some(first) if group.iter().all(|r| r.name == first.name) => first.name.clone(),
            _ => key.to_string(),
        };
        let FamilyPartition { families, orphaned } = build_families(group.iter().copied());
        Self {
            format: Some(SHARDED_FORMAT_TAG.to_string()),
            repo_name,
            last_updated: group.iter().map(|r| r.last_checked).max(),
            total_repos: group.len(),
            fork_families: families,
            orphaned_forks: orphaned,
        }
    }

    /// Flatten families and orphans back into plain records.
    pub fn into_records(self) -> impl Iterator<Item = Record> {
        FamilyPartition {
            families: self.fork_families,
            orphaned: self.orphaned_forks,
        }
        .into_records()
    }
}

fn decode_shard(path: &Path, bytes: &[u8]) -> ForkDbResult<ShardDocument> {
    let doc: ShardDocument = serde_json::from_slice(bytes)
        .map_err(|e| ForkDbError::corrupt(path, format!("unparsable shard: {e}")))?;
    match doc.format.as_deref() {
        None | Some(SHARDED_FORMAT_TAG) => Ok(doc),
        Some(other) => Err(ForkDbError::corrupt(
            path,
            format!("unsupported format tag {other:?}"),
        )),
    }
}

pub fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Worker pool
// ---------------------------------------------------------------------------

fn run_in_pool<T, F>(workers: usize, job: F) -> T
where
    T: Send,
    F: FnOnce() -> T + Send,
{
    match rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
    {
        Ok(pool) => pool.install(job),
        Err(e) => {
            warn!("could not build shard I/O pool, using the global pool: {e}");
            job()
        }
    }
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

pub(crate) struct ShardedLoad {
    pub records: BTreeMap<String, Record>,
    pub digests: ShardDigests,
}

#[derive(Default)]
struct LoadSink {
    records: BTreeMap<String, Record>,
    origins: HashMap<String, PathBuf>,
    digests: ShardDigests,
}

/// Every `*.json` file exactly two levels below `root`, in path order.
fn shard_files(root: &Path) -> ForkDbResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).min_depth(2).max_depth(2).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
            ForkDbError::io(&path, e.into())
        })?;
        let is_shard = entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == SHARD_EXTENSION);
        if is_shard {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

pub(crate) fn read(root: &Path, options: &StoreOptions) -> ForkDbResult<ShardedLoad> {
    let started = Instant::now();
    let metadata = read_metadata(root)?;
    let files = shard_files(root)?;
    let sink = Mutex::new(LoadSink::default());

    run_in_pool(options.workers, || {
        files.par_iter().try_for_each(|path| -> ForkDbResult<()> {
            let bytes = std::fs::read(path).map_err(|e| ForkDbError::io(path, e))?;
            let doc = decode_shard(path, &bytes)?;
            let relative = path.strip_prefix(root).unwrap_or(path).to_path_buf();
            let shard_digest = digest(&bytes);

            let mut guard = sink.lock();
            guard.digests.insert(relative, shard_digest);
            for mut record in doc.into_records() {
                record.normalize();
                if let Some(first) = guard.origins.get(&record.full_name) {
                    return Err(ForkDbError::corrupt(
                        path,
                        format!(
                            "{} was already loaded from {}",
                            record.full_name,
                            first.display()
                        ),
                    ));
                }
                guard.origins.insert(record.full_name.clone(), path.clone());
                guard.records.insert(record.full_name.clone(), record);
            }
            Ok(())
        })
    })?;

    let LoadSink {
        records, digests, ..
    } = sink.into_inner();

    if let Some(metadata) = &metadata {
        if metadata.total_repos != records.len() {
            warn!(
                root = %root.display(),
                expected = metadata.total_repos,
                found = records.len(),
                "metadata record count disagrees with shard contents"
            );
        }
    }
    debug!(
        root = %root.display(),
        shards = files.len(),
        records = records.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "decoded sharded store"
    );
    Ok(ShardedLoad { records, digests })
}

// ---------------------------------------------------------------------------
// Write
// ---------------------------------------------------------------------------

pub(crate) struct ShardedWrite {
    pub written: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub digests: ShardDigests,
}

struct RenderedShard {
    relative: PathBuf,
    bytes: Vec<u8>,
    digest: String,
}

fn render(key: &str, group: &[&Record]) -> ForkDbResult<RenderedShard> {
    let doc = ShardDocument::from_group(key, group);
    let bytes = to_sorted_json(&doc)?;
    Ok(RenderedShard {
        relative: shard_path(key),
        digest: digest(&bytes),
        bytes,
    })
}

fn write_shard(root: &Path, shard: &RenderedShard) -> ForkDbResult<()> {
    let absolute = root.join(&shard.relative);
    if let Some(dir) = absolute.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ForkDbError::io(dir, e))?;
    }
    write_atomic(&absolute, &shard.bytes)
}

/// Delete shard files that no rendered shard maps to, such as files left
/// under an older naming scheme. Emptied prefix directories go too.
fn remove_stale_shards(root: &Path, rendered: &[RenderedShard]) -> ForkDbResult<usize> {
    let live: HashSet<&Path> = rendered.iter().map(|s| s.relative.as_path()).collect();
    let mut removed = 0;
    for path in shard_files(root)? {
        let relative = path.strip_prefix(root).unwrap_or(&path);
        if live.contains(relative) {
            continue;
        }
        std::fs::remove_file(&path).map_err(|e| ForkDbError::io(&path, e))?;
        debug!(path = %path.display(), "removed stale shard");
        removed += 1;
        if let Some(dir) = path.parent().filter(|dir| *dir != root) {
            // Only succeeds once the directory is empty.
            let _ = std::fs::remove_dir(dir);
        }
    }
    Ok(removed)
}

/// Whether the file on disk already holds `shard`'s bytes.
///
/// With digests from the last load or save of this root they are trusted;
/// otherwise the existing file is hashed.
fn is_current(root: &Path, shard: &RenderedShard, previous: Option<&ShardDigests>) -> bool {
    let absolute = root.join(&shard.relative);
    match previous {
        Some(digests) => {
            digests.get(&shard.relative) == Some(&shard.digest) && absolute.is_file()
        }
        None => std::fs::read(&absolute)
            .map(|bytes| digest(&bytes) == shard.digest)
            .unwrap_or(false),
    }
}

/// Write `store` under `root`, leaving unchanged shards untouched when
/// `options.incremental` is set. The metadata document goes last.
pub(crate) fn write(
    store: &Store,
    root: &Path,
    previous: Option<&ShardDigests>,
    options: &StoreOptions,
) -> ForkDbResult<ShardedWrite> {
    std::fs::create_dir_all(root).map_err(|e| ForkDbError::io(root, e))?;

    let mut groups: BTreeMap<String, Vec<&Record>> = BTreeMap::new();
    for record in store.records() {
        groups.entry(record.name_key()).or_default().push(record);
    }
    let groups: Vec<(String, Vec<&Record>)> = groups.into_iter().collect();

    let rendered: Vec<RenderedShard> = run_in_pool(options.workers, || {
        groups
            .par_iter()
            .map(|(key, group)| render(key, group))
            .collect::<ForkDbResult<Vec<_>>>()
    })?;

    let (pending, current): (Vec<&RenderedShard>, Vec<&RenderedShard>) = rendered
        .iter()
        .partition(|shard| !options.incremental || !is_current(root, shard, previous));

    run_in_pool(options.workers, || {
        pending
            .par_iter()
            .try_for_each(|shard| write_shard(root, shard))
    })?;

    let removed = remove_stale_shards(root, &rendered)?;

    // On a case-insensitive filesystem a stale path can alias a live one,
    // so anything that went missing with the stale files is put back.
    let mut written = pending.len();
    let mut unchanged = 0;
    for shard in &pending {
        if !root.join(&shard.relative).is_file() {
            write_shard(root, shard)?;
        }
    }
    for shard in &current {
        if root.join(&shard.relative).is_file() {
            unchanged += 1;
        } else {
            write_shard(root, shard)?;
            written += 1;
        }
    }

    let metadata = StoreMetadata::new(
        store.updated_at(),
        store.total_repos(),
        store.total_forks(),
        rendered.len(),
        groups.len(),
    );
    write_metadata(root, &metadata)?;

    debug!(
        root = %root.display(),
        written,
        unchanged,
        removed,
        "encoded sharded store"
    );

    let digests = rendered
        .into_iter()
        .map(|shard| (shard.relative, shard.digest))
        .collect();
    Ok(ShardedWrite {
        written,
        unchanged,
        removed,
        digests,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
