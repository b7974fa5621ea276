//! In-memory record store and its two on-disk representations.
//!
//! A [`Store`] is a sorted map from `full_name` to [`Record`] plus a
//! parent → forks index. It is persisted either as one flat JSON document
//! ([`flat`]) or as a directory of per-name shard documents ([`sharding`]).
//! The representation is picked per call; loading auto-detects it.

pub mod flat;
pub mod sharding;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::StoreOptions;
use crate::errors::{ForkDbError, ForkDbResult};
use crate::models::Record;
use crate::store::sharding::codec::{self, ShardDigests};

// ---------------------------------------------------------------------------
// StoreFormat
// ---------------------------------------------------------------------------

/// Which on-disk representation a store uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreFormat {
    Flat,
    Sharded,
}

impl StoreFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreFormat::Flat => "flat",
            StoreFormat::Sharded => "sharded",
        }
    }

    /// Locate an existing store at `path`.
    ///
    /// A directory is sharded and a file is flat. When `path` itself is
    /// missing, a sibling `<stem>.db` directory is accepted as sharded.
    pub fn detect(path: &Path) -> Option<(StoreFormat, PathBuf)> {
        if path.is_dir() {
            return Some((StoreFormat::Sharded, path.to_path_buf()));
        }
        if path.is_file() {
            return Some((StoreFormat::Flat, path.to_path_buf()));
        }
        let db_dir = path.with_extension("db");
        if db_dir.is_dir() {
            return Some((StoreFormat::Sharded, db_dir));
        }
        None
    }

    /// Format for a store that does not exist yet: `.json` paths are flat.
    pub fn for_new_path(path: &Path) -> StoreFormat {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => StoreFormat::Flat,
            _ => StoreFormat::Sharded,
        }
    }
}

impl fmt::Display for StoreFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "flat" => Ok(StoreFormat::Flat),
            "sharded" => Ok(StoreFormat::Sharded),
            other => Err(format!("unknown store format {other:?} (expected flat|sharded)")),
        }
    }
}

// ---------------------------------------------------------------------------
// SaveReport
// ---------------------------------------------------------------------------

/// What a save touched on disk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SaveReport {
    pub format: StoreFormat,
    pub records: usize,
    pub shards_written: usize,
    pub shards_unchanged: usize,
    /// Shard files deleted because no record maps to their path any more.
    pub shards_removed: usize,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Keyed collection of records with derived aggregate counters.
#[derive(Clone, Debug)]
pub struct Store {
    records: BTreeMap<String, Record>,
    forks_by_parent: HashMap<String, BTreeSet<String>>,
    total_forks: usize,
    format: StoreFormat,
    origin: Option<PathBuf>,
    shard_digests: ShardDigests,
}

impl Default for Store {
    fn default() -> Self {
        Self::new(StoreFormat::Flat)
    }
}

impl PartialEq for Store {
    /// Stores are equal when they hold the same records.
    fn eq(&self, other: &Self) -> bool {
        self.records == other.records
    }
}

impl Store {
    pub fn new(format: StoreFormat) -> Self {
        Self {
            records: BTreeMap::new(),
            forks_by_parent: HashMap::new(),
            total_forks: 0,
            format,
            origin: None,
            shard_digests: ShardDigests::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Load / save
    // -----------------------------------------------------------------------

    /// Load the store at `path`, auto-detecting its format.
    pub fn load(path: impl AsRef<Path>) -> ForkDbResult<Self> {
        Self::load_with(path, &StoreOptions::from_env())
    }

    pub fn load_with(path: impl AsRef<Path>, options: &StoreOptions) -> ForkDbResult<Self> {
        let path = path.as_ref();
        let (format, resolved) = StoreFormat::detect(path).ok_or_else(|| ForkDbError::NotFound {
            path: path.to_path_buf(),
        })?;

        let started = Instant::now();
        let mut store = Store::new(format);
        match format {
            StoreFormat::Flat => {
                for record in flat::read(&resolved)? {
                    store.insert_unchecked(record);
                }
            }
            StoreFormat::Sharded => {
                let loaded = codec::read(&resolved, options)?;
                for record in loaded.records.into_values() {
                    store.insert_unchecked(record);
                }
                store.shard_digests = loaded.digests;
            }
        }
        store.origin = Some(resolved);

        info!(
            path = %path.display(),
            format = %format,
            records = store.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "loaded store"
        );
        Ok(store)
    }

    /// Load `path` if it exists, otherwise start an empty store whose format
    /// follows the path (`.json` → flat, anything else → sharded).
    pub fn open_or_create(path: impl AsRef<Path>) -> ForkDbResult<Self> {
        let path = path.as_ref();
        match Self::load(path) {
            Err(ForkDbError::NotFound { .. }) => {
                let format = StoreFormat::for_new_path(path);
                debug!(path = %path.display(), format = %format, "starting empty store");
                Ok(Store::new(format))
            }
            other => other,
        }
    }

    /// Persist to `path`. `format` defaults to the format the store was
    /// loaded (or created) with.
    pub fn save(
        &mut self,
        path: impl AsRef<Path>,
        format: Option<StoreFormat>,
    ) -> ForkDbResult<SaveReport> {
        self.save_with(path, format, &StoreOptions::from_env())
    }

    pub fn save_with(
        &mut self,
        path: impl AsRef<Path>,
        format: Option<StoreFormat>,
        options: &StoreOptions,
    ) -> ForkDbResult<SaveReport> {
        let path = path.as_ref();
        let format = format.unwrap_or(self.format);
        let started = Instant::now();

        let report = match format {
            StoreFormat::Flat => {
                flat::write(self, path)?;
                self.shard_digests.clear();
                SaveReport {
                    format,
                    records: self.len(),
                    shards_written: 0,
                    shards_unchanged: 0,
                    shards_removed: 0,
                }
            }
            StoreFormat::Sharded => {
                let same_target =
                    self.format == StoreFormat::Sharded && self.origin.as_deref() == Some(path);
                let previous = same_target.then_some(&self.shard_digests);
                let outcome = codec::write(self, path, previous, options)?;
                self.shard_digests = outcome.digests;
                SaveReport {
                    format,
                    records: self.len(),
                    shards_written: outcome.written,
                    shards_unchanged: outcome.unchanged,
                    shards_removed: outcome.removed,
                }
            }
        };
        self.format = format;
        self.origin = Some(path.to_path_buf());

        info!(
            path = %path.display(),
            format = %format,
            records = report.records,
            shards_written = report.shards_written,
            shards_unchanged = report.shards_unchanged,
            shards_removed = report.shards_removed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "saved store"
        );
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Record access
    // -----------------------------------------------------------------------

    pub fn get(&self, full_name: &str) -> Option<&Record> {
        self.records.get(full_name)
    }

    pub fn contains(&self, full_name: &str) -> bool {
        self.records.contains_key(full_name)
    }

    /// Names from `full_names` that the store does not track yet, in input order.
    pub fn missing<'a, I>(&self, full_names: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        full_names
            .into_iter()
            .filter(|name| !self.contains(name))
            .map(str::to_string)
            .collect()
    }

    /// Insert or replace a record by `full_name` after validating it.
    ///
    /// Returns the record that was replaced, if any. No field merging
    /// happens here; see [`crate::merge`].
    pub fn put(&mut self, record: Record) -> ForkDbResult<Option<Record>> {
        let mut record = record;
        record.normalize();
        record.validate()?;
        Ok(self.insert_unchecked(record))
    }

    pub(crate) fn insert_unchecked(&mut self, record: Record) -> Option<Record> {
        let name = record.full_name.clone();
        self.link(&record);
        let previous = self.records.insert(name, record);
        if let Some(old) = &previous {
            self.unlink(old);
        }
        previous
    }

    fn link(&mut self, record: &Record) {
        if record.is_fork {
            self.total_forks += 1;
        }
        if let Some(parent) = &record.parent {
            self.forks_by_parent
                .entry(parent.clone())
                .or_default()
                .insert(record.full_name.clone());
        }
    }

    fn unlink(&mut self, record: &Record) {
        if record.is_fork {
            self.total_forks -= 1;
        }
        if let Some(parent) = &record.parent {
            let still_linked = self
                .records
                .get(&record.full_name)
                .is_some_and(|current| current.parent.as_ref() == Some(parent));
            if still_linked {
                return;
            }
            if let Some(children) = self.forks_by_parent.get_mut(parent) {
                children.remove(&record.full_name);
                if children.is_empty() {
                    self.forks_by_parent.remove(parent);
                }
            }
        }
    }

    /// All records, ordered by `full_name`.
    pub fn records(&self) -> impl Iterator<Item = &Record> + '_ {
        self.records.values()
    }

    /// Records whose `parent` is `full_name`, ordered by name.
    pub fn forks_of<'a>(&'a self, full_name: &str) -> impl Iterator<Item = &'a Record> + 'a {
        self.forks_by_parent
            .get(full_name)
            .into_iter()
            .flatten()
            .filter_map(move |name| self.records.get(name))
    }

    /// Every parent name referenced by at least one record, with its fork count.
    pub(crate) fn parent_fan_out(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.forks_by_parent
            .iter()
            .map(|(parent, forks)| (parent.as_str(), forks.len()))
    }

    // -----------------------------------------------------------------------
    // Aggregates
    // -----------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn total_repos(&self) -> usize {
        self.records.len()
    }

    pub fn total_forks(&self) -> usize {
        self.total_forks
    }

    /// Latest `last_checked` across all records.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.records.values().map(|r| r.last_checked).max()
    }

    pub fn format(&self) -> StoreFormat {
        self.format
    }

    /// Where the store was last loaded from or saved to.
    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }
}

// ---------------------------------------------------------------------------
// Shared I/O helpers
// ---------------------------------------------------------------------------

/// Serialize through `serde_json::Value` so object keys come out sorted.
pub(crate) fn to_sorted_json<T: Serialize>(value: &T) -> ForkDbResult<Vec<u8>> {
    let value = serde_json::to_value(value)?;
    let mut bytes = serde_json::to_vec_pretty(&value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Write `bytes` to a sibling temp file, then rename it over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> ForkDbResult<()> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    {
        let mut file =
            std::fs::File::create(&tmp_path).map_err(|e| ForkDbError::io(&tmp_path, e))?;
        file.write_all(bytes)
            .map_err(|e| ForkDbError::io(&tmp_path, e))?;
        file.sync_all().map_err(|e| ForkDbError::io(&tmp_path, e))?;
    }
    std::fs::rename(&tmp_path, path).map_err(|e| ForkDbError::io(path, e))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::ts;
    use tempfile::TempDir;

    fn sample_store() -> Store {
        let mut store = Store::new(StoreFormat::Flat);
        store.put(Record::new("A/x", ts(0)).with_stars(10)).unwrap();
        store.put(Record::fork_of("B/x", "A/x", ts(1)).with_stars(2)).unwrap();
        store.put(Record::fork_of("D/y", "missing/y", ts(2))).unwrap();
        store
    }

    #[test]
    fn test_put_maintains_counters() {
        let store = sample_store();
        assert_eq!(store.total_repos(), 3);
        assert_eq!(store.total_forks(), 2);
        assert_eq!(store.updated_at(), Some(ts(2)));
    }

    #[test]
    fn test_put_replace_relinks_parent_index() {
        let mut store = sample_store();
        let previous = store.put(Record::new("B/x", ts(5))).unwrap();
        assert!(previous.is_some_and(|r| r.is_fork));
        assert_eq!(store.total_forks(), 1);
        assert_eq!(store.forks_of("A/x").count(), 0);

        store.put(Record::fork_of("B/x", "A/x", ts(6))).unwrap();
        store.put(Record::fork_of("B/x", "A/x", ts(7))).unwrap();
        assert_eq!(store.forks_of("A/x").count(), 1);
        assert_eq!(store.total_forks(), 2);
    }

    #[test]
    fn test_put_rejects_invalid_record() {
        let mut store = Store::default();
        let err = store.put(Record::fork_of("a/x", "a/x", ts(0))).unwrap_err();
        assert!(matches!(err, ForkDbError::InvalidRecord { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_missing_reports_untracked_names() {
        let store = sample_store();
        assert_eq!(store.missing(["A/x", "Z/z", "B/x"]), vec!["Z/z".to_string()]);
    }

    #[test]
    fn test_load_missing_path_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = Store::load(dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ForkDbError::NotFound { .. }));
    }

    #[test]
    fn test_open_or_create_picks_format_from_path() {
        let dir = TempDir::new().unwrap();
        let flat = Store::open_or_create(dir.path().join("db.json")).unwrap();
        assert_eq!(flat.format(), StoreFormat::Flat);
        let sharded = Store::open_or_create(dir.path().join("fork-db")).unwrap();
        assert_eq!(sharded.format(), StoreFormat::Sharded);
    }

    #[test]
    fn test_detect_formats() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("db.json");
        std::fs::write(&file, "{}").unwrap();
        assert_eq!(
            StoreFormat::detect(&file),
            Some((StoreFormat::Flat, file.clone()))
        );
        assert_eq!(
            StoreFormat::detect(dir.path()).map(|(f, _)| f),
            Some(StoreFormat::Sharded)
        );

        let db_dir = dir.path().join("other.db");
        std::fs::create_dir(&db_dir).unwrap();
        assert_eq!(
            StoreFormat::detect(&dir.path().join("other.json")),
            Some((StoreFormat::Sharded, db_dir))
        );
    }

    #[test]
    fn test_save_defaults_to_loaded_format_and_round_trips() {
        let dir = TempDir::new().unwrap();
        let options = StoreOptions::default().with_workers(2);
        for format in [StoreFormat::Flat, StoreFormat::Sharded] {
            let path = dir.path().join(format.as_str());
            let mut store = sample_store();
            store.save_with(&path, Some(format), &options).unwrap();

            let mut loaded = Store::load_with(&path, &options).unwrap();
            assert_eq!(loaded.format(), format);
            assert_eq!(loaded, store);
            assert_eq!(loaded.total_forks(), 2);

            let report = loaded.save_with(&path, None, &options).unwrap();
            assert_eq!(report.format, format);
        }
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("Sharded".parse::<StoreFormat>(), Ok(StoreFormat::Sharded));
        assert_eq!("flat".parse::<StoreFormat>(), Ok(StoreFormat::Flat));
        assert!("sqlite".parse::<StoreFormat>().is_err());
    }

    #[test]
    fn test_write_atomic_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.json");
        write_atomic(&path, b"{}\n").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"{}\n");
        assert!(!dir.path().join("doc.json.tmp").exists());
    }
}
