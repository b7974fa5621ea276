//! Single-document store representation.
//!
//! Layout: `{format, updated_at, total_repos, total_forks, repos: {full_name -> record}}`,
//! pretty-printed with sorted keys so unchanged content produces identical bytes.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::errors::{ForkDbError, ForkDbResult};
use crate::models::Record;
use crate::store::{to_sorted_json, write_atomic, Store};

/// Format tag written into every flat document.
pub const FLAT_FORMAT_TAG: &str = "forkdb-flat/1";

#[derive(Serialize)]
struct FlatDocument<'a> {
    format: &'static str,
    updated_at: Option<DateTime<Utc>>,
    total_repos: usize,
    total_forks: usize,
    repos: BTreeMap<&'a str, &'a Record>,
}

/// Render `store` as a flat document.
pub fn encode(store: &Store) -> ForkDbResult<Vec<u8>> {
    let doc = FlatDocument {
        format: FLAT_FORMAT_TAG,
        updated_at: store.updated_at(),
        total_repos: store.total_repos(),
        total_forks: store.total_forks(),
        repos: store.records().map(|r| (r.full_name.as_str(), r)).collect(),
    };
    to_sorted_json(&doc)
}

/// Parse a flat document. `path` is only used for error messages.
///
/// Documents without a `format` tag are accepted as legacy flat files.
pub fn decode(path: &Path, bytes: &[u8]) -> ForkDbResult<Vec<Record>> {
    let doc: Value = serde_json::from_slice(bytes)
        .map_err(|e| ForkDbError::malformed(path, format!("invalid JSON: {e}")))?;
    let Value::Object(mut doc) = doc else {
        return Err(ForkDbError::malformed(path, "top level is not an object"));
    };

    match doc.get("format") {
        None => {}
        Some(Value::String(tag)) if tag == FLAT_FORMAT_TAG => {}
        Some(other) => {
            return Err(ForkDbError::malformed(
                path,
                format!("unsupported format tag {other}"),
            ))
        }
    }

    let repos = match doc.remove("repos") {
        Some(Value::Object(repos)) => repos,
        Some(_) => return Err(ForkDbError::malformed(path, "`repos` is not an object")),
        None => return Err(ForkDbError::malformed(path, "missing `repos`")),
    };

    let mut records = Vec::with_capacity(repos.len());
    for (key, entry) in repos {
        match entry.get("full_name") {
            Some(Value::String(_)) => {}
            _ => {
                return Err(ForkDbError::malformed(
                    path,
                    format!("entry {key:?} lacks full_name"),
                ))
            }
        }
        let mut record: Record = serde_json::from_value(entry)
            .map_err(|e| ForkDbError::malformed(path, format!("entry {key:?}: {e}")))?;
        if record.full_name != key {
            return Err(ForkDbError::malformed(
                path,
                format!("entry {key:?} is keyed differently from its full_name {:?}", record.full_name),
            ));
        }
        record.normalize();
        records.push(record);
    }
    Ok(records)
}

pub(crate) fn read(path: &Path) -> ForkDbResult<Vec<Record>> {
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ForkDbError::NotFound {
            path: path.to_path_buf(),
        },
        _ => ForkDbError::io(path, e),
    })?;
    let records = decode(path, &bytes)?;
    debug!(path = %path.display(), records = records.len(), "decoded flat store");
    Ok(records)
}

pub(crate) fn write(store: &Store, path: &Path) -> ForkDbResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ForkDbError::io(parent, e))?;
    }
    let bytes = encode(store)?;
    write_atomic(path, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::ts;
    use crate::store::StoreFormat;
    use tempfile::TempDir;

    fn store() -> Store {
        let mut store = Store::new(StoreFormat::Flat);
        store.put(Record::new("b/r", ts(0)).with_stars(1)).unwrap();
        store.put(Record::fork_of("a/r", "b/r", ts(3))).unwrap();
        store
    }

    #[test]
    fn test_encode_sorts_keys_and_is_deterministic() {
        let store = store();
        let first = encode(&store).unwrap();
        assert_eq!(first, encode(&store.clone()).unwrap());

        let text = String::from_utf8(first).unwrap();
        let a = text.find("\"a/r\"").unwrap();
        let b = text.find("\"b/r\"").unwrap();
        assert!(a < b);
        assert!(text.find("\"format\"").unwrap() < text.find("\"repos\"").unwrap());
        assert!(text.ends_with("}\n"));
    }

    #[test]
    fn test_round_trip() {
        let store = store();
        let bytes = encode(&store).unwrap();
        let records = decode(Path::new("mem.json"), &bytes).unwrap();
        assert_eq!(records.len(), 2);
        for record in records {
            assert_eq!(store.get(&record.full_name), Some(&record));
        }
    }

    #[test]
    fn test_missing_repos_is_malformed() {
        let err = decode(Path::new("x.json"), br#"{"total_repos": 0}"#).unwrap_err();
        assert!(matches!(err, ForkDbError::MalformedStore { .. }));
    }

    #[test]
    fn test_entry_without_full_name_is_malformed() {
        let bytes = br#"{"repos": {"a/b": {"stars": 3}}}"#;
        let err = decode(Path::new("x.json"), bytes).unwrap_err();
        assert!(err.to_string().contains("lacks full_name"));
    }

    #[test]
    fn test_foreign_format_tag_is_malformed() {
        let bytes = br#"{"format": "other/9", "repos": {}}"#;
        assert!(decode(Path::new("x.json"), bytes).is_err());
    }

    #[test]
    fn test_legacy_document_without_tag_loads() {
        let bytes = br#"{
            "updated_at": "2024-01-01T00:00:00Z",
            "repos": {
                "a/b": {"full_name": "a/b", "is_fork": false, "stars": 7,
                        "last_checked": "2024-01-01T00:00:00.123456Z"}
            }
        }"#;
        let records = decode(Path::new("x.json"), bytes).unwrap();
        assert_eq!(records[0].name, "b");
        assert_eq!(records[0].stars, 7);
    }

    #[test]
    fn test_null_owner_and_name_load() {
        let bytes = br#"{"repos": {"a/b": {"full_name": "a/b", "owner": null, "name": null}}}"#;
        let records = decode(Path::new("x.json"), bytes).unwrap();
        assert_eq!((records[0].owner.as_str(), records[0].name.as_str()), ("a", "b"));
        assert!(records[0].validate().is_ok());
    }

    #[test]
    fn test_read_write_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("db.json");
        let store = store();
        write(&store, &path).unwrap();
        let records = read(&path).unwrap();
        assert_eq!(records.len(), store.len());
    }
}
