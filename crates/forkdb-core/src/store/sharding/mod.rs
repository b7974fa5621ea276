//! Directory representation: one shard document per lower-cased repo name.
//!
//! - [`router`] maps a name to its `<prefix>/<escaped-name>.json` path.
//! - [`family`] partitions a name group into fork families and orphans.
//! - [`catalog`] reads and writes the `_metadata.json` summary.
//! - [`codec`] loads and saves whole directories, in parallel.

pub mod catalog;
pub mod codec;
pub mod family;
pub mod router;

/// Format tag carried by the metadata document and every shard.
pub const SHARDED_FORMAT_TAG: &str = "forkdb-sharded/1";
