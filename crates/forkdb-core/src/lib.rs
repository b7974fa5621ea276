//! forkdb core library: a mergeable store of fork relationships between
//! repositories.
//!
//! This crate provides the record model and its field-level merge rule, the
//! flat and sharded on-disk formats behind a single [`Store`], the offline
//! merge engine, and read-only queries over a loaded store.

pub mod config;
pub mod errors;
pub mod merge;
pub mod models;
pub mod query;
pub mod store;

pub use config::StoreOptions;
pub use errors::{ForkDbError, ForkDbResult};
pub use merge::{merge, merge_into, MergeStats};
pub use models::{merge_fields, Record};
pub use store::{SaveReport, Store, StoreFormat};
