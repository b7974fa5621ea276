//! Read-only queries over a loaded [`Store`](crate::store::Store).
//!
//! Every query borrows the store and returns owned records, so results stay
//! valid after the store is mutated or dropped.

pub mod guards;
pub mod relations;
pub mod sample;
pub mod search;
pub mod stats;

pub use relations::{fork_relationships, get_fork_chain, get_forks, get_parent, ChainEnd, ForkChain};
pub use sample::{random_fork_family, random_sample, FamilySample};
pub use search::{search, top};
pub use stats::{stats, top_forked, StoreStats};
