//! Runtime options for store I/O.
//!
//! Options are plain values; `StoreOptions::from_env` layers the
//! `FORKDB_*` environment variables over the defaults.

const MAX_WORKERS: usize = 64;
const DEFAULT_WORKER_CAP: usize = 8;

/// Knobs for loading and saving stores.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreOptions {
    /// Thread pool size for parallel shard reads and writes.
    pub workers: usize,
    /// Leave shard files whose content did not change untouched.
    pub incremental: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            workers: available.min(DEFAULT_WORKER_CAP),
            incremental: true,
        }
    }
}

impl StoreOptions {
    /// Defaults overridden by `FORKDB_WORKERS` and `FORKDB_INCREMENTAL`.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Some(workers) = workers_from(std::env::var("FORKDB_WORKERS").ok()) {
            options.workers = workers;
        }
        options.incremental = flag_from(std::env::var("FORKDB_INCREMENTAL").ok(), true);
        options
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.clamp(1, MAX_WORKERS);
        self
    }

    pub fn with_incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }
}

fn workers_from(raw: Option<String>) -> Option<usize> {
    let parsed: usize = raw?.trim().parse().ok()?;
    Some(parsed.clamp(1, MAX_WORKERS))
}

fn flag_from(raw: Option<String>, default: bool) -> bool {
    match raw {
        Some(val) => {
            let v = val.trim().to_lowercase();
            !matches!(v.as_str(), "0" | "false" | "no" | "off")
        }
        None => default,
    }
}
