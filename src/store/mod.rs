//! Durable run state.
//!
//! Two process-local stores, each backed by one JSON snapshot file:
//!
//! ```text
//! ~/.cratedigger/
//! ├── cache.json    # processed-message cache (coordinate -> entry)
//! └── ledger.json   # membership ledger (genre -> id -> entry)
//! ```
//!
//! Both are opened at the start of a run and persisted at the end. Neither
//! does any locking; running two writers against the same files loses the
//! first writer's changes, so callers must serialize runs (the CLI holds a
//! lock on the state directory).

pub mod cache;
pub mod ledger;
pub mod snapshot;

pub use cache::{CacheEntry, CacheStats, EvictionReport, ProcessedCache, DEFAULT_TTL_DAYS};
pub use ledger::{Ledger, LedgerEntry, LedgerStatus};
pub use snapshot::StoreError;
