//! cratedigger - Mailbox-fed music collection with tombstone-aware sync
//!
//! Builds a per-genre collection of releases from newsletter mail and keeps
//! it in step with what the user has already listened to.
//!
//! # Architecture
//!
//! Each sync merges three inputs:
//! - the previous collection
//! - releases freshly harvested from the mailbox
//! - ids the user marked as listened in the browser
//!
//! A membership ledger remembers every release ever admitted and tombstones
//! the listened ones, so a release removed once never comes back even when
//! its message is harvested again.
//!
//! # Modules
//!
//! - `domain`: Data structures (ContentId, CollectionItem, MailboxCoordinate)
//! - `store`: Persistent state (ProcessedCache, Ledger)
//! - `ingest`: Mailbox harvesting (MailboxSource, Harvester)
//! - `core`: Reconciliation (Reconciler, ListenedSet)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Harvest mail and update the collection
//! cratedigger sync --mailbox export.json --listened listened.json
//!
//! # Inspect tombstones
//! cratedigger ledger show Rock
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod ingest;
pub mod store;

// Re-export main types at crate root for convenience
pub use crate::core::{reconcile, ListenedSet, ReconcileStats, Reconciler};
pub use crate::domain::{Collection, CollectionItem, ContentId, FetchedBatch, FetchedItem, MailboxCoordinate};
pub use crate::ingest::{Harvester, JsonMailboxSource, MailboxSource};
pub use crate::store::{Ledger, ProcessedCache};
