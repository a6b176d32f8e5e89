//! Mailbox ingestion.
//!
//! The pipeline:
//!
//! 1. **Source**: lists folders and extracts release links from messages
//! 2. **Harvester**: consults the processed-message cache first, extracts
//!    only unseen messages and groups the results by genre
//!
//! # Architecture
//!
//! ```text
//! MailboxSource → Harvester → FetchedBatch → Reconciler
//!                    ↕
//!               cache.json
//! ```

pub mod harvest;
pub mod source;

// Re-export key types
pub use harvest::{
    ExtractedRelease, FolderSpec, FolderSpecError, HarvestReport, Harvester, MailboxSource,
    SourceError,
};
pub use source::JsonMailboxSource;
