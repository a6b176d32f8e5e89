//! Canonical state file names.
//!
//! Single source of truth - import this instead of hardcoding file names.
//!
//! | File | Owner | Purpose |
//! |------|-------|---------|
//! | `cache.json` | Harvester | Processed-message cache |
//! | `ledger.json` | Reconciler | Membership ledger / tombstones |
//! | `collection.json` | Reconciler | Default collection location |
//! | `.lock` | CLI | Serializes runs against one state directory |

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use fs2::FileExt;

/// Processed-message cache, inside the state directory
pub const CACHE_FILE: &str = "cache.json";

/// Membership ledger, inside the state directory
pub const LEDGER_FILE: &str = "ledger.json";

/// Collection, when no other location is configured
pub const COLLECTION_FILE: &str = "collection.json";

/// Advisory lock file
pub const LOCK_FILE: &str = ".lock";

/// Exclusive hold on a state directory; released on drop
#[derive(Debug)]
pub struct StateLock {
    file: File,
}

impl StateLock {
    /// Take the lock at `path` without waiting
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create state directory: {}", parent.display()))?;
        }

        let file = File::create(path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))?;
        file.try_lock_exclusive().with_context(|| {
            format!(
                "Another cratedigger run holds {}; wait for it to finish",
                path.display()
            )
        })?;

        Ok(Self { file })
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
