//! Membership ledger.
//!
//! Records every release ever added to a genre, and whether the user has
//! since removed it. A removed entry is a tombstone: nothing in this crate
//! turns it back into an active one, so a release the user discarded stays
//! discarded even while it is still sitting in the mailbox.
//!
//! State machine per `(genre, id)`: absent → active → removed.
//!
//! File layout (`ledger.json`):
//!
//! ```text
//! {
//!   "Rock": {
//!     "album_1212060845": {
//!       "url": "https://artist.bandcamp.com/album/x",
//!       "added_at": "2024-11-04T12:00:00+00:00",
//!       "removed_at": "2024-11-05T15:30:00+00:00",
//!       "status": "removed"
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::snapshot::{read_snapshot, write_snapshot, StoreError};
use crate::domain::{timestamp, ContentId};

/// Membership status of a release in one genre
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    #[default]
    Active,

    /// Tombstone
    Removed,
}

/// Ledger record for one `(genre, id)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    #[serde(default)]
    pub url: String,

    #[serde(default, with = "timestamp::option")]
    pub added_at: Option<DateTime<Utc>>,

    #[serde(
        default,
        with = "timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub removed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub status: LedgerStatus,
}

impl LedgerEntry {
    pub fn is_removed(&self) -> bool {
        self.status == LedgerStatus::Removed
    }
}

/// Per-genre record of every release ever added
#[derive(Debug)]
pub struct Ledger {
    path: Option<PathBuf>,
    genres: BTreeMap<String, BTreeMap<ContentId, LedgerEntry>>,
    warnings: Vec<StoreError>,
}

impl Ledger {
    /// Open the ledger file at `path`, degrading to empty on corruption
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut ledger = Self {
            path: Some(path.clone()),
            genres: BTreeMap::new(),
            warnings: Vec::new(),
        };

        type Raw = BTreeMap<String, BTreeMap<String, serde_json::Value>>;
        match read_snapshot::<Raw>(&path) {
            Ok(None) => debug!("No ledger at {}, starting empty", path.display()),
            Ok(Some(raw)) => ledger.load_entries(raw),
            Err(e) => {
                warn!(error = %e, "Ledger unreadable, starting empty");
                ledger.warnings.push(e);
            }
        }

        ledger
    }

    /// A ledger that is never written to disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            genres: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }

    fn load_entries(&mut self, raw: BTreeMap<String, BTreeMap<String, serde_json::Value>>) {
        for (genre, ids) in raw {
            for (id, value) in ids {
                match serde_json::from_value::<LedgerEntry>(value) {
                    Ok(entry) => {
                        self.genres
                            .entry(genre.clone())
                            .or_default()
                            .insert(ContentId::from(id), entry);
                    }
                    Err(source) => {
                        let key = format!("{genre}/{id}");
                        warn!(%key, error = %source, "Skipping malformed ledger entry");
                        self.warnings.push(StoreError::InvalidEntry { key, source });
                    }
                }
            }
        }
    }

    /// Record a release as added. No-op if the ledger already has an entry
    /// for `(genre, id)`, whatever its status. Returns whether an entry was
    /// created.
    pub fn mark_added(&mut self, genre: &str, id: &ContentId, url: &str) -> bool {
        let entries = self.genres.entry(genre.to_string()).or_default();
        if entries.contains_key(id) {
            return false;
        }

        entries.insert(
            id.clone(),
            LedgerEntry {
                url: url.to_string(),
                added_at: Some(Utc::now()),
                removed_at: None,
                status: LedgerStatus::Active,
            },
        );
        true
    }

    /// Tombstone a release. No-op if the ledger never saw it. Returns whether
    /// an entry was found.
    pub fn mark_removed(&mut self, genre: &str, id: &ContentId) -> bool {
        match self.genres.get_mut(genre).and_then(|ids| ids.get_mut(id)) {
            Some(entry) => {
                entry.status = LedgerStatus::Removed;
                entry.removed_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    /// Whether any entry exists for `(genre, id)`, active or removed
    pub fn was_seen(&self, genre: &str, id: &ContentId) -> bool {
        self.entry(genre, id).is_some()
    }

    /// Whether `(genre, id)` is tombstoned
    pub fn was_removed(&self, genre: &str, id: &ContentId) -> bool {
        self.entry(genre, id).is_some_and(LedgerEntry::is_removed)
    }

    pub fn entry(&self, genre: &str, id: &ContentId) -> Option<&LedgerEntry> {
        self.genres.get(genre).and_then(|ids| ids.get(id))
    }

    /// Active entries in `genre`, or across all genres
    pub fn active_count(&self, genre: Option<&str>) -> usize {
        self.count_status(genre, LedgerStatus::Active)
    }

    /// Tombstones in `genre`, or across all genres
    pub fn removed_count(&self, genre: Option<&str>) -> usize {
        self.count_status(genre, LedgerStatus::Removed)
    }

    fn count_status(&self, genre: Option<&str>, status: LedgerStatus) -> usize {
        let count = |ids: &BTreeMap<ContentId, LedgerEntry>| {
            ids.values().filter(|e| e.status == status).count()
        };

        match genre {
            Some(genre) => self.genres.get(genre).map(count).unwrap_or(0),
            None => self.genres.values().map(count).sum(),
        }
    }

    pub fn genres(&self) -> impl Iterator<Item = &str> {
        self.genres.keys().map(String::as_str)
    }

    /// Entries of one genre, ordered by id
    pub fn entries(&self, genre: &str) -> impl Iterator<Item = (&ContentId, &LedgerEntry)> {
        self.genres.get(genre).into_iter().flat_map(|ids| ids.iter())
    }

    /// Write the whole ledger to its file. In-memory ledgers do nothing.
    pub fn persist(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        write_snapshot(path, &self.genres)?;
        debug!(path = %path.display(), "Ledger persisted");
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Problems found while loading
    pub fn warnings(&self) -> &[StoreError] {
        &self.warnings
    }
}
