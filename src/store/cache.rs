//! Processed-message cache.
//!
//! Remembers what was extracted from every email already scanned, keyed by
//! its mailbox coordinate, so a later scan of the same folder does not fetch
//! and parse the message again.
//!
//! File layout (`cache.json`):
//!
//! ```text
//! {
//!   "imap.example.com:me@example.com:INBOX/Rock:<id@host>": {
//!     "url": "https://artist.bandcamp.com/album/x",
//!     "subject": "...",
//!     "date": "...",
//!     "embed": "<iframe ...>",
//!     "genre": "Rock",
//!     "processed_at": "2024-11-04T12:00:00+00:00"
//!   }
//! }
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::snapshot::{read_snapshot, write_snapshot, StoreError};
use crate::domain::{timestamp, FetchedItem, MailboxCoordinate};

/// Default cache time-to-live in days
pub const DEFAULT_TTL_DAYS: u32 = 90;

/// What was extracted from one email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub url: String,

    #[serde(default)]
    pub subject: String,

    #[serde(default)]
    pub date: String,

    #[serde(default, rename = "embed", alias = "embed_code")]
    pub embed_code: String,

    #[serde(default)]
    pub genre: String,

    /// Stamped by [`ProcessedCache::put`]; `None` if missing or unparsable on disk
    #[serde(default, with = "timestamp::option")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    pub fn new(
        url: impl Into<String>,
        embed_code: impl Into<String>,
        genre: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            subject: String::new(),
            date: String::new(),
            embed_code: embed_code.into(),
            genre: genre.into(),
            processed_at: None,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = date.into();
        self
    }

    /// Rebuild the fetched item this entry was recorded for
    pub fn to_fetched_item(&self, coordinate: &MailboxCoordinate) -> FetchedItem {
        FetchedItem {
            url: self.url.clone(),
            embed_code: self.embed_code.clone(),
            subject: self.subject.clone(),
            date: self.date.clone(),
            coordinate: coordinate.clone(),
        }
    }
}

/// Result of a TTL eviction pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Entries deleted
    pub removed: usize,

    /// Entries kept because they carry no valid timestamp
    pub untimestamped: usize,
}

/// Cache size summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub messages: usize,
    pub servers: usize,
    pub accounts: usize,
    pub folders: usize,
}

/// Keyed store of already-processed mailbox messages
#[derive(Debug)]
pub struct ProcessedCache {
    /// Backing file; `None` for a cache that is never persisted
    path: Option<PathBuf>,

    entries: HashMap<MailboxCoordinate, CacheEntry>,

    /// Problems found while loading
    warnings: Vec<StoreError>,
}

impl ProcessedCache {
    /// Open the cache file at `path`.
    ///
    /// Never fails: a missing file gives an empty cache, an unreadable or
    /// corrupt one gives an empty cache plus a warning. Losing the cache only
    /// costs reprocessing.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut cache = Self {
            path: Some(path.clone()),
            entries: HashMap::new(),
            warnings: Vec::new(),
        };

        match read_snapshot::<BTreeMap<String, serde_json::Value>>(&path) {
            Ok(None) => debug!("No cache at {}, starting empty", path.display()),
            Ok(Some(raw)) => cache.load_entries(raw),
            Err(e) => {
                warn!(error = %e, "Cache unreadable, starting empty");
                cache.warnings.push(e);
            }
        }

        cache
    }

    /// A cache that is never written to disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: HashMap::new(),
            warnings: Vec::new(),
        }
    }

    /// Keep the loaded entries but stop writing them back; `persist` becomes
    /// a no-op.
    pub fn detached(mut self) -> Self {
        self.path = None;
        self
    }

    fn load_entries(&mut self, raw: BTreeMap<String, serde_json::Value>) {
        for (key, value) in raw {
            let coord = match key.parse::<MailboxCoordinate>() {
                Ok(coord) => coord,
                Err(_) => {
                    warn!(%key, "Skipping cache entry with invalid key");
                    self.warnings.push(StoreError::InvalidKey { key });
                    continue;
                }
            };

            match serde_json::from_value::<CacheEntry>(value) {
                Ok(entry) => {
                    self.entries.insert(coord, entry);
                }
                Err(source) => {
                    warn!(%key, error = %source, "Skipping malformed cache entry");
                    self.warnings.push(StoreError::InvalidEntry { key, source });
                }
            }
        }
    }

    /// Whether the message at `coord` was already processed
    pub fn has(&self, coord: &MailboxCoordinate) -> bool {
        self.entries.contains_key(coord)
    }

    pub fn get(&self, coord: &MailboxCoordinate) -> Option<&CacheEntry> {
        self.entries.get(coord)
    }

    /// Insert or replace the entry for `coord`, stamping `processed_at`
    pub fn put(&mut self, coord: MailboxCoordinate, mut entry: CacheEntry) {
        entry.processed_at = Some(Utc::now());
        self.entries.insert(coord, entry);
    }

    /// Delete entries processed more than `days` days ago
    pub fn evict_older_than(&mut self, days: u32) -> EvictionReport {
        self.evict_before(Utc::now() - Duration::days(i64::from(days)))
    }

    /// Delete entries processed before `cutoff`; entries without a
    /// timestamp are left alone.
    pub fn evict_before(&mut self, cutoff: DateTime<Utc>) -> EvictionReport {
        let mut report = EvictionReport::default();

        self.entries.retain(|_, entry| match entry.processed_at {
            Some(ts) if ts < cutoff => {
                report.removed += 1;
                false
            }
            Some(_) => true,
            None => {
                report.untimestamped += 1;
                true
            }
        });

        if report.untimestamped > 0 {
            warn!(
                count = report.untimestamped,
                "Cache entries without a valid timestamp were not evicted"
            );
        }
        debug!(removed = report.removed, %cutoff, "Cache eviction finished");

        report
    }

    /// Drop every entry; returns how many were removed
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn stats(&self) -> CacheStats {
        let mut servers = HashSet::new();
        let mut accounts = HashSet::new();
        let mut folders = HashSet::new();

        for coord in self.entries.keys() {
            servers.insert(coord.server.as_str());
            accounts.insert((coord.server.as_str(), coord.account.as_str()));
            folders.insert((
                coord.server.as_str(),
                coord.account.as_str(),
                coord.folder.as_str(),
            ));
        }

        CacheStats {
            messages: self.entries.len(),
            servers: servers.len(),
            accounts: accounts.len(),
            folders: folders.len(),
        }
    }

    /// Write the whole cache to its file. In-memory caches do nothing.
    pub fn persist(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let snapshot: BTreeMap<String, &CacheEntry> = self
            .entries
            .iter()
            .map(|(coord, entry)| (coord.to_string(), entry))
            .collect();

        write_snapshot(path, &snapshot)?;
        debug!(entries = snapshot.len(), path = %path.display(), "Cache persisted");
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Problems found while loading
    pub fn warnings(&self) -> &[StoreError] {
        &self.warnings
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
