//! Cache-first mailbox scan.
//!
//! Lists each configured folder, reuses cached extractions for messages
//! already seen and only asks the source to extract the rest. The cache is
//! consulted before any expensive work, not at reconciliation time.

use std::str::FromStr;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::domain::{FetchedBatch, FetchedItem, MailboxCoordinate};
use crate::store::{CacheEntry, ProcessedCache};

/// Errors raised by a mailbox source
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Folder not found: {0}")]
    FolderNotFound(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A release link found in one email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedRelease {
    pub url: String,
    pub embed_code: String,
    pub subject: String,
    pub date: String,
}

/// Upstream collaborator: something that can list and read a mailbox.
///
/// `list` is expected to be cheap (headers only); `extract` may download the
/// message body and the release page.
pub trait MailboxSource {
    fn list(&mut self, folder: &str) -> Result<Vec<MailboxCoordinate>, SourceError>;

    /// `Ok(None)` when the message carries no release link
    fn extract(
        &mut self,
        coord: &MailboxCoordinate,
    ) -> Result<Option<ExtractedRelease>, SourceError>;
}

/// A mailbox folder and the genre its messages belong to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderSpec {
    pub folder: String,
    pub genre: String,
}

#[derive(Debug, Error)]
#[error("Invalid folder spec {0:?}, expected \"path:genre\" or \"path\"")]
pub struct FolderSpecError(String);

impl FromStr for FolderSpec {
    type Err = FolderSpecError;

    /// `INBOX/Rock:Rock`, or `INBOX/Rock` (genre = last path segment)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (folder, genre) = match s.rsplit_once(':') {
            Some((folder, genre)) if !genre.trim().is_empty() => (folder, genre.trim()),
            Some((folder, _)) => (folder, last_segment(folder)),
            None => (s, last_segment(s)),
        };

        if folder.is_empty() || genre.is_empty() {
            return Err(FolderSpecError(s.to_string()));
        }

        Ok(Self {
            folder: folder.to_string(),
            genre: genre.to_string(),
        })
    }
}

fn last_segment(folder: &str) -> &str {
    folder.rsplit('/').next().unwrap_or(folder).trim()
}

/// Counters of one harvest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarvestReport {
    /// Messages listed across all folders
    pub listed: usize,

    /// Served from the cache without calling `extract`
    pub cached: usize,

    /// Extracted and added to the cache
    pub extracted: usize,

    /// Extracted but carried no release
    pub no_release: usize,

    /// Messages whose extraction failed
    pub failed: usize,

    /// Folders that could not be listed
    pub failed_folders: usize,

    /// Cache writes that failed (the run continues in memory)
    pub persist_failures: usize,
}

/// Mailbox scanner bound to a processed-message cache
pub struct Harvester<'a> {
    cache: &'a mut ProcessedCache,
}

impl<'a> Harvester<'a> {
    pub fn new(cache: &'a mut ProcessedCache) -> Self {
        Self { cache }
    }

    /// Scan `folders` and return the releases found, grouped by genre
    #[instrument(skip_all, fields(folders = folders.len()))]
    pub fn harvest<S: MailboxSource + ?Sized>(
        &mut self,
        source: &mut S,
        folders: &[FolderSpec],
    ) -> (FetchedBatch, HarvestReport) {
        let mut batch = FetchedBatch::new();
        let mut report = HarvestReport::default();

        for spec in folders {
            let coords = match source.list(&spec.folder) {
                Ok(coords) => coords,
                Err(e) => {
                    warn!(folder = %spec.folder, error = %e, "Failed to list folder, skipping");
                    report.failed_folders += 1;
                    continue;
                }
            };
            report.listed += coords.len();

            let extracted_before = report.extracted;
            for coord in coords {
                if let Some(item) = self.scan_message(source, spec, coord, &mut report) {
                    batch.push(spec.genre.clone(), item);
                }
            }

            let new_entries = report.extracted - extracted_before;
            if new_entries > 0 {
                if let Err(e) = self.cache.persist() {
                    warn!(error = %e, "Failed to persist cache, continuing in memory");
                    report.persist_failures += 1;
                }
            }

            info!(
                folder = %spec.folder,
                genre = %spec.genre,
                new = new_entries,
                "Folder scanned"
            );
        }

        info!(
            cached = report.cached,
            extracted = report.extracted,
            failed = report.failed,
            "Harvest finished"
        );

        (batch, report)
    }

    fn scan_message<S: MailboxSource + ?Sized>(
        &mut self,
        source: &mut S,
        spec: &FolderSpec,
        coord: MailboxCoordinate,
        report: &mut HarvestReport,
    ) -> Option<FetchedItem> {
        if let Some(entry) = self.cache.get(&coord) {
            debug!(%coord, "Using cached extraction");
            report.cached += 1;
            return Some(entry.to_fetched_item(&coord));
        }

        match source.extract(&coord) {
            Ok(Some(release)) => {
                let entry = CacheEntry::new(&release.url, &release.embed_code, &spec.genre)
                    .with_subject(&release.subject)
                    .with_date(&release.date);
                let item = entry.to_fetched_item(&coord);

                self.cache.put(coord, entry);
                report.extracted += 1;
                Some(item)
            }
            Ok(None) => {
                debug!(%coord, "No release link in message");
                report.no_release += 1;
                None
            }
            Err(e) => {
                warn!(%coord, error = %e, "Failed to extract message");
                report.failed += 1;
                None
            }
        }
    }
}
