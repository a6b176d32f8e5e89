//! Three-way reconciliation.
//!
//! Merges the previous collection, the items just fetched from the mailbox
//! and the ids the user marked as listened into the next collection, keeping
//! the ledger up to date on the way.
//!
//! Per genre, independently:
//!
//! 1. Sweep old items. Listened ones are dropped and tombstoned; the rest are
//!    kept and their urls remembered.
//! 2. Admit fetched items, skipping urls already kept and releases the
//!    ledger has tombstoned.
//! 3. Omit genres left empty.
//!
//! The url is the de-duplication key and the [`ContentId`] the removal key:
//! a removal must survive tracking-parameter drift in links, a duplicate
//! check must not merge two distinct links.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::domain::{Collection, CollectionItem, ContentId, FetchedBatch, FetchedItem};
use crate::store::Ledger;

use super::listened::ListenedSet;

/// Counters for one genre (or the sum over all genres)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GenreStats {
    /// Old items carried over
    pub kept: usize,

    /// Fetched items admitted
    pub added: usize,

    /// Old items dropped because they were listened
    pub removed: usize,

    /// Fetched items refused because the ledger has them tombstoned
    pub skipped: usize,

    /// Items dropped because their url was already in the genre
    pub duplicates: usize,

    /// Listened ids that matched nothing and were never tombstoned
    pub unmatched_listened: usize,
}

impl GenreStats {
    /// Size of the genre in the new collection
    pub fn output_len(&self) -> usize {
        self.kept + self.added
    }

    fn absorb(&mut self, other: &GenreStats) {
        self.kept += other.kept;
        self.added += other.added;
        self.removed += other.removed;
        self.skipped += other.skipped;
        self.duplicates += other.duplicates;
        self.unmatched_listened += other.unmatched_listened;
    }
}

/// Outcome counters of a reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub total: GenreStats,
    pub by_genre: BTreeMap<String, GenreStats>,
}

impl ReconcileStats {
    pub fn genre(&self, genre: &str) -> GenreStats {
        self.by_genre.get(genre).copied().unwrap_or_default()
    }

    fn record(&mut self, genre: &str, stats: GenreStats) {
        self.total.absorb(&stats);
        self.by_genre.insert(genre.to_string(), stats);
    }
}

/// Reconciliation engine bound to one ledger for the duration of a run
pub struct Reconciler<'a> {
    ledger: &'a mut Ledger,
}

impl<'a> Reconciler<'a> {
    pub fn new(ledger: &'a mut Ledger) -> Self {
        Self { ledger }
    }

    /// Produce the next collection state
    #[instrument(skip_all, fields(old = old.len(), fetched = fetched.len(), listened = listened.len()))]
    pub fn reconcile(
        &mut self,
        old: &Collection,
        fetched: &FetchedBatch,
        listened: &ListenedSet,
    ) -> (Collection, ReconcileStats) {
        let genres: BTreeSet<&str> = old.genres().chain(fetched.genres()).collect();

        let mut next = Collection::new();
        let mut stats = ReconcileStats::default();

        for genre in genres {
            let (items, genre_stats) = self.reconcile_genre(
                genre,
                old.genre(genre),
                fetched.genre(genre),
                listened.for_genre(genre),
            );

            log_genre(genre, &genre_stats);
            next.set_genre(genre, items);
            stats.record(genre, genre_stats);
        }

        info!(
            kept = stats.total.kept,
            added = stats.total.added,
            removed = stats.total.removed,
            skipped = stats.total.skipped,
            "Reconciliation finished"
        );

        (next, stats)
    }

    fn reconcile_genre(
        &mut self,
        genre: &str,
        old: &[CollectionItem],
        fetched: &[FetchedItem],
        listened: Option<&HashSet<ContentId>>,
    ) -> (Vec<CollectionItem>, GenreStats) {
        let mut stats = GenreStats::default();
        let mut items = Vec::with_capacity(old.len() + fetched.len());
        let mut present: HashSet<String> = HashSet::new();

        for item in old {
            let mut item = item.clone();
            item.genre = genre.to_string();
            item.content_id = item.identity();

            let Some(id) = item.content_id.clone() else {
                // Without an identity nothing can be matched; never drop it.
                items.push(item);
                stats.kept += 1;
                continue;
            };

            if listened.is_some_and(|ids| ids.contains(&id)) {
                // A release the ledger never saw still gets its tombstone.
                self.ledger.mark_added(genre, &id, &item.url);
                self.ledger.mark_removed(genre, &id);
                stats.removed += 1;
                continue;
            }

            if !item.url.is_empty() && !present.insert(item.url.clone()) {
                stats.duplicates += 1;
                continue;
            }

            self.ledger.mark_added(genre, &id, &item.url);
            items.push(item);
            stats.kept += 1;
        }

        for fetched_item in fetched {
            let item = fetched_item.clone().into_collection_item(genre);

            if !item.url.is_empty() && present.contains(&item.url) {
                stats.duplicates += 1;
                continue;
            }

            if let Some(id) = &item.content_id {
                if self.ledger.was_removed(genre, id) {
                    debug!(%genre, %id, url = %item.url, "Skipping previously removed release");
                    stats.skipped += 1;
                    continue;
                }
                self.ledger.mark_added(genre, id, &item.url);
            }

            if !item.url.is_empty() {
                present.insert(item.url.clone());
            }
            items.push(item);
            stats.added += 1;
        }

        if let Some(ids) = listened {
            stats.unmatched_listened = ids
                .iter()
                .filter(|id| !self.ledger.was_removed(genre, id))
                .count();
        }

        (items, stats)
    }
}

/// Reconcile with `ledger` in one call
pub fn reconcile(
    old: &Collection,
    fetched: &FetchedBatch,
    listened: &ListenedSet,
    ledger: &mut Ledger,
) -> (Collection, ReconcileStats) {
    Reconciler::new(ledger).reconcile(old, fetched, listened)
}

fn log_genre(genre: &str, stats: &GenreStats) {
    if stats.added > 0 || stats.removed > 0 || stats.skipped > 0 {
        info!(
            %genre,
            kept = stats.kept,
            added = stats.added,
            removed = stats.removed,
            skipped = stats.skipped,
            "Genre reconciled"
        );
    } else {
        debug!(%genre, kept = stats.kept, "Genre unchanged");
    }

    if stats.unmatched_listened > 0 {
        warn!(
            %genre,
            count = stats.unmatched_listened,
            "Listened ids matched no release; the page may be reporting ids from another scheme"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MailboxCoordinate;

    fn fetched(url: &str, embed: &str, message_id: &str) -> FetchedItem {
        FetchedItem {
            url: url.to_string(),
            embed_code: embed.to_string(),
            subject: String::new(),
            date: String::new(),
            coordinate: MailboxCoordinate::new("imap.test", "me", "INBOX", message_id),
        }
    }

    #[test]
    fn test_item_without_identity_is_kept() {
        let mut old = Collection::new();
        old.push(CollectionItem::new("Rock", "", "<iframe></iframe>"));

        let mut listened = ListenedSet::new();
        listened.insert("Rock", "album_1");

        let mut ledger = Ledger::in_memory();
        let (next, stats) = reconcile(&old, &FetchedBatch::new(), &listened, &mut ledger);

        assert_eq!(next.genre("Rock").len(), 1);
        assert_eq!(stats.genre("Rock").kept, 1);
        assert_eq!(ledger.active_count(None), 0);
    }

    #[test]
    fn test_duplicate_url_in_fetch_batch() {
        let mut batch = FetchedBatch::new();
        batch.push("Rock", fetched("https://a/x", "album=1", "<1>"));
        batch.push("Rock", fetched("https://a/x", "album=1", "<2>"));

        let mut ledger = Ledger::in_memory();
        let (next, stats) = reconcile(&Collection::new(), &batch, &ListenedSet::new(), &mut ledger);

        assert_eq!(next.genre("Rock").len(), 1);
        assert_eq!(stats.genre("Rock").added, 1);
        assert_eq!(stats.genre("Rock").duplicates, 1);
    }

    #[test]
    fn test_unmatched_listened_ignores_old_tombstones() {
        let mut ledger = Ledger::in_memory();
        ledger.mark_added("Rock", &ContentId::from("album_9"), "https://a/9");
        ledger.mark_removed("Rock", &ContentId::from("album_9"));

        let mut listened = ListenedSet::new();
        listened.insert("Rock", "album_9");
        listened.insert("Rock", "embed_123456");

        let mut old = Collection::new();
        old.push(CollectionItem::new("Rock", "https://a/1", "album=1"));

        let (_, stats) = reconcile(&old, &FetchedBatch::new(), &listened, &mut ledger);
        assert_eq!(stats.genre("Rock").unmatched_listened, 1);
    }
}
