//! State File Integration Tests
//!
//! Loading, degrading and persisting the cache and ledger files.

use cratedigger::domain::{ContentId, MailboxCoordinate};
use cratedigger::store::{CacheEntry, Ledger, LedgerStatus, ProcessedCache, StoreError};
use tempfile::TempDir;

#[test]
fn test_corrupt_cache_degrades_to_empty() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("cache.json");
    std::fs::write(&path, "{ not json").unwrap();

    let mut cache = ProcessedCache::open(&path);
    assert!(cache.is_empty());
    assert_eq!(cache.warnings().len(), 1);
    assert!(matches!(cache.warnings()[0], StoreError::Parse { .. }));

    // The next persist replaces the corrupt file
    let coord = MailboxCoordinate::new("imap.test", "me", "INBOX", "<1>");
    cache.put(coord.clone(), CacheEntry::new("https://a.bandcamp.com/album/a", "album=1", "Rock"));
    cache.persist().unwrap();

    let reopened = ProcessedCache::open(&path);
    assert!(reopened.warnings().is_empty());
    assert!(reopened.has(&coord));
}

#[test]
fn test_corrupt_ledger_degrades_to_empty() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("ledger.json");
    std::fs::write(&path, "[1, 2, 3]").unwrap();

    let ledger = Ledger::open(&path);
    assert_eq!(ledger.active_count(None), 0);
    assert_eq!(ledger.removed_count(None), 0);
    assert_eq!(ledger.warnings().len(), 1);
}

#[test]
fn test_missing_files_are_not_warnings() {
    let temp = TempDir::new().unwrap();

    let cache = ProcessedCache::open(temp.path().join("cache.json"));
    let ledger = Ledger::open(temp.path().join("ledger.json"));

    assert!(cache.is_empty());
    assert!(cache.warnings().is_empty());
    assert!(ledger.warnings().is_empty());
}

#[test]
fn test_legacy_ledger_with_naive_timestamps() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("ledger.json");
    std::fs::write(
        &path,
        r#"{
  "Rock": {
    "album_111": {
      "url": "https://a.bandcamp.com/album/a",
      "added_at": "2024-11-04T12:00:00.123456",
      "removed_at": "2024-12-01T08:30:00",
      "status": "removed"
    },
    "album_222": {
      "url": "https://b.bandcamp.com/album/b",
      "added_at": "2024-11-05T09:00:00",
      "status": "active"
    },
    "album_333": "garbage"
  }
}"#,
    )
    .unwrap();

    let ledger = Ledger::open(&path);

    assert!(ledger.was_removed("Rock", &ContentId::from("album_111")));
    let entry = ledger.entry("Rock", &ContentId::from("album_222")).unwrap();
    assert_eq!(entry.status, LedgerStatus::Active);
    assert_eq!(
        entry.added_at.unwrap().to_rfc3339(),
        "2024-11-05T09:00:00+00:00"
    );

    // The malformed entry is skipped, not the whole file
    assert!(!ledger.was_seen("Rock", &ContentId::from("album_333")));
    assert_eq!(ledger.warnings().len(), 1);
    assert!(matches!(ledger.warnings()[0], StoreError::InvalidEntry { .. }));
}

#[test]
fn test_legacy_cache_entries_load() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("cache.json");
    std::fs::write(
        &path,
        r#"{
  "imap.gmail.com:me@example.com:INBOX/Rock:<abc@mail>": {
    "url": "https://a.bandcamp.com/album/a",
    "subject": "New album",
    "date": "Mon, 04 Nov 2024 12:00:00 +0000",
    "embed": "album=1",
    "genre": "Rock",
    "processed_at": "2024-11-04T12:00:00.000001"
  },
  "no-separators": {"url": "x"}
}"#,
    )
    .unwrap();

    let cache = ProcessedCache::open(&path);
    let coord = MailboxCoordinate::new("imap.gmail.com", "me@example.com", "INBOX/Rock", "<abc@mail>");

    let entry = cache.get(&coord).unwrap();
    assert_eq!(entry.genre, "Rock");
    assert!(entry.processed_at.is_some());
    assert_eq!(cache.len(), 1);
    assert!(matches!(cache.warnings()[0], StoreError::InvalidKey { .. }));
}

#[test]
fn test_ledger_mark_added_idempotent_across_reopen() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("ledger.json");
    let id = ContentId::from("track_42");

    let mut ledger = Ledger::open(&path);
    assert!(ledger.mark_added("Jazz", &id, "https://j.bandcamp.com/track/t"));
    ledger.persist().unwrap();
    let first = ledger.entry("Jazz", &id).unwrap().clone();

    let mut ledger = Ledger::open(&path);
    assert!(!ledger.mark_added("Jazz", &id, "https://j.bandcamp.com/track/other"));
    assert_eq!(ledger.entry("Jazz", &id), Some(&first));
    assert_eq!(ledger.active_count(Some("Jazz")), 1);
}

#[test]
fn test_evicted_cache_entries_leave_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("cache.json");
    std::fs::write(
        &path,
        r#"{
  "imap.test:me:INBOX:<old>": {"url": "https://o.bandcamp.com/album/o", "processed_at": "2020-01-01T00:00:00"},
  "imap.test:me:INBOX:<undated>": {"url": "https://u.bandcamp.com/album/u"}
}"#,
    )
    .unwrap();

    let mut cache = ProcessedCache::open(&path);
    cache.put(
        MailboxCoordinate::new("imap.test", "me", "INBOX", "<new>"),
        CacheEntry::new("https://n.bandcamp.com/album/n", "album=3", "Rock"),
    );

    let report = cache.evict_older_than(90);
    assert_eq!(report.removed, 1);
    assert_eq!(report.untimestamped, 1);
    cache.persist().unwrap();

    let reopened = ProcessedCache::open(&path);
    assert_eq!(reopened.len(), 2);
    assert!(!reopened.has(&MailboxCoordinate::new("imap.test", "me", "INBOX", "<old>")));
}

#[test]
fn test_ledger_write_failure_keeps_memory_state() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("ledger.json");
    std::fs::create_dir(&path).unwrap();

    let mut ledger = Ledger::open(&path);
    let id = ContentId::from("album_5");
    ledger.mark_added("Rock", &id, "https://r.bandcamp.com/album/r");
    ledger.mark_removed("Rock", &id);

    assert!(matches!(ledger.persist(), Err(StoreError::Write { .. })));
    assert!(ledger.was_removed("Rock", &id));
    assert!(path.is_dir());
}
