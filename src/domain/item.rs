//! Collection and mailbox data types.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::identity::ContentId;

/// Location of one physical email: `(server, account, folder, message_id)`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MailboxCoordinate {
    pub server: String,
    pub account: String,
    pub folder: String,
    pub message_id: String,
}

/// A cache key that does not have the `server:account:folder:message_id` shape
#[derive(Debug, Error)]
#[error("Invalid mailbox coordinate: {0:?}")]
pub struct ParseCoordinateError(pub String);

impl MailboxCoordinate {
    pub fn new(
        server: impl Into<String>,
        account: impl Into<String>,
        folder: impl Into<String>,
        message_id: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            account: account.into(),
            folder: folder.into(),
            message_id: message_id.into(),
        }
    }
}

impl std::fmt::Display for MailboxCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.server, self.account, self.folder, self.message_id
        )
    }
}

impl std::str::FromStr for MailboxCoordinate {
    type Err = ParseCoordinateError;

    /// The message id is the remainder after the third `:` and may contain `:` itself.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(4, ':');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(server), Some(account), Some(folder), Some(message_id))
                if !server.is_empty() && !message_id.is_empty() =>
            {
                Ok(Self::new(server, account, folder, message_id))
            }
            _ => Err(ParseCoordinateError(s.to_string())),
        }
    }
}

/// One release in the collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionItem {
    /// Filled from the collection key on load
    #[serde(default)]
    pub genre: String,

    #[serde(default)]
    pub url: String,

    /// Player markup from the provider
    #[serde(default, rename = "embed", alias = "embed_code")]
    pub embed_code: String,

    #[serde(default)]
    pub subject: String,

    /// Date header of the source email, verbatim
    #[serde(default)]
    pub date: String,

    /// Identity the presentation layer must report back when marking listened
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<ContentId>,
}

impl CollectionItem {
    /// Create an item and resolve its identity
    pub fn new(
        genre: impl Into<String>,
        url: impl Into<String>,
        embed_code: impl Into<String>,
    ) -> Self {
        let url = url.into();
        let embed_code = embed_code.into();
        let content_id = ContentId::resolve(&embed_code, &url);

        Self {
            genre: genre.into(),
            url,
            embed_code,
            subject: String::new(),
            date: String::new(),
            content_id,
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

    /// Identity derived from the current embed code and URL.
    ///
    /// Stored `content_id` values are not trusted: they may have been written
    /// under a different identity scheme.
    pub fn identity(&self) -> Option<ContentId> {
        ContentId::resolve(&self.embed_code, &self.url)
    }
}

/// Genre-partitioned collection (`genre -> [item]`), the downstream document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Collection {
    genres: BTreeMap<String, Vec<CollectionItem>>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a collection file. A missing file is an empty collection.
    ///
    /// Unlike the cache and ledger, a corrupt collection is an error: it is
    /// user data, and degrading to empty would overwrite it on the next save.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No collection at {}, starting empty", path.display());
            return Ok(Self::new());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read collection: {}", path.display()))?;

        let mut collection: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse collection JSON: {}", path.display()))?;
        collection.stamp_genres();

        Ok(collection)
    }

    /// Write the collection atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        crate::store::snapshot::write_snapshot(path, self)?;
        Ok(())
    }

    fn stamp_genres(&mut self) {
        for (genre, items) in &mut self.genres {
            for item in items.iter_mut() {
                item.genre.clone_from(genre);
            }
        }
    }

    /// Append an item under its own genre
    pub fn push(&mut self, item: CollectionItem) {
        self.genres.entry(item.genre.clone()).or_default().push(item);
    }

    /// Replace a genre's items; an empty list removes the genre
    pub fn set_genre(&mut self, genre: impl Into<String>, items: Vec<CollectionItem>) {
        let genre = genre.into();
        if items.is_empty() {
            self.genres.remove(&genre);
        } else {
            self.genres.insert(genre, items);
        }
    }

    /// Items of one genre (empty if the genre is absent)
    pub fn genre(&self, genre: &str) -> &[CollectionItem] {
        self.genres.get(genre).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_genre(&self, genre: &str) -> bool {
        self.genres.contains_key(genre)
    }

    pub fn genres(&self) -> impl Iterator<Item = &str> {
        self.genres.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[CollectionItem])> {
        self.genres.iter().map(|(g, items)| (g.as_str(), items.as_slice()))
    }

    /// Total number of items across all genres
    pub fn len(&self) -> usize {
        self.genres.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.genres.values().all(Vec::is_empty)
    }
}

/// One release observed in the mailbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedItem {
    pub url: String,

    #[serde(default, rename = "embed", alias = "embed_code")]
    pub embed_code: String,

    #[serde(default)]
    pub subject: String,

    #[serde(default)]
    pub date: String,

    pub coordinate: MailboxCoordinate,
}

impl FetchedItem {
    /// Convert into a collection item under `genre`
    pub fn into_collection_item(self, genre: &str) -> CollectionItem {
        CollectionItem::new(genre, self.url, self.embed_code)
            .with_subject(self.subject)
            .with_date(self.date)
    }
}

/// Output of a mailbox scan, grouped by genre
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FetchedBatch {
    genres: BTreeMap<String, Vec<FetchedItem>>,
}

impl FetchedBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a batch written by `harvest --output`
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fetched items: {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse fetched items JSON: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        crate::store::snapshot::write_snapshot(path, self)?;
        Ok(())
    }

    pub fn push(&mut self, genre: impl Into<String>, item: FetchedItem) {
        self.genres.entry(genre.into()).or_default().push(item);
    }

    pub fn genre(&self, genre: &str) -> &[FetchedItem] {
        self.genres.get(genre).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn genres(&self) -> impl Iterator<Item = &str> {
        self.genres.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.genres.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.genres.values().all(Vec::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_round_trips_through_key() {
        let coord = MailboxCoordinate::new("imap.example.com", "me@example.com", "INBOX/Rock", "<a:b@host>");
        let key = coord.to_string();

        assert_eq!(key, "imap.example.com:me@example.com:INBOX/Rock:<a:b@host>");
        assert_eq!(key.parse::<MailboxCoordinate>().unwrap(), coord);
    }

    #[test]
    fn test_coordinate_rejects_short_keys() {
        assert!("imap.example.com:me".parse::<MailboxCoordinate>().is_err());
        assert!("a:b:c:".parse::<MailboxCoordinate>().is_err());
    }

    #[test]
    fn test_collection_reads_legacy_export() {
        let json = r#"{
            "Rock": [
                {
                    "url": "https://artist.bandcamp.com/album/a",
                    "embed": "<iframe src=\"https://bandcamp.com/EmbeddedPlayer/album=111/\"></iframe>",
                    "subject": "New release",
                    "date": "Mon, 04 Nov 2024 12:00:00 +0000",
                    "date_obj": "2024-11-04T12:00:00+00:00",
                    "sender": "Artist <noreply@bandcamp.com>",
                    "folder": "INBOX/Rock"
                }
            ]
        }"#;

        let mut collection: Collection = serde_json::from_str(json).unwrap();
        collection.stamp_genres();

        let rock = collection.genre("Rock");
        assert_eq!(rock.len(), 1);
        assert_eq!(rock[0].genre, "Rock");
        assert_eq!(rock[0].identity().unwrap().as_str(), "album_111");
        assert!(collection.genre("Jazz").is_empty());
    }

    #[test]
    fn test_set_genre_drops_empty() {
        let mut collection = Collection::new();
        collection.push(CollectionItem::new("Rock", "https://a", ""));
        assert!(collection.contains_genre("Rock"));

        collection.set_genre("Rock", Vec::new());
        assert!(!collection.contains_genre("Rock"));
        assert!(collection.is_empty());
    }
}
