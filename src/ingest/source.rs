//! File-backed mailbox source.
//!
//! Reads a mailbox export: a JSON array with one record per message, as
//! produced by an external mail fetcher.
//!
//! ```text
//! [
//!   {
//!     "server": "imap.example.com",
//!     "account": "me@example.com",
//!     "folder": "INBOX/Rock",
//!     "message_id": "<id@host>",
//!     "subject": "New album",
//!     "date": "Mon, 04 Nov 2024 12:00:00 +0000",
//!     "url": "https://artist.bandcamp.com/album/x",
//!     "embed": "<iframe ...>"
//!   }
//! ]
//! ```
//!
//! Records without both a url and an embed code carry no release. A folder
//! with no records is an empty folder, not an error.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use super::harvest::{ExtractedRelease, MailboxSource, SourceError};
use crate::domain::MailboxCoordinate;

#[derive(Debug, Clone, Deserialize)]
struct MailboxRecord {
    server: String,
    account: String,
    folder: String,
    message_id: String,

    #[serde(default)]
    subject: String,

    #[serde(default)]
    date: String,

    #[serde(default)]
    url: Option<String>,

    #[serde(default, alias = "embed_code")]
    embed: Option<String>,
}

impl MailboxRecord {
    fn coordinate(&self) -> MailboxCoordinate {
        MailboxCoordinate::new(&self.server, &self.account, &self.folder, &self.message_id)
    }
}

/// Mailbox source backed by an export file
pub struct JsonMailboxSource {
    /// Folder -> coordinates, in export order
    folders: HashMap<String, Vec<MailboxCoordinate>>,
    messages: HashMap<MailboxCoordinate, MailboxRecord>,
}

impl JsonMailboxSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, SourceError> {
        let records: Vec<MailboxRecord> = serde_json::from_str(content)?;

        let mut folders: HashMap<String, Vec<MailboxCoordinate>> = HashMap::new();
        let mut messages = HashMap::with_capacity(records.len());
        for record in records {
            let coord = record.coordinate();
            if messages.contains_key(&coord) {
                debug!(%coord, "Duplicate record in mailbox export, keeping the first");
                continue;
            }
            folders
                .entry(record.folder.clone())
                .or_default()
                .push(coord.clone());
            messages.insert(coord, record);
        }

        Ok(Self { folders, messages })
    }

    /// Number of distinct messages in the export
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl MailboxSource for JsonMailboxSource {
    fn list(&mut self, folder: &str) -> Result<Vec<MailboxCoordinate>, SourceError> {
        let coords = self.folders.get(folder).cloned().unwrap_or_default();
        if coords.is_empty() {
            debug!(%folder, "No messages in folder");
        }
        Ok(coords)
    }

    fn extract(
        &mut self,
        coord: &MailboxCoordinate,
    ) -> Result<Option<ExtractedRelease>, SourceError> {
        let record = self
            .messages
            .get(coord)
            .ok_or_else(|| SourceError::MessageNotFound(coord.to_string()))?;

        let url = record.url.as_deref().map(str::trim).unwrap_or_default();
        let embed = record.embed.as_deref().map(str::trim).unwrap_or_default();
        if url.is_empty() || embed.is_empty() {
            return Ok(None);
        }

        Ok(Some(ExtractedRelease {
            url: url.to_string(),
            embed_code: embed.to_string(),
            subject: record.subject.clone(),
            date: record.date.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = r#"[
        {"server": "imap.test", "account": "me", "folder": "INBOX/Rock", "message_id": "<1>",
         "subject": "New album", "url": "https://a.bandcamp.com/album/x",
         "embed": "<iframe src=\"EmbeddedPlayer/album=1/\"></iframe>"},
        {"server": "imap.test", "account": "me", "folder": "INBOX/Rock", "message_id": "<2>",
         "subject": "Newsletter"},
        {"server": "imap.test", "account": "me", "folder": "INBOX/Jazz", "message_id": "<3>",
         "url": "https://b.bandcamp.com/track/y", "embed": "track=2"}
    ]"#;

    #[test]
    fn test_list_filters_by_folder() {
        let mut source = JsonMailboxSource::from_json(EXPORT).unwrap();
        assert_eq!(source.len(), 3);

        let rock = source.list("INBOX/Rock").unwrap();
        assert_eq!(rock.len(), 2);
        assert_eq!(rock[0].message_id, "<1>");
        assert_eq!(rock[1].message_id, "<2>");
    }

    #[test]
    fn test_empty_folder_is_not_an_error() {
        let mut source = JsonMailboxSource::from_json(EXPORT).unwrap();
        assert!(source.list("INBOX/Pop").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_message_is_an_error() {
        let mut source = JsonMailboxSource::from_json(EXPORT).unwrap();
        let coord = MailboxCoordinate::new("imap.test", "me", "INBOX/Rock", "<9>");
        assert!(matches!(
            source.extract(&coord),
            Err(SourceError::MessageNotFound(_))
        ));
    }

    #[test]
    fn test_extract_release_and_plain_message() {
        let mut source = JsonMailboxSource::from_json(EXPORT).unwrap();

        let release = source
            .extract(&MailboxCoordinate::new("imap.test", "me", "INBOX/Rock", "<1>"))
            .unwrap()
            .unwrap();
        assert_eq!(release.url, "https://a.bandcamp.com/album/x");
        assert_eq!(release.subject, "New album");

        let none = source
            .extract(&MailboxCoordinate::new("imap.test", "me", "INBOX/Rock", "<2>"))
            .unwrap();
        assert!(none.is_none());
    }
}
