//! Client-reported "listened" sets.
//!
//! The static site keeps one localStorage entry per genre page,
//! `bandcamp_listened_<Genre_Key>`, holding the ids the user marked as
//! listened. The browser export is a JSON object of those entries; values
//! are either arrays or JSON-encoded array strings.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::domain::ContentId;

/// localStorage key prefix used by the genre pages
pub const BROWSER_KEY_PREFIX: &str = "bandcamp_listened_";

/// Genre name as used in page file names and storage keys: characters other
/// than alphanumerics, `_`, `-` and whitespace dropped, trimmed, spaces
/// replaced by `_`.
pub fn sanitize_genre(genre: &str) -> String {
    let kept: String = genre
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '_' || *c == '-')
        .collect();
    kept.trim().replace(' ', "_")
}

/// Ids the user marked as listened, per genre
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListenedSet {
    genres: HashMap<String, HashSet<ContentId>>,
}

impl ListenedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a browser export file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read listened export: {}", path.display()))?;

        let value: serde_json::Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse listened export JSON: {}", path.display()))?;

        Self::from_browser_export(&value)
            .with_context(|| format!("Unexpected listened export layout: {}", path.display()))
    }

    /// Build from a parsed browser export. Keys without the storage prefix
    /// belong to other pages and are ignored.
    pub fn from_browser_export(value: &serde_json::Value) -> Result<Self> {
        let object = value
            .as_object()
            .context("Listened export must be a JSON object")?;

        let mut set = Self::new();
        for (key, value) in object {
            let Some(genre) = key.strip_prefix(BROWSER_KEY_PREFIX) else {
                debug!(%key, "Ignoring unrelated storage key");
                continue;
            };

            let ids = match value {
                serde_json::Value::Array(items) => items.clone(),
                serde_json::Value::String(encoded) => {
                    match serde_json::from_str::<Vec<serde_json::Value>>(encoded) {
                        Ok(items) => items,
                        Err(e) => {
                            warn!(%genre, error = %e, "Undecodable listened entry, treating as empty");
                            Vec::new()
                        }
                    }
                }
                _ => {
                    warn!(%genre, "Listened entry is neither an array nor a string");
                    Vec::new()
                }
            };

            let entry = set.genres.entry(genre.to_string()).or_default();
            entry.extend(
                ids.iter()
                    .filter_map(serde_json::Value::as_str)
                    .map(ContentId::from),
            );
        }

        Ok(set)
    }

    /// Mark `id` as listened in `genre`
    pub fn insert(&mut self, genre: impl Into<String>, id: impl Into<ContentId>) {
        self.genres.entry(genre.into()).or_default().insert(id.into());
    }

    /// Listened ids for `genre`: exact name first, then its storage-key form
    pub fn for_genre(&self, genre: &str) -> Option<&HashSet<ContentId>> {
        self.genres
            .get(genre)
            .or_else(|| self.genres.get(&sanitize_genre(genre)))
    }

    pub fn genres(&self) -> impl Iterator<Item = &str> {
        self.genres.keys().map(String::as_str)
    }

    /// Total ids across all genres
    pub fn len(&self) -> usize {
        self.genres.values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.genres.values().all(HashSet::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sanitize_genre() {
        assert_eq!(sanitize_genre("Rock"), "Rock");
        assert_eq!(sanitize_genre("Hip Hop"), "Hip_Hop");
        assert_eq!(sanitize_genre(" Drum & Bass "), "Drum__Bass");
        assert_eq!(sanitize_genre("Post-Punk/New Wave"), "Post-PunkNew_Wave");
    }

    #[test]
    fn test_browser_export_array_and_string_values() {
        let export = json!({
            "bandcamp_listened_Rock": ["album_1", "track_2"],
            "bandcamp_listened_Hip_Hop": "[\"album_3\"]",
            "theme": "dark"
        });

        let set = ListenedSet::from_browser_export(&export).unwrap();

        assert_eq!(set.len(), 3);
        assert!(set.for_genre("Rock").unwrap().contains("album_1"));
        assert!(set.for_genre("Rock").unwrap().contains("track_2"));
        assert!(set.for_genre("theme").is_none());
    }

    #[test]
    fn test_lookup_falls_back_to_sanitized_key() {
        let export = json!({ "bandcamp_listened_Hip_Hop": ["album_3"] });
        let set = ListenedSet::from_browser_export(&export).unwrap();

        assert!(set.for_genre("Hip Hop").unwrap().contains("album_3"));
        assert!(set.for_genre("Jazz").is_none());
    }

    #[test]
    fn test_undecodable_string_is_empty() {
        let export = json!({ "bandcamp_listened_Rock": "not json" });
        let set = ListenedSet::from_browser_export(&export).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_rejects_non_object() {
        assert!(ListenedSet::from_browser_export(&json!(["album_1"])).is_err());
    }
}
