//! Release identity.
//!
//! A [`ContentId`] names one release independently of the URL it was found
//! under. The provider's own numeric id from the embed markup is preferred;
//! only when the markup carries none do we fall back to a hash of the
//! canonical URL.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

static RE_ALBUM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"album=(\d+)").unwrap());
static RE_TRACK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"track=(\d+)").unwrap());

/// Canonical release identifier (`album_<n>`, `track_<n>` or `embed_<hash>`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    /// Resolve the identity of a release from its embed markup and URL.
    ///
    /// Returns `None` only when the markup has no numeric id and the URL is
    /// blank, i.e. there is nothing left to derive an identity from.
    pub fn resolve(embed_code: &str, url: &str) -> Option<Self> {
        Self::from_embed(embed_code).or_else(|| Self::from_url(url))
    }

    /// Extract the provider id from embed markup (`album=` wins over `track=`)
    pub fn from_embed(embed_code: &str) -> Option<Self> {
        if let Some(caps) = RE_ALBUM.captures(embed_code) {
            return Some(Self(format!("album_{}", &caps[1])));
        }
        RE_TRACK
            .captures(embed_code)
            .map(|caps| Self(format!("track_{}", &caps[1])))
    }

    /// Hash the canonical form of a URL (`embed_` + SHA256[0:8] as hex)
    pub fn from_url(url: &str) -> Option<Self> {
        let canonical = canonical_url(url);
        if canonical.is_empty() {
            return None;
        }

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let result = hasher.finalize();

        Some(Self(format!("embed_{}", hex::encode(&result[..8]))))
    }

    /// Get the raw string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ContentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ContentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::borrow::Borrow<str> for ContentId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Strip what varies between two links to the same release: surrounding
/// whitespace, tracking query parameters, fragments and a trailing slash.
pub fn canonical_url(url: &str) -> &str {
    let url = url.trim();
    let end = url.find(['?', '#']).unwrap_or(url.len());
    url[..end].trim_end_matches('/')
}
