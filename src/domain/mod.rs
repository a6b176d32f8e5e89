//! Domain types for cratedigger.
//!
//! This module contains the core data structures:
//! - Identity: canonical release ids
//! - Items: mailbox coordinates, collection and fetched items
//! - Timestamp: lenient timestamp codec for state files

pub mod identity;
pub mod item;
pub mod timestamp;

// Re-export commonly used types
pub use identity::{canonical_url, ContentId};
pub use item::{
    Collection, CollectionItem, FetchedBatch, FetchedItem, MailboxCoordinate,
    ParseCoordinateError,
};
