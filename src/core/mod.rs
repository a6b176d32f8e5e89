//! Core reconciliation logic.
//!
//! This module contains:
//! - Listened: client-reported listened sets and the browser export format
//! - Reconcile: the merge of old collection, fetched items and listened set

pub mod listened;
pub mod reconcile;

// Re-export commonly used types
pub use listened::{sanitize_genre, ListenedSet, BROWSER_KEY_PREFIX};
pub use reconcile::{reconcile, GenreStats, ReconcileStats, Reconciler};
