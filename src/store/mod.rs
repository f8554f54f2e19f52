//! Storage abstraction for the snapshot archive.
//!
//! The [`SnapshotStore`] trait is the single shared owner of persisted
//! snapshots. Scanners running concurrently for different documents all go
//! through it, so implementations must serialize conflicting writes
//! internally and be `Send + Sync`.
//!
//! # Hash uniqueness
//!
//! Snapshots are keyed by content hash alone. [`hash_exists`](SnapshotStore::hash_exists)
//! answers for every document, and inserting bytes that another document
//! already archived yields [`InsertOutcome::Duplicate`]. Such a document
//! lists no version of its own for that content.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::models::{ContentHash, Snapshot};

/// Result of a successful insert attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The hash was already archived; nothing was written.
    Duplicate,
}

/// Content-addressed snapshot archive.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`hash_exists`](SnapshotStore::hash_exists) | Has this content ever been archived? |
/// | [`insert`](SnapshotStore::insert) | Archive a newly discovered version |
/// | [`last_known_date`](SnapshotStore::last_known_date) | Latest publication date for a document |
///
/// Genuine storage failures are returned as `Err` and abort the current scan.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// True if any snapshot with this hash is stored, regardless of document.
    async fn hash_exists(&self, hash: &ContentHash) -> Result<bool>;

    /// Archive a snapshot. A hash collision is reported as
    /// [`InsertOutcome::Duplicate`], never as an error.
    async fn insert(&self, snapshot: &Snapshot) -> Result<InsertOutcome>;

    /// Latest stored publication date for a document, if any.
    ///
    /// Implementations return `None` for dates they cannot parse so the
    /// caller falls back to the archive's minimum date.
    async fn last_known_date(&self, document_id: &str) -> Result<Option<NaiveDate>>;
}

/// Date from which the next scan of a document resumes: its latest stored
/// snapshot date, clamped so it never precedes `min_date`.
pub async fn resume_cursor(
    store: &dyn SnapshotStore,
    document_id: &str,
    min_date: NaiveDate,
) -> Result<NaiveDate> {
    let last = store.last_known_date(document_id).await?;
    Ok(last.map_or(min_date, |d| d.max(min_date)))
}

#[cfg(test)]
mod tests {
    use super::memory::InMemorySnapshotStore;
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[tokio::test]
    async fn cursor_defaults_to_min_date() {
        let store = InMemorySnapshotStore::new();
        let cursor = resume_cursor(&store, "BWBR0001840", d(2002, 5, 1))
            .await
            .unwrap();
        assert_eq!(cursor, d(2002, 5, 1));
    }

    #[tokio::test]
    async fn cursor_resumes_from_latest_snapshot() {
        let store = InMemorySnapshotStore::new();
        store
            .insert(&Snapshot::new("A", d(2004, 2, 1), b"v1".to_vec()))
            .await
            .unwrap();
        store
            .insert(&Snapshot::new("A", d(2009, 8, 15), b"v2".to_vec()))
            .await
            .unwrap();
        let cursor = resume_cursor(&store, "A", d(2002, 5, 1)).await.unwrap();
        assert_eq!(cursor, d(2009, 8, 15));
    }

    #[tokio::test]
    async fn cursor_never_precedes_min_date() {
        let store = InMemorySnapshotStore::new();
        store
            .insert(&Snapshot::new("A", d(1999, 1, 1), b"old".to_vec()))
            .await
            .unwrap();
        let cursor = resume_cursor(&store, "A", d(2002, 5, 1)).await.unwrap();
        assert_eq!(cursor, d(2002, 5, 1));
    }
}
