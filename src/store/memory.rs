//! In-memory [`SnapshotStore`] implementation for tests and dry runs.
//!
//! Uses a `HashMap` keyed by content hash plus an insertion log, both behind
//! a single `std::sync::RwLock` so a hash check and an insert never
//! interleave inconsistently.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::models::{ContentHash, Snapshot};

use super::{InsertOutcome, SnapshotStore};

#[derive(Default)]
struct Inner {
    by_hash: HashMap<ContentHash, Snapshot>,
    log: Vec<ContentHash>,
}

/// In-memory snapshot archive.
pub struct InMemorySnapshotStore {
    inner: RwLock<Inner>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Number of archived snapshots across all documents.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshots of one document, in insertion order.
    pub fn snapshots_for(&self, document_id: &str) -> Vec<Snapshot> {
        let inner = self.inner.read().unwrap();
        inner
            .log
            .iter()
            .filter_map(|h| inner.by_hash.get(h))
            .filter(|s| s.document_id == document_id)
            .cloned()
            .collect()
    }
}

impl Default for InMemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn hash_exists(&self, hash: &ContentHash) -> Result<bool> {
        Ok(self.inner.read().unwrap().by_hash.contains_key(hash))
    }

    async fn insert(&self, snapshot: &Snapshot) -> Result<InsertOutcome> {
        let mut inner = self.inner.write().unwrap();
        if inner.by_hash.contains_key(&snapshot.hash) {
            return Ok(InsertOutcome::Duplicate);
        }
        inner.log.push(snapshot.hash.clone());
        inner.by_hash.insert(snapshot.hash.clone(), snapshot.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn last_known_date(&self, document_id: &str) -> Result<Option<NaiveDate>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .by_hash
            .values()
            .filter(|s| s.document_id == document_id)
            .map(|s| s.pub_date)
            .max())
    }
}
