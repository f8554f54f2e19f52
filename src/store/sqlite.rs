//! SQLite-backed [`SnapshotStore`] implementation.
//!
//! Each insert runs in its own transaction; the `hash` primary key resolves
//! concurrent inserts of the same content, and the losing insert is reported
//! as a duplicate.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::SqlitePool;

use crate::models::{format_stored_date, parse_stored_date, ContentHash, Snapshot};

use super::{InsertOutcome, SnapshotStore};

/// SQLite implementation of the [`SnapshotStore`] trait.
pub struct SqliteSnapshotStore {
    pool: SqlitePool,
}

impl SqliteSnapshotStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Make sure a documents row exists for `document_id` so snapshots of
    /// ids outside the catalog can be stored.
    pub async fn register_document(&self, document_id: &str) -> Result<()> {
        sqlx::query("INSERT INTO documents (id) VALUES (?) ON CONFLICT(id) DO NOTHING")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn hash_exists(&self, hash: &ContentHash) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM snapshots WHERE hash = ?")
            .bind(hash.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn insert(&self, snapshot: &Snapshot) -> Result<InsertOutcome> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO snapshots (hash, document_id, pub_date, content, fetched_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(hash) DO NOTHING
            "#,
        )
        .bind(snapshot.hash.as_str())
        .bind(&snapshot.document_id)
        .bind(format_stored_date(snapshot.pub_date))
        .bind(&snapshot.content)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if result.rows_affected() == 0 {
            Ok(InsertOutcome::Duplicate)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }

    async fn last_known_date(&self, document_id: &str) -> Result<Option<NaiveDate>> {
        let raw: Option<String> = sqlx::query_scalar(
            "SELECT pub_date FROM snapshots WHERE document_id = ? ORDER BY pub_date DESC LIMIT 1",
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(raw.and_then(|s| {
            let parsed = parse_stored_date(&s);
            if parsed.is_none() {
                tracing::warn!(
                    document = document_id,
                    pub_date = %s,
                    "malformed stored publication date; resuming from minimum date"
                );
            }
            parsed
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::{db, migrate};
    use tempfile::TempDir;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    async fn open_store(tmp: &TempDir) -> SqliteSnapshotStore {
        let cfg = parse_config(&format!(
            "[db]\npath = \"{}\"\n",
            tmp.path().join("archive.sqlite").display()
        ))
        .unwrap();
        let pool = db::connect(&cfg).await.unwrap();
        migrate::create_schema(&pool).await.unwrap();
        SqliteSnapshotStore::new(pool)
    }

    #[tokio::test]
    async fn insert_then_duplicate() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        store.register_document("BWBR0001840").await.unwrap();

        let snap = Snapshot::new("BWBR0001840", d(2006, 4, 2), b"<wet/>".to_vec());
        assert!(!store.hash_exists(&snap.hash).await.unwrap());
        assert_eq!(store.insert(&snap).await.unwrap(), InsertOutcome::Inserted);
        assert!(store.hash_exists(&snap.hash).await.unwrap());
        assert_eq!(store.insert(&snap).await.unwrap(), InsertOutcome::Duplicate);
        assert_eq!(
            store.last_known_date("BWBR0001840").await.unwrap(),
            Some(d(2006, 4, 2))
        );
    }

    #[tokio::test]
    async fn last_known_date_picks_latest() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        store.register_document("A").await.unwrap();
        for (date, body) in [(d(2003, 1, 5), "v1"), (d(2011, 12, 1), "v3"), (d(2008, 6, 9), "v2")] {
            store
                .insert(&Snapshot::new("A", date, body.as_bytes().to_vec()))
                .await
                .unwrap();
        }
        assert_eq!(store.last_known_date("A").await.unwrap(), Some(d(2011, 12, 1)));
        assert_eq!(store.last_known_date("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn malformed_stored_date_reads_as_none() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        store.register_document("A").await.unwrap();
        sqlx::query(
            "INSERT INTO snapshots (hash, document_id, pub_date, content, fetched_at) VALUES ('h', 'A', '31-02-2004', x'00', 0)",
        )
        .execute(store.pool())
        .await
        .unwrap();
        assert_eq!(store.last_known_date("A").await.unwrap(), None);
    }

    #[tokio::test]
    async fn unregistered_document_is_a_storage_error() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        let snap = Snapshot::new("UNKNOWN", d(2006, 4, 2), b"x".to_vec());
        assert!(store.insert(&snap).await.is_err());
    }
}
