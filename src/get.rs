//! Snapshot retrieval by document and date.
//!
//! Used by both the `wetten get` / `wetten versions` CLI commands and the
//! viewer endpoints in [`crate::server`].

use anyhow::{bail, Result};
use chrono::NaiveDate;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::models::{format_stored_date, parse_stored_date};

/// One archived version as shown to readers.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotView {
    pub document_id: String,
    pub title: Option<String>,
    pub pub_date: String,
    pub hash: String,
    pub content: String,
}

/// The latest snapshot of a document, or the latest one published on or
/// before `as_of`.
pub async fn find_snapshot(
    pool: &SqlitePool,
    document_id: &str,
    as_of: Option<NaiveDate>,
) -> Result<Option<SnapshotView>> {
    let row = match as_of {
        Some(date) => {
            sqlx::query(
                r#"
                SELECT s.hash, s.pub_date, s.content, d.title
                FROM snapshots s
                LEFT JOIN documents d ON d.id = s.document_id
                WHERE s.document_id = ? AND s.pub_date <= ?
                ORDER BY s.pub_date DESC
                LIMIT 1
                "#,
            )
            .bind(document_id)
            .bind(format_stored_date(date))
            .fetch_optional(pool)
            .await?
        }
        None => {
            sqlx::query(
                r#"
                SELECT s.hash, s.pub_date, s.content, d.title
                FROM snapshots s
                LEFT JOIN documents d ON d.id = s.document_id
                WHERE s.document_id = ?
                ORDER BY s.pub_date DESC
                LIMIT 1
                "#,
            )
            .bind(document_id)
            .fetch_optional(pool)
            .await?
        }
    };

    Ok(row.map(|row| {
        let content: Vec<u8> = row.get("content");
        let title: Option<String> = row.get("title");
        SnapshotView {
            document_id: document_id.to_string(),
            title: title.filter(|t| !t.is_empty()),
            pub_date: row.get("pub_date"),
            hash: row.get("hash"),
            content: String::from_utf8_lossy(&content).into_owned(),
        }
    }))
}

/// Every publication date archived for a document, oldest first.
/// Unparseable stored dates are skipped.
pub async fn publication_dates(pool: &SqlitePool, document_id: &str) -> Result<Vec<NaiveDate>> {
    let raw: Vec<String> = sqlx::query_scalar(
        "SELECT pub_date FROM snapshots WHERE document_id = ? ORDER BY pub_date ASC",
    )
    .bind(document_id)
    .fetch_all(pool)
    .await?;

    Ok(raw.iter().filter_map(|s| parse_stored_date(s)).collect())
}

/// CLI entry point for `wetten get`.
pub async fn run_get(config: &Config, document_id: &str, as_of: Option<NaiveDate>) -> Result<()> {
    let pool = db::connect(config).await?;
    let snapshot = find_snapshot(&pool, document_id, as_of).await?;
    pool.close().await;

    let Some(snap) = snapshot else {
        match as_of {
            Some(date) => bail!("no snapshot of {} on or before {}", document_id, date),
            None => bail!("document not found: {}", document_id),
        }
    };

    println!("--- Snapshot ---");
    println!("document:     {}", snap.document_id);
    println!("title:        {}", snap.title.as_deref().unwrap_or("(untitled)"));
    println!("published:    {}", snap.pub_date);
    println!("hash:         {}", snap.hash);
    println!();
    println!("{}", snap.content);

    Ok(())
}

/// CLI entry point for `wetten versions`.
pub async fn run_versions(config: &Config, document_id: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let dates = publication_dates(&pool, document_id).await?;
    pool.close().await;

    println!("{}: {} version(s)", document_id, dates.len());
    for date in dates {
        println!("  {}", date);
    }
    Ok(())
}
