//! Archive statistics.
//!
//! Summarizes how many snapshots are archived, in total and per document,
//! for `wetten status` and `GET /status`.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;

/// Per-document snapshot count.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentStats {
    pub id: String,
    pub title: String,
    pub snapshots: i64,
    pub latest: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveStats {
    pub documents: i64,
    pub total_snapshots: i64,
    /// Documents with at least one snapshot, most versions first.
    pub by_document: Vec<DocumentStats>,
}

pub async fn archive_stats(pool: &SqlitePool) -> Result<ArchiveStats> {
    let documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(pool)
        .await?;

    let total_snapshots: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM snapshots")
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query(
        r#"
        SELECT
            s.document_id AS id,
            COALESCE(d.title, '') AS title,
            COUNT(*) AS snapshots,
            MAX(s.pub_date) AS latest
        FROM snapshots s
        LEFT JOIN documents d ON d.id = s.document_id
        GROUP BY s.document_id
        ORDER BY snapshots DESC, s.document_id ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let by_document = rows
        .iter()
        .map(|row| DocumentStats {
            id: row.get("id"),
            title: row.get("title"),
            snapshots: row.get("snapshots"),
            latest: row.get("latest"),
        })
        .collect();

    Ok(ArchiveStats {
        documents,
        total_snapshots,
        by_document,
    })
}

/// Run the status command: query the database and print a summary.
pub async fn run_status(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let stats = archive_stats(&pool).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Archive Status");
    println!("==============");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Documents:   {}", stats.documents);
    println!("  Snapshots:   {}", stats.total_snapshots);

    if !stats.by_document.is_empty() {
        println!();
        println!("  {:<16} {:>9}   {:<10}   {}", "DOCUMENT", "VERSIONS", "LATEST", "TITLE");
        println!("  {}", "-".repeat(76));
        for d in &stats.by_document {
            println!(
                "  {:<16} {:>9}   {:<10}   {}",
                d.id,
                d.snapshots,
                d.latest.as_deref().unwrap_or("-"),
                truncate(&d.title, 40)
            );
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max_chars - 1).collect();
        out.push('…');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn long_titles_are_truncated() {
        assert_eq!(truncate("Grondwet", 40), "Grondwet");
        assert_eq!(truncate("abcdef", 4), "abc…");
    }
}
