use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    create_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Drop every archive table and recreate the schema from scratch.
pub async fn reset_database(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    sqlx::query("DROP TABLE IF EXISTS snapshots")
        .execute(&pool)
        .await?;
    sqlx::query("DROP TABLE IF EXISTS documents")
        .execute(&pool)
        .await?;

    create_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    // Catalog documents
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            official_title TEXT NOT NULL DEFAULT '',
            title TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT '',
            kind TEXT NOT NULL DEFAULT '',
            start_date TEXT,
            expiry_date TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Snapshots are keyed by content hash alone: identical bytes are
    // archived once, whichever document produced them first.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS snapshots (
            hash TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            pub_date TEXT NOT NULL,
            content BLOB NOT NULL,
            fetched_at INTEGER NOT NULL,
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_snapshots_document_pub_date ON snapshots(document_id, pub_date DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_kind ON documents(kind)")
        .execute(pool)
        .await?;

    Ok(())
}
