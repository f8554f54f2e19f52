//! `wetten sync`: scan catalog documents for new versions.
//!
//! Wires the configured source, the SQLite archive and the catalog stream
//! into a [`SyncCoordinator`], and stops cleanly on Ctrl-C.

use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;

use crate::catalog;
use crate::config::Config;
use crate::coordinator::{SyncCoordinator, SyncSummary};
use crate::db;
use crate::fetch::HttpFetcher;
use crate::progress::ProgressMode;
use crate::scanner::ScanConfig;
use crate::store::sqlite::SqliteSnapshotStore;

/// Options for one sync run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Sync only these ids instead of the catalog.
    pub ids: Vec<String>,
    pub concurrency: Option<usize>,
    pub progress: ProgressMode,
}

pub async fn run_sync(config: &Config, options: SyncOptions) -> Result<SyncSummary> {
    let pool = db::connect(config).await?;
    let store = Arc::new(SqliteSnapshotStore::new(pool.clone()));
    let fetcher = Arc::new(HttpFetcher::new(&config.source)?);
    let scan = ScanConfig::from_config(config)?;
    let concurrency = options.concurrency.unwrap_or(config.sync.concurrency);

    for id in &options.ids {
        store.register_document(id).await?;
    }

    let coordinator = SyncCoordinator::new(fetcher, store, scan, concurrency)
        .with_progress(Arc::from(options.progress.reporter()));

    let cancel = coordinator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; finishing in-flight scans");
            cancel.cancel();
        }
    });

    let summary = if options.ids.is_empty() {
        coordinator
            .run(catalog::document_ids(&pool, config.sync.kind_filter()))
            .await
    } else {
        coordinator
            .run(futures::stream::iter(options.ids.clone()).boxed())
            .await
    };

    println!("sync");
    println!("  documents scanned: {}", summary.documents);
    println!("  completed: {}", summary.completed);
    println!("  aborted: {}", summary.aborted);
    if summary.cancelled > 0 {
        println!("  cancelled: {}", summary.cancelled);
    }
    println!("  probes: {}", summary.probes);
    println!("  new versions: {}", summary.new_versions);
    println!("ok");

    pool.close().await;
    Ok(summary)
}
