//! Bounded-concurrency scanning across the catalog.
//!
//! [`SyncCoordinator`] pulls document ids from a stream and keeps at most
//! `concurrency` [`VersionScanner`]s running at once. A slot is refilled from
//! the stream as soon as any scan finishes, successfully or not. The stream is
//! drained once, duplicate ids are skipped, and a short stream simply runs
//! fewer scans in parallel.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use futures::{FutureExt, Stream, StreamExt};
use std::panic::AssertUnwindSafe;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::fetch::Fetcher;
use crate::progress::{NoProgress, SyncProgressEvent, SyncProgressReporter};
use crate::scanner::{ScanConfig, ScanOutcome, ScanReport, VersionScanner};
use crate::store::SnapshotStore;

/// Totals for one coordinator run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub documents: u64,
    pub completed: u64,
    pub aborted: u64,
    pub cancelled: u64,
    pub probes: u64,
    pub new_versions: u64,
    pub skipped_duplicates: u64,
}

impl SyncSummary {
    fn record(&mut self, report: &ScanReport) {
        self.documents += 1;
        self.probes += report.probes as u64;
        self.new_versions += report.new_versions as u64;
        match report.outcome {
            ScanOutcome::Completed => self.completed += 1,
            ScanOutcome::Aborted(_) => self.aborted += 1,
            ScanOutcome::Cancelled => self.cancelled += 1,
        }
    }
}

pub struct SyncCoordinator {
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn SnapshotStore>,
    scan: ScanConfig,
    concurrency: usize,
    until: Option<NaiveDate>,
    cancel: CancellationToken,
    progress: Arc<dyn SyncProgressReporter>,
}

impl SyncCoordinator {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn SnapshotStore>,
        scan: ScanConfig,
        concurrency: usize,
    ) -> Self {
        Self {
            fetcher,
            store,
            scan,
            concurrency: concurrency.max(1),
            until: None,
            cancel: CancellationToken::new(),
            progress: Arc::new(NoProgress),
        }
    }

    /// Scan up to this date instead of today.
    pub fn with_until(mut self, until: NaiveDate) -> Self {
        self.until = Some(until);
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn SyncProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Token that stops the run: no new scans start, running scans stop at
    /// their next fetch or storage call.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Scan every id from `ids`, at most `concurrency` at a time, and return
    /// once the stream is exhausted and every started scan has finished.
    pub async fn run<S>(&self, ids: S) -> SyncSummary
    where
        S: Stream<Item = String> + Unpin,
    {
        let until = self
            .until
            .unwrap_or_else(|| chrono::Utc::now().date_naive());
        let mut ids = ids;
        let mut tasks: JoinSet<ScanReport> = JoinSet::new();
        // Holds every id started in this run; memory grows with the stream.
        // Catalog streams never repeat an id, so this only matters for
        // caller-supplied lists.
        let mut seen: HashSet<String> = HashSet::new();
        let mut summary = SyncSummary::default();
        let mut exhausted = false;

        tracing::info!(concurrency = self.concurrency, until = %until, "sync started");

        loop {
            while !exhausted && tasks.len() < self.concurrency {
                if self.cancel.is_cancelled() {
                    exhausted = true;
                    break;
                }
                match ids.next().await {
                    Some(id) => {
                        if !seen.insert(id.clone()) {
                            summary.skipped_duplicates += 1;
                            continue;
                        }
                        self.spawn_scan(&mut tasks, id, until);
                    }
                    None => exhausted = true,
                }
            }

            match tasks.join_next().await {
                Some(Ok(report)) => {
                    summary.record(&report);
                    self.progress.report(SyncProgressEvent::Finished {
                        report,
                        done: summary.documents,
                    });
                }
                Some(Err(e)) => {
                    // Panics are turned into reports inside the task, so this
                    // is only reached if the runtime cancels the task.
                    tracing::error!(error = %e, "scan task failed");
                    summary.documents += 1;
                    summary.aborted += 1;
                }
                None if exhausted => break,
                None => {}
            }
        }

        tracing::info!(
            documents = summary.documents,
            completed = summary.completed,
            aborted = summary.aborted,
            new_versions = summary.new_versions,
            "sync finished"
        );
        summary
    }

    fn spawn_scan(&self, tasks: &mut JoinSet<ScanReport>, document_id: String, until: NaiveDate) {
        let fetcher = self.fetcher.clone();
        let store = self.store.clone();
        let scan = self.scan;
        let cancel = self.cancel.clone();

        self.progress.report(SyncProgressEvent::Started {
            document_id: document_id.clone(),
            active: tasks.len() + 1,
        });

        tasks.spawn(async move {
            let scanned = AssertUnwindSafe(
                VersionScanner::new(fetcher.as_ref(), store.as_ref(), scan, cancel)
                    .scan(&document_id, until),
            )
            .catch_unwind()
            .await;

            scanned.unwrap_or_else(|_| {
                tracing::error!(document = %document_id, "scan panicked");
                ScanReport {
                    document_id: document_id.clone(),
                    started_at: scan.min_date,
                    probes: 0,
                    new_versions: 0,
                    duplicates: 0,
                    outcome: ScanOutcome::Aborted("scan panicked".to_string()),
                }
            })
        });
    }
}
