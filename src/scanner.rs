//! Adaptive version discovery for a single document.
//!
//! The source can only answer "what did document X look like on day D", and
//! versions are long-lived. The scanner walks from the document's resume
//! cursor towards today in coarse steps, comparing the hash of each probe
//! against the archive. When an unknown hash shows up, a version boundary
//! lies somewhere in the interval just stepped over: the scanner rewinds to
//! the first day of that interval and walks it at day resolution until the
//! new content is confirmed, then archives it and goes back to coarse steps.
//!
//! ```text
//!   coarse ──known──▶ coarse
//!   coarse ─unknown─▶ localizing   (rewind to previous probe + fine step)
//!   localizing ──known──▶ coarse
//!   localizing ─unknown─▶ coarse   (archive snapshot at the probe date)
//! ```
//!
//! Progress is only durable through stored snapshots, so an aborted scan is
//! safely resumed from the archive on the next run.

use anyhow::{anyhow, Result};
use chrono::{Duration, NaiveDate};
use tokio_util::sync::CancellationToken;

use crate::fetch::Fetcher;
use crate::models::{ContentHash, Snapshot};
use crate::store::{resume_cursor, InsertOutcome, SnapshotStore};

/// Step sizes and lower bound shared by every scan in a run.
#[derive(Debug, Clone, Copy)]
pub struct ScanConfig {
    pub coarse_step: Duration,
    pub fine_step: Duration,
    /// Earliest date the source has data for.
    pub min_date: NaiveDate,
}

impl ScanConfig {
    pub fn from_config(config: &crate::config::Config) -> Result<Self> {
        Ok(Self {
            coarse_step: step_days("sync.coarse_step_days", config.sync.coarse_step_days)?,
            fine_step: step_days("sync.fine_step_days", config.sync.fine_step_days)?,
            min_date: config.source.min_date()?,
        })
    }
}

fn step_days(key: &str, days: i64) -> Result<Duration> {
    Duration::try_days(days).ok_or_else(|| anyhow!("{} out of range: {}", key, days))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Striding through a region whose content is already archived.
    Coarse,
    /// Walking a suspect interval day by day to date a new version.
    Localizing,
}

/// What a probe result did to the scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Known content while striding.
    Unchanged,
    /// Known content while localizing; back to striding.
    Settled,
    /// Unknown content while striding; rewound into the interval.
    Rewound,
    /// Unknown content while localizing: a new version at this probe date.
    NewVersion,
}

/// Mutable probing state owned by one scan.
#[derive(Debug, Clone)]
pub struct ScanState {
    probe_date: NaiveDate,
    step: Duration,
    mode: ScanMode,
    floor: NaiveDate,
    coarse_step: Duration,
    fine_step: Duration,
}

impl ScanState {
    pub fn new(start: NaiveDate, config: &ScanConfig) -> Self {
        Self {
            probe_date: start,
            step: config.coarse_step,
            mode: ScanMode::Coarse,
            floor: start,
            coarse_step: config.coarse_step,
            fine_step: config.fine_step,
        }
    }

    pub fn probe_date(&self) -> NaiveDate {
        self.probe_date
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    /// Apply the result of the probe at [`probe_date`](Self::probe_date) and
    /// move to the next probe.
    ///
    /// Fails if the next probe date falls outside the representable calendar;
    /// the state is left unchanged in that case.
    pub fn observe(&mut self, known: bool) -> Result<Transition> {
        match (known, self.mode) {
            (true, ScanMode::Coarse) => {
                self.advance()?;
                Ok(Transition::Unchanged)
            }
            (true, ScanMode::Localizing) => {
                self.probe_date = self.stepped(self.coarse_step)?;
                self.coarsen();
                Ok(Transition::Settled)
            }
            (false, ScanMode::Coarse) => {
                self.rewind()?;
                self.mode = ScanMode::Localizing;
                self.step = self.fine_step;
                Ok(Transition::Rewound)
            }
            (false, ScanMode::Localizing) => {
                self.probe_date = self.stepped(self.coarse_step)?;
                self.coarsen();
                Ok(Transition::NewVersion)
            }
        }
    }

    fn stepped(&self, step: Duration) -> Result<NaiveDate> {
        self.probe_date
            .checked_add_signed(step)
            .ok_or_else(|| anyhow!("probe date overflow after {}", self.probe_date))
    }

    fn advance(&mut self) -> Result<()> {
        self.probe_date = self.stepped(self.step)?;
        Ok(())
    }

    fn coarsen(&mut self) {
        self.mode = ScanMode::Coarse;
        self.step = self.coarse_step;
    }

    /// Move the probe back by `coarse - fine`, onto the first day after the
    /// previous coarse probe, so the stepped-over interval is revisited at
    /// fine resolution. Never moves before the scan's start date.
    fn rewind(&mut self) -> Result<()> {
        let target = self
            .probe_date
            .checked_sub_signed(self.coarse_step - self.fine_step)
            .ok_or_else(|| anyhow!("probe date underflow before {}", self.probe_date))?;
        self.probe_date = target.max(self.floor);
        Ok(())
    }
}

/// How a scan ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Probing reached today.
    Completed,
    /// A fetch or storage call failed; the scan stopped at that probe.
    Aborted(String),
    /// The run's cancellation token fired.
    Cancelled,
}

/// Summary of one document scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub document_id: String,
    /// Resume cursor the scan started from.
    pub started_at: NaiveDate,
    pub probes: u32,
    pub new_versions: u32,
    /// Confirmed versions whose bytes were already archived elsewhere.
    pub duplicates: u32,
    pub outcome: ScanOutcome,
}

/// Discovers every distinct version of one document between its resume
/// cursor and `until`.
pub struct VersionScanner<'a> {
    fetcher: &'a dyn Fetcher,
    store: &'a dyn SnapshotStore,
    config: ScanConfig,
    cancel: CancellationToken,
}

impl<'a> VersionScanner<'a> {
    pub fn new(
        fetcher: &'a dyn Fetcher,
        store: &'a dyn SnapshotStore,
        config: ScanConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            fetcher,
            store,
            config,
            cancel,
        }
    }

    pub async fn scan(&self, document_id: &str, until: NaiveDate) -> ScanReport {
        let mut report = ScanReport {
            document_id: document_id.to_string(),
            started_at: self.config.min_date,
            probes: 0,
            new_versions: 0,
            duplicates: 0,
            outcome: ScanOutcome::Completed,
        };

        if self.cancel.is_cancelled() {
            report.outcome = ScanOutcome::Cancelled;
            return report;
        }

        let start = match resume_cursor(self.store, document_id, self.config.min_date).await {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(document = document_id, error = %e, "could not read resume cursor");
                report.outcome = ScanOutcome::Aborted(e.to_string());
                return report;
            }
        };
        report.started_at = start;
        tracing::debug!(document = document_id, from = %start, "scan started");

        let mut state = ScanState::new(start, &self.config);

        while state.probe_date() < until {
            if self.cancel.is_cancelled() {
                report.outcome = ScanOutcome::Cancelled;
                return report;
            }

            let probe_date = state.probe_date();
            report.probes += 1;
            let content = match self.fetcher.fetch(document_id, probe_date).await {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(
                        document = document_id,
                        date = %probe_date,
                        error = %e,
                        "fetch failed; aborting scan"
                    );
                    report.outcome = ScanOutcome::Aborted(e.to_string());
                    return report;
                }
            };

            let hash = ContentHash::of(&content);

            if self.cancel.is_cancelled() {
                report.outcome = ScanOutcome::Cancelled;
                return report;
            }
            let known = match self.store.hash_exists(&hash).await {
                Ok(k) => k,
                Err(e) => {
                    tracing::warn!(document = document_id, error = %e, "hash lookup failed; aborting scan");
                    report.outcome = ScanOutcome::Aborted(e.to_string());
                    return report;
                }
            };

            match state.observe(known) {
                Ok(Transition::NewVersion) => {}
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(document = document_id, error = %e, "cannot step further; aborting scan");
                    report.outcome = ScanOutcome::Aborted(e.to_string());
                    return report;
                }
            }

            if self.cancel.is_cancelled() {
                report.outcome = ScanOutcome::Cancelled;
                return report;
            }

            let snapshot = Snapshot {
                hash,
                document_id: document_id.to_string(),
                pub_date: probe_date,
                content,
            };
            match self.store.insert(&snapshot).await {
                Ok(InsertOutcome::Inserted) => {
                    tracing::info!(document = document_id, pub_date = %probe_date, "new version");
                    report.new_versions += 1;
                }
                Ok(InsertOutcome::Duplicate) => {
                    tracing::debug!(document = document_id, pub_date = %probe_date, "version already archived");
                    report.duplicates += 1;
                }
                Err(e) => {
                    tracing::warn!(document = document_id, error = %e, "insert failed; aborting scan");
                    report.outcome = ScanOutcome::Aborted(e.to_string());
                    return report;
                }
            }
        }

        tracing::info!(
            document = document_id,
            probes = report.probes,
            new_versions = report.new_versions,
            "sync complete"
        );
        report
    }
}
