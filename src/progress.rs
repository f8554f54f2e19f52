//! Sync progress reporting.
//!
//! Reports observable progress during `wetten sync` so users see which
//! documents are being scanned and how many have finished. Progress is
//! emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

use crate::scanner::{ScanOutcome, ScanReport};

/// A single progress event for sync.
#[derive(Clone, Debug)]
pub enum SyncProgressEvent {
    /// A worker slot picked up a document.
    Started { document_id: String, active: usize },
    /// A scan ended; `done` scans have finished so far in this run.
    Finished { report: ScanReport, done: u64 },
}

/// Reports sync progress. Implementations write to stderr (human or JSON).
pub trait SyncProgressReporter: Send + Sync {
    /// Emit a progress event. Called from coordinator worker tasks.
    fn report(&self, event: SyncProgressEvent);
}

fn outcome_label(outcome: &ScanOutcome) -> &'static str {
    match outcome {
        ScanOutcome::Completed => "complete",
        ScanOutcome::Aborted(_) => "aborted",
        ScanOutcome::Cancelled => "cancelled",
    }
}

/// Human-friendly progress on stderr: "sync BWBR0001840  complete  2 new / 140 probes  [1,234 done]".
pub struct StderrProgress;

impl SyncProgressReporter for StderrProgress {
    fn report(&self, event: SyncProgressEvent) {
        let line = match &event {
            SyncProgressEvent::Started { document_id, active } => {
                format!("sync {}  scanning  ({} active)\n", document_id, active)
            }
            SyncProgressEvent::Finished { report, done } => format!(
                "sync {}  {}  {} new / {} probes  [{} done]\n",
                report.document_id,
                outcome_label(&report.outcome),
                report.new_versions,
                format_number(report.probes as u64),
                format_number(*done)
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl SyncProgressReporter for JsonProgress {
    fn report(&self, event: SyncProgressEvent) {
        let obj = match &event {
            SyncProgressEvent::Started { document_id, active } => serde_json::json!({
                "event": "progress",
                "document": document_id,
                "phase": "scanning",
                "active": active
            }),
            SyncProgressEvent::Finished { report, done } => {
                let mut obj = serde_json::json!({
                    "event": "progress",
                    "document": report.document_id,
                    "phase": outcome_label(&report.outcome),
                    "from": report.started_at.to_string(),
                    "probes": report.probes,
                    "new_versions": report.new_versions,
                    "done": done
                });
                if let ScanOutcome::Aborted(reason) = &report.outcome {
                    obj["error"] = serde_json::Value::String(reason.clone());
                }
                obj
            }
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl SyncProgressReporter for NoProgress {
    fn report(&self, _event: SyncProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn SyncProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
