//! Sync progress reporting.
//!
//! Reports observable progress during `nvd-sync sync` so users see which page
//! is being fetched, how many records have been applied, and when the feed is
//! backing off. Progress is emitted on **stderr** so stdout remains parseable
//! for scripts.

use std::io::Write;
use std::time::Duration;

use crate::models::SyncRun;

/// A single progress event for sync.
#[derive(Clone, Debug)]
pub enum SyncProgressEvent {
    /// About to request the page at `offset`.
    Fetching { offset: usize },
    /// A page of `records` was applied; `run` is the running total.
    PageApplied {
        offset: usize,
        records: usize,
        run: SyncRun,
    },
    /// The page at `offset` failed and will be retried after `delay`.
    Retrying {
        offset: usize,
        attempt: u32,
        delay: Duration,
        error: String,
    },
    /// The feed is exhausted.
    Finished { run: SyncRun },
}

/// Reports sync progress. Implementations write to stderr (human or JSON).
pub trait SyncProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the pipeline.
    fn report(&self, event: SyncProgressEvent);
}

/// Human-friendly progress on stderr: "sync  page @ 400  applied 200 records (processed 600)".
pub struct StderrProgress;

impl SyncProgressReporter for StderrProgress {
    fn report(&self, event: SyncProgressEvent) {
        let line = match &event {
            SyncProgressEvent::Fetching { offset } => {
                format!("sync  fetching page @ {}\n", format_number(*offset as u64))
            }
            SyncProgressEvent::PageApplied {
                offset,
                records,
                run,
            } => format!(
                "sync  page @ {}  applied {} records  (processed {}, inserted {}, updated {})\n",
                format_number(*offset as u64),
                records,
                format_number(run.processed),
                format_number(run.inserted),
                format_number(run.updated)
            ),
            SyncProgressEvent::Retrying {
                offset,
                attempt,
                delay,
                error,
            } => format!(
                "sync  page @ {} failed (attempt {}): {}  retrying in {:.1}s\n",
                format_number(*offset as u64),
                attempt,
                error,
                delay.as_secs_f64()
            ),
            SyncProgressEvent::Finished { run } => format!(
                "sync  done  processed {}  inserted {}  updated {}\n",
                format_number(run.processed),
                format_number(run.inserted),
                format_number(run.updated)
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
            SyncProgressEvent::Fetching { offset } => serde_json::json!({
                "event": "progress",
                "phase": "fetching",
                "offset": offset
            }),
            SyncProgressEvent::PageApplied {
                offset,
                records,
                run,
            } => serde_json::json!({
                "event": "progress",
                "phase": "applied",
                "offset": offset,
                "records": records,
                "run": run
            }),
            SyncProgressEvent::Retrying {
                offset,
                attempt,
                delay,
                error,
            } => serde_json::json!({
                "event": "progress",
                "phase": "retrying",
                "offset": offset,
                "attempt": attempt,
                "delay_ms": delay.as_millis() as u64,
                "error": error
            }),
            SyncProgressEvent::Finished { run } => serde_json::json!({
                "event": "finished",
                "run": run
            }),
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
