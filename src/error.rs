use thiserror::Error;

use crate::models::SyncRun;

/// A failed attempt to fetch one page from the feed.
///
/// Every variant is transient from the pipeline's point of view: the page is
/// retried at the same offset for as long as the retry policy allows.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("feed returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed feed response: {0}")]
    Malformed(String),
}

/// Failure of a whole synchronization run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("unsupported sync mode '{0}' (supported: full)")]
    UnsupportedMode(String),
    /// The store could not be opened or migrated before the run began.
    #[error("store unavailable: {0:#}")]
    Startup(anyhow::Error),
    #[error("giving up on page at offset {offset} after {attempts} attempts")]
    RetriesExhausted {
        offset: usize,
        attempts: u32,
        run: SyncRun,
        #[source]
        last: FetchError,
    },
    /// A write was rejected; `run` counts only what was written before it.
    #[error("persistence failure ({run}): {cause:#}")]
    Persistence { run: SyncRun, cause: anyhow::Error },
}

impl SyncError {
    /// Counts accumulated before the run aborted, if it got that far.
    pub fn partial_run(&self) -> Option<SyncRun> {
        match self {
            SyncError::RetriesExhausted { run, .. } | SyncError::Persistence { run, .. } => {
                Some(*run)
            }
            SyncError::UnsupportedMode(_) | SyncError::Startup(_) => None,
        }
    }
}
