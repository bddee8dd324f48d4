//! Fetcher/paginator.
//!
//! Drives sequential offset-paginated retrieval from a [`FeedSource`],
//! normalizes each record, and applies the identifiable ones to a [`Store`].
//!
//! # Algorithm
//!
//! 1. Start at offset 0.
//! 2. Request one page of up to `page_size` records.
//!    - Fetch failure: keep the offset, ask the [`RetryPolicy`] for a delay,
//!      sleep, and request the same page again.
//!    - Empty page: done.
//!    - Otherwise apply every record in order and accumulate counts.
//! 3. A page shorter than `page_size` is the last one.
//! 4. Otherwise advance by `page_size`, wait the politeness delay, repeat.
//!
//! Termination is size-based because the feed does not reliably report a
//! total up front.
//!
//! Pages and records are processed strictly one at a time. The only
//! suspension points are the fetch itself, the politeness delay, and the
//! retry delay.

use std::time::Duration;

use crate::error::SyncError;
use crate::feed::FeedSource;
use crate::models::SyncRun;
use crate::normalize::normalize;
use crate::progress::{SyncProgressEvent, SyncProgressReporter};
use crate::retry::RetryPolicy;
use crate::store::Store;

/// Static pagination settings for one run.
#[derive(Debug, Clone)]
pub struct PaginationSettings {
    pub page_size: usize,
    pub politeness_delay: Duration,
}

/// One synchronization pass over the feed.
pub struct SyncPipeline<'a> {
    feed: &'a dyn FeedSource,
    store: &'a dyn Store,
    retry: &'a dyn RetryPolicy,
    progress: &'a dyn SyncProgressReporter,
    settings: PaginationSettings,
}

impl<'a> SyncPipeline<'a> {
    pub fn new(
        feed: &'a dyn FeedSource,
        store: &'a dyn Store,
        retry: &'a dyn RetryPolicy,
        progress: &'a dyn SyncProgressReporter,
        settings: PaginationSettings,
    ) -> Self {
        Self {
            feed,
            store,
            retry,
            progress,
            settings,
        }
    }

    /// Run until the feed is exhausted.
    ///
    /// Fetch failures never escape unless the retry policy gives up. A store
    /// failure aborts the run; the error carries the counts written so far.
    pub async fn run(&self) -> Result<SyncRun, SyncError> {
        let page_size = self.settings.page_size.max(1);
        let mut run = SyncRun::default();
        let mut offset = 0usize;
        let mut attempt = 0u32;

        loop {
            self.progress.report(SyncProgressEvent::Fetching { offset });
            log::info!("Fetching startIndex={} resultsPerPage={}", offset, page_size);

            let records = match self.feed.fetch_page(offset, page_size).await {
                Ok(records) => {
                    attempt = 0;
                    records
                }
                Err(e) => {
                    attempt += 1;
                    match self.retry.next_delay(attempt, &e) {
                        Some(delay) => {
                            log::warn!(
                                "Fetch at offset {} failed (attempt {}): {}; retrying in {:?}",
                                offset,
                                attempt,
                                e,
                                delay
                            );
                            self.progress.report(SyncProgressEvent::Retrying {
                                offset,
                                attempt,
                                delay,
                                error: e.to_string(),
                            });
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                        None => {
                            log::error!(
                                "Giving up on offset {} after {} attempts: {}",
                                offset,
                                attempt,
                                e
                            );
                            return Err(SyncError::RetriesExhausted {
                                offset,
                                attempts: attempt,
                                run,
                                last: e,
                            });
                        }
                    }
                }
            };

            if records.is_empty() {
                log::info!("No more records at offset {}", offset);
                break;
            }

            let page_len = records.len();
            for raw in &records {
                run.processed += 1;
                let record = normalize(raw);
                if record.identity().is_none() {
                    log::debug!("Skipping record without identity at offset {}", offset);
                    continue;
                }

                match self.store.upsert(&record).await {
                    Ok(outcome) => run.record(outcome),
                    Err(cause) => {
                        log::error!(
                            "Failed to store {}: {:#}",
                            record.identity().unwrap_or_default(),
                            cause
                        );
                        return Err(SyncError::Persistence { run, cause });
                    }
                }
            }

            self.progress.report(SyncProgressEvent::PageApplied {
                offset,
                records: page_len,
                run,
            });

            if page_len < page_size {
                break;
            }

            offset += page_size;
            tokio::time::sleep(self.settings.politeness_delay).await;
        }

        self.progress.report(SyncProgressEvent::Finished { run });
        Ok(run)
    }
}
