//! Synchronization entry points.
//!
//! [`trigger_sync`] is what the CLI and the admin HTTP endpoint call. It
//! acquires its own store handle for the duration of the run and releases it
//! on every exit path before returning.

use std::str::FromStr;

use crate::config::Config;
use crate::error::SyncError;
use crate::feed::{FeedSource, NvdFeed};
use crate::models::SyncRun;
use crate::pipeline::{PaginationSettings, SyncPipeline};
use crate::progress::SyncProgressReporter;
use crate::retry::{policy_from_config, RetryPolicy};
use crate::sqlite_store::SqliteStore;
use crate::store::Store;

/// How much of the feed a run covers.
///
/// Only `full` exists today; it is the hook for an incremental mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    #[default]
    Full,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Full => "full",
        }
    }
}

impl FromStr for SyncMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(SyncMode::Full),
            other => Err(SyncError::UnsupportedMode(other.to_string())),
        }
    }
}

/// Run one synchronization against the configured feed and database.
pub async fn trigger_sync(
    config: &Config,
    mode: SyncMode,
    progress: &dyn SyncProgressReporter,
) -> Result<SyncRun, SyncError> {
    let feed = NvdFeed::new(&config.feed).map_err(SyncError::Startup)?;
    trigger_sync_with_feed(config, mode, &feed, progress).await
}

/// Like [`trigger_sync`], with a caller-supplied feed.
pub async fn trigger_sync_with_feed(
    config: &Config,
    mode: SyncMode,
    feed: &dyn FeedSource,
    progress: &dyn SyncProgressReporter,
) -> Result<SyncRun, SyncError> {
    let store = SqliteStore::open(config)
        .await
        .map_err(SyncError::Startup)?;

    let retry = policy_from_config(&config.feed);
    let result = run_with(config, mode, feed, &store, retry.as_ref(), progress).await;

    store.close().await;
    result
}

/// Run against explicit collaborators. The caller owns the store lifecycle.
pub async fn run_with(
    config: &Config,
    mode: SyncMode,
    feed: &dyn FeedSource,
    store: &dyn Store,
    retry: &dyn RetryPolicy,
    progress: &dyn SyncProgressReporter,
) -> Result<SyncRun, SyncError> {
    log::info!(
        "Starting {} sync from {} ({} per page)",
        mode.as_str(),
        config.feed.base_url,
        config.feed.results_per_page
    );

    let settings = PaginationSettings {
        page_size: config.feed.results_per_page,
        politeness_delay: config.feed.politeness_delay(),
    };

    let pipeline = SyncPipeline::new(feed, store, retry, progress, settings);
    let run = pipeline.run().await?;

    log::info!("Sync finished: {}", run);
    Ok(run)
}
