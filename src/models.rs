//! Core data models used throughout nvd-sync.
//!
//! These types represent the records that flow from the feed, through the
//! normalizer, into the store, and back out through the query API.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Store-ready projection of one feed record.
///
/// Produced by [`normalize`](crate::normalize::normalize). A record whose
/// `id` is `None` is invalid and must never reach the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalRecord {
    pub id: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    pub year: Option<i32>,
    pub severity_v2: Option<f64>,
    pub severity_v3: Option<f64>,
    pub summary: String,
    /// The untouched input record.
    pub raw: Value,
}

impl CanonicalRecord {
    /// Returns the identity if the record is eligible for persistence.
    pub fn identity(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }
}

/// A canonical record as held by the store, plus store-managed fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedEntity {
    pub id: String,
    pub published_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    pub year: Option<i32>,
    pub severity_v2: Option<f64>,
    pub severity_v3: Option<f64>,
    pub summary: String,
    pub raw: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Number of times this entity has been written (1 after the insert).
    pub revision: i64,
}

/// Result of applying one record to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Counters accumulated over one synchronization invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncRun {
    pub processed: u64,
    pub inserted: u64,
    pub updated: u64,
}

impl SyncRun {
    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
        }
    }

    /// Records seen but not written (no resolvable identity).
    pub fn skipped(&self) -> u64 {
        self.processed - self.inserted - self.updated
    }
}

impl std::fmt::Display for SyncRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "processed={} inserted={} updated={}",
            self.processed, self.inserted, self.updated
        )
    }
}
