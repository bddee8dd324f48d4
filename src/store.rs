//! Storage abstraction for nvd-sync.
//!
//! The [`Store`] trait defines the operations the pipeline and the query API
//! need from the persistent store. The pipeline only ever calls
//! [`upsert`](Store::upsert); the read side uses the rest.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{CanonicalRecord, PersistedEntity, UpsertOutcome};
use crate::query::CveQuery;

/// Abstract storage backend keyed by CVE identity.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](Store::upsert) | Insert or fully overwrite a record by `id` |
/// | [`find`](Store::find) | Retrieve one entity by `id` |
/// | [`list`](Store::list) | Filtered, sorted, paginated read |
/// | [`count`](Store::count) | Number of entities matching a filter |
#[async_trait]
pub trait Store: Send + Sync {
    /// Apply a record by natural key as one atomic operation.
    ///
    /// Every canonical field is overwritten; store-managed `created_at` is
    /// kept on update. Fails if the record has no identity.
    async fn upsert(&self, record: &CanonicalRecord) -> Result<UpsertOutcome>;

    async fn find(&self, id: &str) -> Result<Option<PersistedEntity>>;

    async fn list(&self, query: &CveQuery) -> Result<Vec<PersistedEntity>>;

    async fn count(&self, query: &CveQuery) -> Result<i64>;
}
