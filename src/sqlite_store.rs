//! SQLite implementation of the [`Store`] trait.
//!
//! Records live in the `cve_records` table keyed by `id`. Timestamps are
//! stored as epoch milliseconds; the untouched feed record is kept in
//! `raw_json`.
//!
//! The upsert is a single `INSERT ... ON CONFLICT(id) DO UPDATE ... RETURNING`
//! statement, so the insert-or-update decision and the write cannot be split
//! by another writer. `revision` starts at 1 and is bumped on every update,
//! which is how an insert is told apart from an update.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::{QueryBuilder, Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::models::{CanonicalRecord, PersistedEntity, UpsertOutcome};
use crate::query::CveQuery;
use crate::store::Store;

const SELECT_COLUMNS: &str = "SELECT id, published_at, modified_at, year, severity_v2, severity_v3, \
     summary, raw_json, created_at, updated_at, revision FROM cve_records";

/// SQLite-backed record store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to the configured database and bring the schema up to date.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        if let Err(e) = migrate::migrate_pool(&pool).await {
            pool.close().await;
            return Err(e);
        }
        Ok(Self { pool })
    }

    /// Release all connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert(&self, record: &CanonicalRecord) -> Result<UpsertOutcome> {
        let Some(id) = record.identity() else {
            bail!("refusing to store a record without an identity");
        };

        let raw_json = serde_json::to_string(&record.raw)?;
        let now = Utc::now().timestamp_millis();

        let revision: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO cve_records (id, published_at, modified_at, year, severity_v2, severity_v3, summary, raw_json, created_at, updated_at, revision)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)
            ON CONFLICT(id) DO UPDATE SET
                published_at = excluded.published_at,
                modified_at = excluded.modified_at,
                year = excluded.year,
                severity_v2 = excluded.severity_v2,
                severity_v3 = excluded.severity_v3,
                summary = excluded.summary,
                raw_json = excluded.raw_json,
                updated_at = excluded.updated_at,
                revision = cve_records.revision + 1
            RETURNING revision
            "#,
        )
        .bind(id)
        .bind(record.published_at.map(|ts| ts.timestamp_millis()))
        .bind(record.modified_at.map(|ts| ts.timestamp_millis()))
        .bind(record.year)
        .bind(record.severity_v2)
        .bind(record.severity_v3)
        .bind(&record.summary)
        .bind(&raw_json)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(if revision == 1 {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Updated
        })
    }

    async fn find(&self, id: &str) -> Result<Option<PersistedEntity>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(entity_from_row).transpose()
    }

    async fn list(&self, query: &CveQuery) -> Result<Vec<PersistedEntity>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_COLUMNS);
        push_filters(&mut qb, query);
        qb.push(format!(
            " ORDER BY {} {}, id ASC LIMIT ",
            query.sort_by.column(),
            query.order.keyword()
        ));
        qb.push_bind(query.per_page() as i64);
        qb.push(" OFFSET ");
        qb.push_bind(query.offset());

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(entity_from_row).collect()
    }

    async fn count(&self, query: &CveQuery) -> Result<i64> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM cve_records");
        push_filters(&mut qb, query);

        let total: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(total)
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, query: &CveQuery) {
    let mut sep = " WHERE ";

    if let Some(year) = query.year {
        qb.push(sep).push("year = ").push_bind(year);
        sep = " AND ";
    }
    if let Some(ref cve_id) = query.cve_id {
        qb.push(sep).push("id = ").push_bind(cve_id.clone());
        sep = " AND ";
    }
    if let Some(min) = query.min_score {
        qb.push(sep).push("severity_v3 >= ").push_bind(min);
        sep = " AND ";
    }
    if let Some(max) = query.max_score {
        qb.push(sep).push("severity_v3 <= ").push_bind(max);
    }
}

fn entity_from_row(row: &SqliteRow) -> Result<PersistedEntity> {
    let id: String = row.try_get("id")?;
    let raw_json: String = row.try_get("raw_json")?;
    let raw = serde_json::from_str(&raw_json)
        .with_context(|| format!("Corrupt raw_json for {}", id))?;

    Ok(PersistedEntity {
        id,
        published_at: row
            .try_get::<Option<i64>, _>("published_at")?
            .and_then(DateTime::from_timestamp_millis),
        modified_at: row
            .try_get::<Option<i64>, _>("modified_at")?
            .and_then(DateTime::from_timestamp_millis),
        year: row.try_get("year")?,
        severity_v2: row.try_get("severity_v2")?,
        severity_v3: row.try_get("severity_v3")?,
        summary: row.try_get("summary")?,
        raw,
        created_at: millis_to_utc(row.try_get("created_at")?),
        updated_at: millis_to_utc(row.try_get("updated_at")?),
        revision: row.try_get("revision")?,
    })
}

fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}
