use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the schema in the database named by `config`. Idempotent.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let result = migrate_pool(&pool).await;
    pool.close().await;
    result
}

/// Create the schema on an already-open pool. Idempotent.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    // One row per CVE identity; the primary key is the upsert conflict target.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cve_records (
            id TEXT PRIMARY KEY NOT NULL,
            published_at INTEGER,
            modified_at INTEGER,
            year INTEGER,
            severity_v2 REAL,
            severity_v3 REAL,
            summary TEXT NOT NULL DEFAULT '',
            raw_json TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            revision INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Secondary indexes for the query API
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_cve_records_published_at ON cve_records(published_at)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_cve_records_modified_at ON cve_records(modified_at)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_cve_records_year ON cve_records(year)")
        .execute(pool)
        .await?;

    Ok(())
}
