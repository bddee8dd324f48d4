//! Read side: filtered, sorted, paginated access to stored records.
//!
//! Used by both the `nvd-sync list` / `nvd-sync get` CLI commands and the
//! `GET /api/cves` HTTP endpoints.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::models::PersistedEntity;
use crate::store::Store;

pub const DEFAULT_PER_PAGE: u32 = 10;
pub const MAX_PER_PAGE: u32 = 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortField {
    #[default]
    Published,
    Modified,
}

impl SortField {
    pub fn column(&self) -> &'static str {
        match self {
            SortField::Published => "published_at",
            SortField::Modified => "modified_at",
        }
    }

    /// `lastModified` selects the modified timestamp; anything else sorts by publication.
    pub fn parse(s: &str) -> Self {
        if s == "lastModified" {
            SortField::Modified
        } else {
            SortField::Published
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s == "asc" {
            SortOrder::Asc
        } else {
            SortOrder::Desc
        }
    }
}

/// Filter, sort, and page selection for a list read.
///
/// `min_score` and `max_score` apply to the v3 score and are combined with
/// AND, so both bounds together select a closed interval.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CveQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub year: Option<i32>,
    pub cve_id: Option<String>,
    pub min_score: Option<f64>,
    pub max_score: Option<f64>,
    pub sort_by: SortField,
    pub order: SortOrder,
}

impl CveQuery {
    /// 1-based page number.
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE)
    }

    pub fn offset(&self) -> i64 {
        (self.page() as i64 - 1) * self.per_page() as i64
    }
}

/// Query-string form of [`CveQuery`], as accepted by `GET /api/cves`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    #[serde(alias = "perPage")]
    pub per_page: Option<u32>,
    pub year: Option<i32>,
    #[serde(rename = "cveId")]
    pub cve_id: Option<String>,
    pub min_score: Option<f64>,
    pub max_score: Option<f64>,
    #[serde(rename = "sortBy")]
    pub sort_by: Option<String>,
    pub order: Option<String>,
}

impl From<ListParams> for CveQuery {
    fn from(p: ListParams) -> Self {
        CveQuery {
            page: p.page,
            per_page: p.per_page,
            year: p.year,
            cve_id: p.cve_id.filter(|id| !id.is_empty()),
            min_score: p.min_score,
            max_score: p.max_score,
            sort_by: p.sort_by.as_deref().map(SortField::parse).unwrap_or_default(),
            order: p.order.as_deref().map(SortOrder::parse).unwrap_or_default(),
        }
    }
}

/// One page of list results.
#[derive(Debug, Clone, Serialize)]
pub struct CvePage {
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub items: Vec<PersistedEntity>,
}

/// Core list function returning structured data (used by CLI and server).
pub async fn list_records(store: &dyn Store, query: &CveQuery) -> Result<CvePage> {
    let items = store.list(query).await?;
    let total = store.count(query).await?;

    Ok(CvePage {
        total,
        page: query.page(),
        per_page: query.per_page(),
        items,
    })
}

/// Core get function. `Ok(None)` when the id is unknown; `Err` only for
/// storage failures.
pub async fn get_record(store: &dyn Store, id: &str) -> Result<Option<PersistedEntity>> {
    store.find(id).await
}

/// CLI entry point; prints one record.
pub async fn run_get(store: &dyn Store, id: &str) -> Result<()> {
    let Some(rec) = get_record(store, id).await? else {
        bail!("record not found: {}", id);
    };

    println!("--- {} ---", rec.id);
    println!("published:   {}", format_opt_ts(rec.published_at));
    println!("modified:    {}", format_opt_ts(rec.modified_at));
    println!("year:        {}", format_opt(rec.year));
    println!("cvss v3:     {}", format_opt(rec.severity_v3));
    println!("cvss v2:     {}", format_opt(rec.severity_v2));
    println!("stored:      {} (revision {})", rec.updated_at.to_rfc3339(), rec.revision);
    println!();
    println!("{}", if rec.summary.is_empty() { "(no description)" } else { &rec.summary });

    Ok(())
}

/// CLI entry point; prints a table of matching records.
pub async fn run_list(store: &dyn Store, query: &CveQuery) -> Result<()> {
    let page = list_records(store, query).await?;

    if page.items.is_empty() {
        println!("No results.");
        return Ok(());
    }

    println!(
        "{:<18} {:<11} {:>5} {:>5}  SUMMARY",
        "ID", "PUBLISHED", "V3", "V2"
    );
    for rec in &page.items {
        let published = rec
            .published_at
            .map(|ts| ts.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<18} {:<11} {:>5} {:>5}  {}",
            rec.id,
            published,
            format_opt(rec.severity_v3),
            format_opt(rec.severity_v2),
            one_line(&rec.summary, 60)
        );
    }
    println!();
    println!(
        "page {} ({} per page), {} total",
        page.page, page.per_page, page.total
    );

    Ok(())
}

fn format_opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn format_opt_ts(ts: Option<chrono::DateTime<chrono::Utc>>) -> String {
    ts.map(|t| t.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn one_line(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CanonicalRecord, UpsertOutcome};
    use async_trait::async_trait;

    /// Store whose reads fail with a message that mentions "not found".
    struct BrokenStore;

    #[async_trait]
    impl Store for BrokenStore {
        async fn upsert(&self, _record: &CanonicalRecord) -> Result<UpsertOutcome> {
            bail!("read-only")
        }
        async fn find(&self, _id: &str) -> Result<Option<PersistedEntity>> {
            bail!("table not found: cve_records")
        }
        async fn list(&self, _query: &CveQuery) -> Result<Vec<PersistedEntity>> {
            bail!("table not found: cve_records")
        }
        async fn count(&self, _query: &CveQuery) -> Result<i64> {
            bail!("table not found: cve_records")
        }
    }

    #[tokio::test]
    async fn missing_record_is_none_and_storage_failure_is_err() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = crate::config::Config::default();
        config.db.path = tmp.path().join("nvd.sqlite");
        let store = crate::sqlite_store::SqliteStore::open(&config).await.unwrap();

        assert!(get_record(&store, "CVE-2099-0001").await.unwrap().is_none());
        assert!(run_get(&store, "CVE-2099-0001").await.is_err());
        store.close().await;

        assert!(get_record(&BrokenStore, "CVE-2099-0001").await.is_err());
    }

    #[test]
    fn paging_defaults_and_bounds() {
        let q = CveQuery::default();
        assert_eq!(q.page(), 1);
        assert_eq!(q.per_page(), DEFAULT_PER_PAGE);
        assert_eq!(q.offset(), 0);

        let q = CveQuery {
            page: Some(0),
            per_page: Some(50_000),
            ..Default::default()
        };
        assert_eq!(q.page(), 1);
        assert_eq!(q.per_page(), MAX_PER_PAGE);

        let q = CveQuery {
            page: Some(3),
            per_page: Some(25),
            ..Default::default()
        };
        assert_eq!(q.offset(), 50);
    }

    #[test]
    fn list_params_conversion() {
        let params = ListParams {
            sort_by: Some("lastModified".to_string()),
            order: Some("asc".to_string()),
            cve_id: Some(String::new()),
            ..Default::default()
        };
        let q: CveQuery = params.into();
        assert_eq!(q.sort_by, SortField::Modified);
        assert_eq!(q.order, SortOrder::Asc);
        assert_eq!(q.cve_id, None);

        let q: CveQuery = ListParams {
            sort_by: Some("published".to_string()),
            order: Some("sideways".to_string()),
            ..Default::default()
        }
        .into();
        assert_eq!(q.sort_by, SortField::Published);
        assert_eq!(q.order, SortOrder::Desc);
    }

    #[test]
    fn one_line_collapses_whitespace() {
        assert_eq!(one_line("a\n  b\tc", 10), "a b c");
        assert_eq!(one_line("abcdef", 3), "abc...");
    }
}
