//! Record normalization.
//!
//! Converts one raw feed record into a [`CanonicalRecord`]. The feed has
//! shipped several record shapes over its lifetime:
//!
//! - **NVD 2.0 wrapped**: `{ "cve": { "id", "descriptions", "metrics", "published", ... } }`
//! - **Flat**: the inner `cve` object on its own.
//! - **NVD 1.0 legacy**: `{ "cve": { "CVE_data_meta": { "ID" }, "description": { "description_data" } },
//!   "impact": { "baseMetricV3": ... }, "publishedDate", "lastModifiedDate" }`
//!
//! Each canonical field is resolved by an ordered list of extraction
//! strategies. The first strategy that yields a usable value wins, so every
//! supported shape can be tested on its own.
//!
//! [`normalize`] never fails. A record with no resolvable identity comes
//! back with `id: None`; the caller decides what to do with it.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::models::CanonicalRecord;

/// Inclusive bounds for CVSS base scores.
pub const SCORE_RANGE: std::ops::RangeInclusive<f64> = 0.0..=10.0;

fn cve_id_re() -> &'static Regex {
    static CVE_ID_RE: OnceLock<Regex> = OnceLock::new();
    CVE_ID_RE.get_or_init(|| Regex::new(r"CVE-[0-9]{4}-[0-9]+").expect("valid CVE id regex"))
}

/// The two levels a field may live at.
///
/// For a flat record `wrapper` and `inner` are the same object.
#[derive(Clone, Copy)]
struct RecordView<'a> {
    wrapper: &'a Value,
    inner: &'a Value,
}

impl<'a> RecordView<'a> {
    fn new(raw: &'a Value) -> Self {
        let inner = raw.get("cve").filter(|c| c.is_object()).unwrap_or(raw);
        Self {
            wrapper: raw,
            inner,
        }
    }

    fn levels(&self) -> [&'a Value; 2] {
        [self.inner, self.wrapper]
    }

    fn metrics(&self) -> Option<&'a Value> {
        self.levels()
            .into_iter()
            .find_map(|level| level.get("metrics").filter(|m| m.is_object()))
    }
}

type Strategy<T> = fn(&RecordView<'_>) -> Option<T>;

fn first_match<T>(view: &RecordView<'_>, strategies: &[Strategy<T>]) -> Option<T> {
    strategies.iter().find_map(|strategy| strategy(view))
}

/// Normalize one raw feed record.
pub fn normalize(raw: &Value) -> CanonicalRecord {
    let view = RecordView::new(raw);

    let id = first_match(&view, ID_STRATEGIES);
    let published_at = first_match(&view, PUBLISHED_STRATEGIES);
    let modified_at = first_match(&view, MODIFIED_STRATEGIES);
    let year = published_at
        .map(|ts| ts.year())
        .or_else(|| id.as_deref().and_then(year_from_id));

    CanonicalRecord {
        id,
        published_at,
        modified_at,
        year,
        severity_v2: extract_score(&view, V2_SHAPES),
        severity_v3: extract_score(&view, V3_SHAPES),
        summary: first_match(&view, SUMMARY_STRATEGIES).unwrap_or_default(),
        raw: raw.clone(),
    }
}

// ============ Identity ============

const ID_STRATEGIES: &[Strategy<String>] = &[id_direct, id_legacy_meta, id_text_scan];

fn id_direct(view: &RecordView<'_>) -> Option<String> {
    non_empty_str(view.inner.get("id")?)
}

fn id_legacy_meta(view: &RecordView<'_>) -> Option<String> {
    non_empty_str(view.inner.pointer("/CVE_data_meta/ID")?)
}

fn id_text_scan(view: &RecordView<'_>) -> Option<String> {
    let text = view.wrapper.to_string();
    cve_id_re().find(&text).map(|m| m.as_str().to_string())
}

/// Year segment of a `CVE-YYYY-NNNN` identity.
pub fn year_from_id(id: &str) -> Option<i32> {
    id.split('-').nth(1)?.parse().ok()
}

// ============ Summary ============

const SUMMARY_STRATEGIES: &[Strategy<String>] = &[
    summary_descriptions_array,
    summary_description_array,
    summary_description_data,
    summary_description_string,
];

fn summary_descriptions_array(view: &RecordView<'_>) -> Option<String> {
    pick_description(view.inner.get("descriptions")?.as_array()?)
}

fn summary_description_array(view: &RecordView<'_>) -> Option<String> {
    pick_description(view.inner.get("description")?.as_array()?)
}

fn summary_description_data(view: &RecordView<'_>) -> Option<String> {
    pick_description(
        view.inner
            .pointer("/description/description_data")?
            .as_array()?,
    )
}

fn summary_description_string(view: &RecordView<'_>) -> Option<String> {
    non_empty_str(view.inner.get("description")?)
}

/// English entry if present, otherwise the first entry.
fn pick_description(entries: &[Value]) -> Option<String> {
    let is_english = |entry: &&Value| {
        ["lang", "language"]
            .iter()
            .any(|tag| entry.get(*tag).and_then(Value::as_str) == Some("en"))
    };

    entries
        .iter()
        .find(is_english)
        .or_else(|| entries.first())
        .and_then(description_text)
}

fn description_text(entry: &Value) -> Option<String> {
    ["value", "description"]
        .iter()
        .find_map(|key| entry.get(*key).and_then(non_empty_str))
}

// ============ Dates ============

// Inner-level names come first so a flat record resolves exactly like its
// wrapped form.
const PUBLISHED_STRATEGIES: &[Strategy<DateTime<Utc>>] = &[
    published_inner,
    published_date_inner,
    published_wrapper,
    published_plain_wrapper,
];

const MODIFIED_STRATEGIES: &[Strategy<DateTime<Utc>>] = &[
    modified_inner,
    modified_date_inner,
    modified_wrapper,
    modified_date_wrapper,
];

fn published_wrapper(view: &RecordView<'_>) -> Option<DateTime<Utc>> {
    parse_timestamp(view.wrapper.get("publishedDate")?)
}

fn published_inner(view: &RecordView<'_>) -> Option<DateTime<Utc>> {
    parse_timestamp(view.inner.get("published")?)
}

fn published_date_inner(view: &RecordView<'_>) -> Option<DateTime<Utc>> {
    parse_timestamp(view.inner.get("publishedDate")?)
}

fn published_plain_wrapper(view: &RecordView<'_>) -> Option<DateTime<Utc>> {
    parse_timestamp(view.wrapper.get("published")?)
}

fn modified_wrapper(view: &RecordView<'_>) -> Option<DateTime<Utc>> {
    parse_timestamp(view.wrapper.get("lastModified")?)
}

fn modified_inner(view: &RecordView<'_>) -> Option<DateTime<Utc>> {
    parse_timestamp(view.inner.get("lastModified")?)
}

fn modified_date_inner(view: &RecordView<'_>) -> Option<DateTime<Utc>> {
    parse_timestamp(view.inner.get("lastModifiedDate")?)
}

fn modified_date_wrapper(view: &RecordView<'_>) -> Option<DateTime<Utc>> {
    parse_timestamp(view.wrapper.get("lastModifiedDate")?)
}

/// Parse a feed timestamp. Zone-less values are taken as UTC.
///
/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM:SS(.fff)`, `YYYY-MM-DDTHH:MMZ`,
/// a bare date, or epoch milliseconds as a JSON number.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp_str(s.trim()),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%MZ", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

// ============ Severity scores ============

/// One place a base score may be found.
#[derive(Debug, Clone, Copy)]
enum ScoreShape {
    /// `metrics.<key>[0].cvssData.baseScore`
    FirstEntry(&'static str),
    /// `metrics.<key>.cvssData.baseScore`
    Single(&'static str),
    /// `metrics.<key>.baseScore`, or `metrics.<key>` holding the score itself.
    Flattened(&'static str),
    /// `impact.<metric>.<key>.baseScore`
    LegacyImpact {
        metric: &'static str,
        key: &'static str,
    },
}

impl ScoreShape {
    fn extract(self, view: &RecordView<'_>) -> Option<f64> {
        match self {
            ScoreShape::FirstEntry(key) => {
                let entry = view.metrics()?.get(key)?.as_array()?.first()?;
                coerce_score(entry.pointer("/cvssData/baseScore")?)
            }
            ScoreShape::Single(key) => {
                let metric = view.metrics()?.get(key).filter(|m| m.is_object())?;
                coerce_score(metric.pointer("/cvssData/baseScore")?)
            }
            ScoreShape::Flattened(key) => match view.metrics()?.get(key)? {
                Value::Object(obj) => coerce_score(obj.get("baseScore")?),
                scalar => coerce_score(scalar),
            },
            ScoreShape::LegacyImpact { metric, key } => view.levels().into_iter().find_map(|level| {
                let score = level.get("impact")?.get(metric)?.get(key)?.get("baseScore")?;
                coerce_score(score)
            }),
        }
    }
}

const V3_SHAPES: &[ScoreShape] = &[
    ScoreShape::FirstEntry("cvssMetricV31"),
    ScoreShape::FirstEntry("cvssMetricV30"),
    ScoreShape::FirstEntry("cvssMetricV3"),
    ScoreShape::Single("cvssMetricV31"),
    ScoreShape::Single("cvssMetricV30"),
    ScoreShape::Single("cvssMetricV3"),
    ScoreShape::Flattened("cvssV3"),
    ScoreShape::LegacyImpact {
        metric: "baseMetricV3",
        key: "cvssV3",
    },
];

const V2_SHAPES: &[ScoreShape] = &[
    ScoreShape::FirstEntry("cvssMetricV2"),
    ScoreShape::Single("cvssMetricV2"),
    ScoreShape::Flattened("cvssV2"),
    ScoreShape::LegacyImpact {
        metric: "baseMetricV2",
        key: "cvssV2",
    },
];

fn extract_score(view: &RecordView<'_>, shapes: &[ScoreShape]) -> Option<f64> {
    shapes.iter().find_map(|shape| shape.extract(view))
}

/// Numeric coercion for a score value; rejects anything outside [`SCORE_RANGE`].
fn coerce_score(value: &Value) -> Option<f64> {
    let score = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (score.is_finite() && SCORE_RANGE.contains(&score)).then_some(score)
}

fn non_empty_str(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
