//! Outbound feed access.
//!
//! [`FeedSource`] is the seam between the paginator and the network: it
//! fetches one page of raw records at an offset. [`NvdFeed`] implements it
//! against the NVD REST API using offset pagination:
//!
//! ```text
//! GET {base_url}?startIndex={offset}&resultsPerPage={page_size}
//! ```
//!
//! The record list is located by [`extract_records`], which tolerates the
//! response layouts of several API versions.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::config::FeedConfig;
use crate::error::FetchError;

/// A paginated source of raw feed records.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch up to `page_size` records starting at `offset`.
    ///
    /// An empty vector means the feed is exhausted.
    async fn fetch_page(&self, offset: usize, page_size: usize)
        -> Result<Vec<Value>, FetchError>;
}

/// HTTP client for the NVD CVE API.
pub struct NvdFeed {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl NvdFeed {
    /// Build a client with the configured user agent and per-request timeout.
    pub fn new(config: &FeedConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl FeedSource for NvdFeed {
    async fn fetch_page(
        &self,
        offset: usize,
        page_size: usize,
    ) -> Result<Vec<Value>, FetchError> {
        let mut request = self.client.get(&self.base_url).query(&[
            ("startIndex", offset.to_string()),
            ("resultsPerPage", page_size.to_string()),
        ]);
        if let Some(ref key) = self.api_key {
            request = request.header("apiKey", key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: truncate(&body, 512),
            });
        }

        let text = response.text().await?;
        let body: Value = serde_json::from_str(&text)
            .map_err(|e| FetchError::Malformed(format!("invalid JSON: {}", e)))?;

        extract_records(body)
    }
}

/// Pull the record list out of a feed response body.
///
/// Checked in priority order: `vulnerabilities`, `result` (when it is the
/// list itself), then `result.CVE_Items`. A JSON object carrying none of
/// them is an empty page. A body that is not a JSON object is malformed.
pub fn extract_records(body: Value) -> Result<Vec<Value>, FetchError> {
    let Value::Object(mut obj) = body else {
        return Err(FetchError::Malformed(
            "response body is not a JSON object".to_string(),
        ));
    };

    if let Some(Value::Array(records)) = obj.remove("vulnerabilities") {
        return Ok(records);
    }

    match obj.remove("result") {
        Some(Value::Array(records)) => Ok(records),
        Some(Value::Object(mut result)) => match result.remove("CVE_Items") {
            Some(Value::Array(records)) => Ok(records),
            _ => Ok(Vec::new()),
        },
        _ => Ok(Vec::new()),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
