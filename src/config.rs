use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Largest page the NVD 2.0 API will serve in one response.
pub const MAX_RESULTS_PER_PAGE: usize = 2000;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/nvd.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_results_per_page")]
    pub results_per_page: usize,
    #[serde(default = "default_politeness_delay_ms")]
    pub politeness_delay_ms: u64,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Ceiling on consecutive failed attempts for one page. `None` retries forever.
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default = "default_backoff")]
    pub backoff: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            results_per_page: default_results_per_page(),
            politeness_delay_ms: default_politeness_delay_ms(),
            retry_delay_secs: default_retry_delay_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
            max_retries: None,
            backoff: default_backoff(),
            api_key: None,
        }
    }
}

fn default_base_url() -> String {
    "https://services.nvd.nist.gov/rest/json/cves/2.0".to_string()
}
fn default_results_per_page() -> usize {
    200
}
fn default_politeness_delay_ms() -> u64 {
    300
}
fn default_retry_delay_secs() -> u64 {
    5
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    format!("nvd-sync/{}", env!("CARGO_PKG_VERSION"))
}
fn default_backoff() -> String {
    "fixed".to_string()
}

impl FeedConfig {
    pub fn politeness_delay(&self) -> Duration {
        Duration::from_millis(self.politeness_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_admin_token")]
    pub admin_token: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            admin_token: default_admin_token(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:4000".to_string()
}
fn default_admin_token() -> String {
    "changeme".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config = parse_config(&content)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate(&config)?;

    Ok(config)
}

/// Parse a TOML document into a [`Config`] without consulting the environment.
pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

/// Apply the static environment contract on top of file values.
///
/// `lookup` is injected so tests can supply variables without touching the
/// process environment.
pub fn apply_env_overrides(
    config: &mut Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(url) = lookup("NVD_BASE_URL") {
        config.feed.base_url = url;
    }
    if let Some(per_page) = lookup("NVD_RESULTS_PER_PAGE") {
        config.feed.results_per_page = per_page
            .trim()
            .parse()
            .with_context(|| format!("NVD_RESULTS_PER_PAGE is not an integer: '{}'", per_page))?;
    }
    if let Some(path) = lookup("NVD_DB_PATH") {
        config.db.path = PathBuf::from(path);
    }
    if let Some(token) = lookup("ADMIN_SYNC_TOKEN") {
        config.server.admin_token = token;
    }
    Ok(())
}

pub fn validate(config: &Config) -> Result<()> {
    let feed = &config.feed;

    if feed.base_url.trim().is_empty() {
        bail!("feed.base_url must not be empty");
    }

    if feed.results_per_page == 0 || feed.results_per_page > MAX_RESULTS_PER_PAGE {
        bail!(
            "feed.results_per_page must be in [1, {}], got {}",
            MAX_RESULTS_PER_PAGE,
            feed.results_per_page
        );
    }

    if feed.request_timeout_secs == 0 {
        bail!("feed.request_timeout_secs must be > 0");
    }

    match feed.backoff.as_str() {
        "fixed" | "exponential" => {}
        other => bail!(
            "Unknown feed.backoff: '{}'. Must be fixed or exponential.",
            other
        ),
    }

    if config.server.admin_token.is_empty() {
        bail!("server.admin_token must not be empty");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_document_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.feed.results_per_page, 200);
        assert_eq!(config.feed.politeness_delay(), Duration::from_millis(300));
        assert_eq!(config.feed.retry_delay(), Duration::from_secs(5));
        assert_eq!(config.feed.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.feed.max_retries, None);
        assert_eq!(config.server.admin_token, "changeme");
        validate(&config).unwrap();
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = parse_config(
            r#"
[db]
path = "/tmp/file.sqlite"

[feed]
base_url = "http://file.example"
results_per_page = 50
"#,
        )
        .unwrap();

        let env: HashMap<&str, &str> = [
            ("NVD_BASE_URL", "http://env.example"),
            ("NVD_RESULTS_PER_PAGE", "75"),
            ("NVD_DB_PATH", "/tmp/env.sqlite"),
            ("ADMIN_SYNC_TOKEN", "s3cret"),
        ]
        .into_iter()
        .collect();

        apply_env_overrides(&mut config, |k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.feed.base_url, "http://env.example");
        assert_eq!(config.feed.results_per_page, 75);
        assert_eq!(config.db.path, PathBuf::from("/tmp/env.sqlite"));
        assert_eq!(config.server.admin_token, "s3cret");
    }

    #[test]
    fn non_numeric_page_size_override_is_rejected() {
        let mut config = Config::default();
        let err = apply_env_overrides(&mut config, |k| {
            (k == "NVD_RESULTS_PER_PAGE").then(|| "lots".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("NVD_RESULTS_PER_PAGE"));
    }

    #[test]
    fn page_size_bounds() {
        let mut config = Config::default();
        config.feed.results_per_page = 0;
        assert!(validate(&config).is_err());
        config.feed.results_per_page = MAX_RESULTS_PER_PAGE + 1;
        assert!(validate(&config).is_err());
        config.feed.results_per_page = MAX_RESULTS_PER_PAGE;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn unknown_backoff_rejected() {
        let config = parse_config("[feed]\nbackoff = \"jittery\"\n").unwrap();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("jittery"));
    }

    #[test]
    fn empty_admin_token_rejected() {
        let config = parse_config("[server]\nadmin_token = \"\"\n").unwrap();
        assert!(validate(&config).is_err());
    }
}
