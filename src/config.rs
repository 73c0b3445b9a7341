use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use url::Url;

pub const DEFAULT_CACHE_DIR: &str = ".bookpages-cache";

#[derive(Debug, Clone)]
pub struct ReaderConfig {
    pub api_url: Option<Url>,
    pub api_token: Option<String>,
    pub cache_dir: PathBuf,
    pub prefetch_count: u32,
    pub prefetch_concurrency: usize,
    pub cache_max_age_days: u32,
    pub retry: RetryPolicy,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_token: None,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            prefetch_count: 2,
            prefetch_concurrency: 2,
            cache_max_age_days: 7,
            retry: RetryPolicy::default(),
        }
    }
}

impl ReaderConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = non_empty(lookup("BOOKPAGES_API_URL")) {
            config.api_url = Some(
                parse_api_url(&raw)
                    .with_context(|| format!("invalid BOOKPAGES_API_URL={raw:?}"))?,
            );
        }
        config.api_token = non_empty(lookup("BOOKPAGES_API_TOKEN"));
        if let Some(raw) = non_empty(lookup("BOOKPAGES_CACHE_DIR")) {
            config.cache_dir = PathBuf::from(raw);
        }
        if let Some(raw) = non_empty(lookup("BOOKPAGES_PREFETCH_COUNT")) {
            config.prefetch_count = raw
                .parse()
                .with_context(|| format!("invalid BOOKPAGES_PREFETCH_COUNT={raw:?}"))?;
        }
        if let Some(raw) = non_empty(lookup("BOOKPAGES_PREFETCH_CONCURRENCY")) {
            config.prefetch_concurrency = raw
                .parse()
                .with_context(|| format!("invalid BOOKPAGES_PREFETCH_CONCURRENCY={raw:?}"))?;
        }
        if let Some(raw) = non_empty(lookup("BOOKPAGES_CACHE_MAX_AGE_DAYS")) {
            config.cache_max_age_days = raw
                .parse()
                .with_context(|| format!("invalid BOOKPAGES_CACHE_MAX_AGE_DAYS={raw:?}"))?;
        }

        Ok(config)
    }

    pub fn require_api_url(&self) -> anyhow::Result<&Url> {
        self.api_url
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("BOOKPAGES_API_URL (or --api-url) is required"))
    }
}

pub fn parse_api_url(raw: &str) -> anyhow::Result<Url> {
    let url = Url::parse(raw.trim()).context("parse api url")?;
    if url.scheme() != "http" && url.scheme() != "https" {
        anyhow::bail!("api url must be http/https: {url}");
    }
    Ok(url)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// Exponential backoff: `min(base * 2^attempt, max)` between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub toc_retries: u32,
    pub page_retries: u32,
    pub base_delay: Duration,
    pub toc_max_delay: Duration,
    pub page_max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            toc_retries: 3,
            page_retries: 2,
            base_delay: Duration::from_millis(1000),
            toc_max_delay: Duration::from_secs(30),
            page_max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            toc_retries: 0,
            page_retries: 0,
            ..Self::default()
        }
    }

    pub fn delay_for(&self, attempt: u32, max: Duration) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(max)
    }
}
