use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use url::Url;

use crate::config::{ReaderConfig, RetryPolicy};
use crate::formats::{ContentDocument, NestedBookStructure, PageRequest};

#[async_trait]
pub trait ContentApi: Send + Sync {
    async fn fetch_toc(&self, book_id: &str) -> anyhow::Result<NestedBookStructure>;
    async fn fetch_page(
        &self,
        book_id: &str,
        request: &PageRequest,
    ) -> anyhow::Result<ContentDocument>;
}

#[derive(Debug, Clone)]
pub struct HttpContentApi {
    client: reqwest::Client,
    base_url: Url,
    auth_token: Option<String>,
    retry: RetryPolicy,
}

impl HttpContentApi {
    pub fn new(base_url: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            auth_token: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn from_config(config: &ReaderConfig) -> anyhow::Result<Self> {
        let base_url = config.require_api_url()?.clone();
        let mut api = Self::new(base_url).with_retry(config.retry);
        if let Some(token) = &config.api_token {
            api = api.with_auth_token(token.clone());
        }
        Ok(api)
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// `{base}/books/{bookId}/{leaf}` with the book id percent-encoded.
    pub fn endpoint(&self, book_id: &str, leaf: &str) -> anyhow::Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("api url cannot be a base: {}", self.base_url))?
            .pop_if_empty()
            .extend(["books", book_id, leaf]);
        Ok(url)
    }

    async fn send_with_retry(
        &self,
        what: &str,
        retries: u32,
        max_delay: Duration,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> anyhow::Result<Vec<u8>> {
        let attempts = retries.saturating_add(1);
        let mut attempt = 0;
        loop {
            let mut req = build().header(ACCEPT, "application/json");
            if let Some(token) = &self.auth_token {
                req = req.bearer_auth(token);
            }

            let err = match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let bytes = resp
                            .bytes()
                            .await
                            .with_context(|| format!("{what}: read response body"))?;
                        return Ok(bytes.to_vec());
                    }
                    let body = resp.text().await.unwrap_or_default();
                    let err = anyhow::anyhow!("{what} failed ({status}): {}", body.trim());
                    if !is_retryable(status) {
                        return Err(err);
                    }
                    err
                }
                Err(err) => anyhow::Error::new(err).context(format!("{what}: send request")),
            };

            attempt += 1;
            if attempt >= attempts {
                return Err(err);
            }
            let delay = self.retry.delay_for(attempt - 1, max_delay);
            tracing::warn!(
                attempt,
                attempts,
                delay_ms = delay.as_millis() as u64,
                error = %format!("{err:#}"),
                "{what} failed; retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

#[derive(serde::Serialize)]
struct PageRequestBody<'a> {
    params: &'a PageRequest,
}

#[async_trait]
impl ContentApi for HttpContentApi {
    async fn fetch_toc(&self, book_id: &str) -> anyhow::Result<NestedBookStructure> {
        let url = self.endpoint(book_id, "generate-pages")?;
        tracing::debug!(book_id, %url, "fetch toc");

        let bytes = self
            .send_with_retry(
                &format!("GET {url}"),
                self.retry.toc_retries,
                self.retry.toc_max_delay,
                || self.client.get(url.clone()),
            )
            .await?;
        crate::toc::parse_document(&bytes).with_context(|| format!("parse toc for book {book_id}"))
    }

    async fn fetch_page(
        &self,
        book_id: &str,
        request: &PageRequest,
    ) -> anyhow::Result<ContentDocument> {
        let url = self.endpoint(book_id, "page")?;
        tracing::debug!(book_id, page = request.page, %url, "fetch page content");

        let body = PageRequestBody { params: request };
        let bytes = self
            .send_with_retry(
                &format!("POST {url}"),
                self.retry.page_retries,
                self.retry.page_max_delay,
                || self.client.post(url.clone()).json(&body),
            )
            .await?;
        parse_content(&bytes)
    }
}

pub fn parse_content(bytes: &[u8]) -> anyhow::Result<ContentDocument> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).context("parse page content json")?;
    if !value.get("blocks").is_some_and(|b| b.is_array()) {
        anyhow::bail!("page content has no `blocks` array");
    }
    serde_json::from_value(value).context("decode page content blocks")
}
