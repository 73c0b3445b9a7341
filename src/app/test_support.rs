use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::app::content_api::ContentApi;
use crate::formats::{ContentDocument, NestedBookStructure, PageRequest};

pub fn content_for(page: u32) -> ContentDocument {
    serde_json::from_value(serde_json::json!({
        "blocks": [{ "type": "paragraph", "data": { "text": format!("page {page}") } }],
    }))
    .expect("static content document")
}

/// In-process [`ContentApi`] with knobs for holding or failing single pages.
pub struct StubApi {
    pub toc: Mutex<anyhow::Result<NestedBookStructure>>,
    pub page_calls: Mutex<Vec<u32>>,
    pub toc_calls: AtomicUsize,
    pub hold_page: Option<u32>,
    pub fail_pages: HashSet<u32>,
    pub started: Notify,
    pub release: Notify,
}

impl StubApi {
    pub fn new(toc: NestedBookStructure) -> Self {
        Self {
            toc: Mutex::new(Ok(toc)),
            page_calls: Mutex::new(Vec::new()),
            toc_calls: AtomicUsize::new(0),
            hold_page: None,
            fail_pages: HashSet::new(),
            started: Notify::new(),
            release: Notify::new(),
        }
    }

    pub fn holding(mut self, page: u32) -> Self {
        self.hold_page = Some(page);
        self
    }

    pub fn failing(mut self, page: u32) -> Self {
        self.fail_pages.insert(page);
        self
    }

    pub fn set_toc(&self, toc: anyhow::Result<NestedBookStructure>) {
        *self.toc.lock().expect("toc lock") = toc;
    }

    pub fn page_calls(&self) -> Vec<u32> {
        self.page_calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl ContentApi for StubApi {
    async fn fetch_toc(&self, _book_id: &str) -> anyhow::Result<NestedBookStructure> {
        self.toc_calls.fetch_add(1, Ordering::SeqCst);
        match &*self.toc.lock().expect("toc lock") {
            Ok(doc) => Ok(doc.clone()),
            Err(err) => Err(anyhow::anyhow!("{err:#}")),
        }
    }

    async fn fetch_page(
        &self,
        _book_id: &str,
        request: &PageRequest,
    ) -> anyhow::Result<ContentDocument> {
        self.page_calls
            .lock()
            .expect("calls lock")
            .push(request.page);
        if self.hold_page == Some(request.page) {
            self.started.notify_one();
            self.release.notified().await;
        }
        if self.fail_pages.contains(&request.page) {
            anyhow::bail!("stub failure for page {}", request.page);
        }
        Ok(content_for(request.page))
    }
}
