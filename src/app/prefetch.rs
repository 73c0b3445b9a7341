use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use crate::app::content_api::ContentApi;
use crate::app::page_cache::{CacheKey, PageCache};
use crate::app::queue::BackgroundQueue;
use crate::app::resolver::page_request_for;
use crate::flat::{FlatModel, FlatPageItem};

/// Warms the page cache in the background. Jobs run on their own bounded
/// queue and share nothing with the foreground resolver except the cache.
pub struct Prefetcher {
    api: Arc<dyn ContentApi>,
    cache: Arc<dyn PageCache>,
    queue: BackgroundQueue,
    in_flight: Arc<Mutex<HashSet<CacheKey>>>,
}

impl Prefetcher {
    pub fn new(api: Arc<dyn ContentApi>, cache: Arc<dyn PageCache>, queue: BackgroundQueue) -> Self {
        Self {
            api,
            cache,
            queue,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Schedules the next `count` content pages after `current_page`. The scan
    /// starts at `current_page + 1` and stops once `count` pages are found.
    pub fn schedule_ahead(
        &self,
        model: &FlatModel,
        current_page: u32,
        count: u32,
    ) -> Vec<JoinHandle<()>> {
        let after = model
            .pages()
            .get(current_page as usize..)
            .unwrap_or_default();
        let items = after
            .iter()
            .filter(|item| item.is_content())
            .take(count as usize)
            .cloned()
            .collect::<Vec<_>>();
        self.schedule(model.book_id(), items)
    }

    /// Schedules every content page in `start..=end`, e.g. after a TOC jump.
    /// Bounds are clamped to the book.
    pub fn prefetch_range(&self, model: &FlatModel, start: u32, end: u32) -> Vec<JoinHandle<()>> {
        let from = start.max(1) as usize - 1;
        let to = end.min(model.total_pages()) as usize;
        let window = model.pages().get(from..to).unwrap_or_default();
        let items = window
            .iter()
            .filter(|item| item.is_content())
            .cloned()
            .collect::<Vec<_>>();
        self.schedule(model.book_id(), items)
    }

    fn schedule(&self, book_id: &str, items: Vec<FlatPageItem>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(items.len());
        for item in items {
            let Some(page_id) = item.page_id.clone() else {
                continue;
            };
            let key = CacheKey::new(book_id, page_id);
            let inserted = self
                .in_flight
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(key.clone());
            if !inserted {
                tracing::debug!(page = item.page, page_id = %key.page_id, "prefetch already in flight");
                continue;
            }

            let api = Arc::clone(&self.api);
            let cache = Arc::clone(&self.cache);
            let in_flight = Arc::clone(&self.in_flight);
            handles.push(self.queue.spawn(async move {
                prefetch_one(api.as_ref(), cache.as_ref(), &key, &item).await;
                in_flight
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&key);
            }));
        }
        handles
    }
}

async fn prefetch_one(api: &dyn ContentApi, cache: &dyn PageCache, key: &CacheKey, item: &FlatPageItem) {
    match cache.contains(key).await {
        Ok(true) => {
            tracing::debug!(page = item.page, page_id = %key.page_id, "prefetch skipped; cached");
            return;
        }
        Ok(false) => {}
        Err(err) => {
            tracing::warn!(page_id = %key.page_id, error = %format!("{err:#}"), "prefetch cache check failed");
        }
    }

    let request = page_request_for(&key.book_id, item);
    let content = match api.fetch_page(&key.book_id, &request).await {
        Ok(content) => content,
        Err(err) => {
            tracing::warn!(
                page = item.page,
                page_id = %key.page_id,
                error = %format!("{err:#}"),
                "prefetch failed"
            );
            return;
        }
    };
    match cache.store(key, &content).await {
        Ok(()) => tracing::debug!(page = item.page, page_id = %key.page_id, "prefetched"),
        Err(err) => {
            tracing::warn!(page_id = %key.page_id, error = %format!("{err:#}"), "prefetch cache write failed");
        }
    }
}
