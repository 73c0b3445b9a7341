//! Turns a global page number into something renderable.
//!
//! Structural pages resolve from the flat model alone. Content pages go through
//! the page cache and then the content API. Every `resolve` call takes a new
//! generation; a fetch that finishes after a newer call started is reported as
//! [`ResolveOutcome::Superseded`] instead of being handed to the caller.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context as _;

use crate::app::content_api::ContentApi;
use crate::app::page_cache::{CacheKey, PageCache};
use crate::flat::{FlatModel, FlatPageItem};
use crate::formats::{ContentDocument, PageRequest, PageRequestInput};

#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedPage {
    Structural(FlatPageItem),
    Content {
        page: FlatPageItem,
        content: ContentDocument,
        from_cache: bool,
    },
}

impl ResolvedPage {
    pub fn item(&self) -> &FlatPageItem {
        match self {
            Self::Structural(item) => item,
            Self::Content { page, .. } => page,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolveOutcome {
    Ready(ResolvedPage),
    Superseded,
}

/// Only section pages with a `pageId` have a remote body.
pub fn needs_content_fetch(item: &FlatPageItem) -> bool {
    item.is_content()
}

pub fn page_request_for(book_id: &str, item: &FlatPageItem) -> PageRequest {
    PageRequest {
        page: item.page,
        page_type: item.page_type,
        input: PageRequestInput {
            bookid: book_id.to_owned(),
            sthanam_number: item.sthanam_number,
            sthanam_id: item.sthanam_id.clone(),
            chapter_id: item.chapter_id.clone(),
            section_number: item.section_number,
            section_id: item.section_id.clone(),
        },
    }
}

pub struct PageContentResolver {
    api: Arc<dyn ContentApi>,
    cache: Arc<dyn PageCache>,
    generation: AtomicU64,
}

impl PageContentResolver {
    pub fn new(api: Arc<dyn ContentApi>, cache: Arc<dyn PageCache>) -> Self {
        Self {
            api,
            cache,
            generation: AtomicU64::new(0),
        }
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.current_generation() == generation
    }

    pub async fn resolve(&self, model: &FlatModel, page: u32) -> anyhow::Result<ResolveOutcome> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let item = model.by_number(page).ok_or_else(|| {
            anyhow::anyhow!(
                "page {page} is out of range (book has {} pages)",
                model.total_pages()
            )
        })?;

        if !needs_content_fetch(item) {
            return Ok(ResolveOutcome::Ready(ResolvedPage::Structural(item.clone())));
        }
        let Some(page_id) = item.page_id.as_deref() else {
            return Ok(ResolveOutcome::Ready(ResolvedPage::Structural(item.clone())));
        };
        let key = CacheKey::new(model.book_id(), page_id);

        match self.cache.load(&key).await {
            Ok(Some(cached)) => {
                if !self.is_current(generation) {
                    tracing::debug!(page, page_id, "dropping superseded cache hit");
                    return Ok(ResolveOutcome::Superseded);
                }
                tracing::debug!(page, page_id, cached_at = %cached.cached_at, "page cache hit");
                return Ok(ResolveOutcome::Ready(ResolvedPage::Content {
                    page: item.clone(),
                    content: cached.content,
                    from_cache: true,
                }));
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(page, page_id, error = %format!("{err:#}"), "page cache read failed; fetching");
            }
        }

        let request = page_request_for(model.book_id(), item);
        let fetched = self.api.fetch_page(model.book_id(), &request).await;
        let content = match fetched {
            Ok(content) => content,
            Err(_) if !self.is_current(generation) => {
                tracing::debug!(page, page_id, "dropping superseded fetch failure");
                return Ok(ResolveOutcome::Superseded);
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("fetch content for page {page} ({page_id})"));
            }
        };

        if let Err(err) = self.cache.store(&key, &content).await {
            tracing::warn!(page, page_id, error = %format!("{err:#}"), "page cache write failed");
        }

        if !self.is_current(generation) {
            tracing::debug!(page, page_id, generation, "dropping superseded page content");
            return Ok(ResolveOutcome::Superseded);
        }
        Ok(ResolveOutcome::Ready(ResolvedPage::Content {
            page: item.clone(),
            content,
            from_cache: false,
        }))
    }
}
