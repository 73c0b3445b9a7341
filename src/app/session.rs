use std::sync::Arc;

use anyhow::Context as _;
use tokio::sync::watch;

use crate::app::content_api::ContentApi;
use crate::flat::FlatModel;
use crate::navigation::Navigator;

#[derive(Debug, Clone)]
pub enum TocState {
    Loading,
    Ready(Arc<FlatModel>),
    Failed(String),
}

impl TocState {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

/// Owns the current flat model for one book. Readers hold an `Arc` snapshot;
/// a reload publishes a new one with a single channel send.
pub struct BookSession {
    book_id: String,
    api: Arc<dyn ContentApi>,
    state: watch::Sender<TocState>,
}

impl BookSession {
    pub fn new(book_id: impl Into<String>, api: Arc<dyn ContentApi>) -> Self {
        let (state, _) = watch::channel(TocState::Loading);
        Self {
            book_id: book_id.into(),
            api,
            state,
        }
    }

    pub fn book_id(&self) -> &str {
        &self.book_id
    }

    pub fn snapshot(&self) -> TocState {
        self.state.borrow().clone()
    }

    pub fn model(&self) -> Option<Arc<FlatModel>> {
        match &*self.state.borrow() {
            TocState::Ready(model) => Some(Arc::clone(model)),
            _ => None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<TocState> {
        self.state.subscribe()
    }

    /// `None` until a model has been loaded.
    pub fn navigator(&self) -> Option<Navigator> {
        self.model().map(Navigator::new)
    }

    /// Fetches and flattens the TOC. A failed refresh keeps the previous
    /// ready model; a failed first load publishes [`TocState::Failed`].
    pub async fn load(&self) -> anyhow::Result<Arc<FlatModel>> {
        let previous = self.model();
        if previous.is_none() {
            self.state.send_replace(TocState::Loading);
        }

        let result = async {
            let doc = self.api.fetch_toc(&self.book_id).await?;
            let model = crate::toc::flatten(&doc, &self.book_id)?;
            anyhow::Ok(model)
        }
        .await
        .with_context(|| format!("load toc for book {}", self.book_id));

        match result {
            Ok(model) => {
                let model = Arc::new(model);
                if let Some(prev) = &previous
                    && prev.sequence_digest() == model.sequence_digest()
                {
                    tracing::debug!(book_id = %self.book_id, "toc unchanged after refresh");
                }
                tracing::info!(
                    book_id = %self.book_id,
                    total_pages = model.total_pages(),
                    "toc ready"
                );
                self.state.send_replace(TocState::Ready(Arc::clone(&model)));
                Ok(model)
            }
            Err(err) => {
                if previous.is_some() {
                    tracing::warn!(
                        book_id = %self.book_id,
                        error = %format!("{err:#}"),
                        "toc refresh failed; keeping previous model"
                    );
                } else {
                    self.state.send_replace(TocState::Failed(format!("{err:#}")));
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::test_support::StubApi;
    use crate::toc::fixtures::{larger_book, page, scenario_a};

    #[tokio::test]
    async fn load_publishes_ready_model() -> anyhow::Result<()> {
        let session = BookSession::new("book-1", Arc::new(StubApi::new(scenario_a())));
        let mut rx = session.subscribe();
        assert!(matches!(session.snapshot(), TocState::Loading));
        assert!(session.navigator().is_none());

        let model = session.load().await?;
        assert_eq!(model.total_pages(), 8);

        rx.changed().await?;
        assert!(rx.borrow().is_ready());
        let nav = session.navigator().expect("ready");
        assert_eq!(nav.current_page(), 1);
        assert_eq!(nav.total_pages(), 8);
        Ok(())
    }

    #[tokio::test]
    async fn first_load_failure_is_published() -> anyhow::Result<()> {
        let api = StubApi::new(scenario_a());
        api.set_toc(Err(anyhow::anyhow!("upstream down")));
        let session = BookSession::new("book-1", Arc::new(api));

        let err = session.load().await.expect_err("load fails");
        assert!(format!("{err:#}").contains("book-1"));
        let TocState::Failed(msg) = session.snapshot() else {
            panic!("expected failed state");
        };
        assert!(msg.contains("upstream down"));
        assert!(session.navigator().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn refresh_failure_keeps_previous_snapshot() -> anyhow::Result<()> {
        let api = Arc::new(StubApi::new(scenario_a()));
        let session = BookSession::new("book-1", api.clone());
        let first = session.load().await?;

        let mut invalid = scenario_a();
        invalid.sthanams[0].chapters[0].sections[1].pages = vec![page("p1")];
        api.set_toc(Ok(invalid));
        assert!(session.load().await.is_err());

        let kept = session.model().expect("still ready");
        assert!(Arc::ptr_eq(&first, &kept));
        Ok(())
    }

    #[tokio::test]
    async fn refresh_swaps_model_without_touching_held_snapshots() -> anyhow::Result<()> {
        let api = Arc::new(StubApi::new(scenario_a()));
        let session = BookSession::new("book-1", api.clone());
        let held = session.load().await?;

        api.set_toc(Ok(larger_book()));
        let fresh = session.load().await?;

        assert_eq!(held.total_pages(), 8);
        assert_eq!(fresh.total_pages(), 18);
        assert_eq!(session.model().map(|m| m.total_pages()), Some(18));
        assert_eq!(api.toc_calls.load(std::sync::atomic::Ordering::SeqCst), 2);
        Ok(())
    }
}
