//! Reading position over a [`FlatModel`].
//!
//! Two kinds of movement are exposed separately: sequential (`next` /
//! `previous`, exactly one global page) and structural (`next_toc_entry`,
//! `next_chapter`, ...), which may skip several content pages at once.
//! Every move returns `false` and leaves the position untouched when it
//! cannot be made.

use std::sync::Arc;

use crate::flat::{ChapterPageRange, FlatModel, FlatPageItem, TocEntry};

#[derive(Debug, Clone)]
pub struct Navigator {
    model: Arc<FlatModel>,
    initial_page: u32,
    current_page: u32,
}

impl Navigator {
    pub fn new(model: Arc<FlatModel>) -> Self {
        Self::starting_at(model, 1)
    }

    /// Starts at `page`, falling back to page 1 when it is out of range.
    pub fn starting_at(model: Arc<FlatModel>, page: u32) -> Self {
        let page = if (1..=model.total_pages()).contains(&page) {
            page
        } else {
            1
        };
        Self {
            model,
            initial_page: page,
            current_page: page,
        }
    }

    pub fn model(&self) -> &Arc<FlatModel> {
        &self.model
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn total_pages(&self) -> u32 {
        self.model.total_pages()
    }

    pub fn current(&self) -> Option<&FlatPageItem> {
        self.model.by_number(self.current_page)
    }

    pub fn go_to_page(&mut self, page: u32) -> bool {
        if page < 1 || page > self.total_pages() {
            tracing::warn!(
                page,
                total_pages = self.total_pages(),
                "page out of range; ignoring"
            );
            return false;
        }
        self.current_page = page;
        true
    }

    pub fn can_go_next(&self) -> bool {
        self.current_page < self.total_pages()
    }

    pub fn can_go_previous(&self) -> bool {
        self.current_page > 1
    }

    pub fn next(&mut self) -> bool {
        if !self.can_go_next() {
            return false;
        }
        self.current_page += 1;
        true
    }

    pub fn previous(&mut self) -> bool {
        if !self.can_go_previous() {
            return false;
        }
        self.current_page -= 1;
        true
    }

    pub fn reset(&mut self) {
        self.current_page = self.initial_page;
    }

    /// Percentage of the book read, in `(0, 100]` for a non-empty book.
    pub fn progress(&self) -> f64 {
        let total = self.total_pages();
        if total == 0 {
            return 0.0;
        }
        f64::from(self.current_page) / f64::from(total) * 100.0
    }

    pub fn go_to_page_id(&mut self, page_id: &str) -> bool {
        match self.model.page_number_for(page_id) {
            Some(page) => self.go_to_page(page),
            None => false,
        }
    }

    pub fn go_to_section(&mut self, section_id: &str) -> bool {
        match self.model.section_range(section_id) {
            Some(range) => self.go_to_page(range.intro_page),
            None => false,
        }
    }

    pub fn go_to_chapter(&mut self, chapter_id: &str) -> bool {
        match self.model.chapter_range(chapter_id) {
            Some(range) => self.go_to_page(range.intro_page),
            None => false,
        }
    }

    pub fn go_to_sthanam(&mut self, sthanam_id: &str) -> bool {
        match self.model.sthanam_range(sthanam_id) {
            Some(range) => self.go_to_page(range.intro_page),
            None => false,
        }
    }

    /// Outline entry that contains the current page.
    pub fn current_toc_entry(&self) -> Option<&TocEntry> {
        let idx = self.model.toc_index_for_page(self.current_page)?;
        self.model.toc_entries().get(idx)
    }

    /// Moves to the first outline entry after the current page.
    pub fn next_toc_entry(&mut self) -> bool {
        let entries = self.model.toc_entries();
        let after = entries.partition_point(|e| e.page <= self.current_page);
        match entries.get(after) {
            Some(entry) => self.go_to_page(entry.page),
            None => false,
        }
    }

    /// Moves to the outline entry before the one containing the current page.
    /// From cover or TOC there is nothing earlier in the outline.
    pub fn previous_toc_entry(&mut self) -> bool {
        let Some(idx) = self.model.toc_index_for_page(self.current_page) else {
            return false;
        };
        let Some(prev) = idx.checked_sub(1) else {
            return false;
        };
        let page = self.model.toc_entries()[prev].page;
        self.go_to_page(page)
    }

    pub fn current_chapter(&self) -> Option<&ChapterPageRange> {
        self.model.chapter_for_page(self.current_page)
    }

    /// Moves to the intro page of the first chapter starting after the current page.
    pub fn next_chapter(&mut self) -> bool {
        let chapters = self.model.chapter_ranges();
        let after = chapters.partition_point(|c| c.intro_page <= self.current_page);
        match chapters.get(after) {
            Some(chapter) => self.go_to_page(chapter.intro_page),
            None => false,
        }
    }

    /// Moves to the intro page of the chapter before the current one. Outside
    /// any chapter, moves to the last chapter starting before the current page.
    pub fn previous_chapter(&mut self) -> bool {
        let chapters = self.model.chapter_ranges();
        let at_or_before = chapters.partition_point(|c| c.intro_page <= self.current_page);
        let target = match self.model.chapter_for_page(self.current_page) {
            Some(_) => at_or_before.checked_sub(2),
            None => at_or_before.checked_sub(1),
        };
        match target.and_then(|idx| chapters.get(idx)) {
            Some(chapter) => self.go_to_page(chapter.intro_page),
            None => false,
        }
    }
}
