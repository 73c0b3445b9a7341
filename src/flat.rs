//! The flattened page model and its lookup indices.
//!
//! A [`FlatModel`] is built once per TOC fetch by [`crate::toc::flatten`] and is
//! immutable afterwards. Page numbers are contiguous from 1, so `pageByNumber`
//! is the page vector itself.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

pub const CACHE_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PageType {
    CoverPage,
    #[serde(rename = "TOC")]
    Toc,
    BookSection,
    Sthanam,
    Chapter,
    Section,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlatPageItem {
    pub page: u32,
    pub page_type: PageType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book_section_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sthanam_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sthanam_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_number: Option<u32>,

    pub toc_header: String,
    pub display_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_page_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_order: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub available_translations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_page_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_total_pages: Option<u32>,
    pub is_first_in_section: bool,
    pub is_last_in_section: bool,
    pub is_first_in_chapter: bool,
}

impl FlatPageItem {
    /// A page with no parent links or pagination metadata.
    pub fn structural(page: u32, page_type: PageType, header: impl Into<String>) -> Self {
        let header = header.into();
        Self {
            page,
            page_type,
            page_id: None,
            element_id: None,
            book_section_id: None,
            sthanam_id: None,
            sthanam_number: None,
            chapter_id: None,
            section_id: None,
            section_number: None,
            display_title: header.clone(),
            toc_header: header,
            description: None,
            original_page_number: None,
            page_order: None,
            available_translations: Vec::new(),
            updated_at: None,
            section_page_index: None,
            section_total_pages: None,
            is_first_in_section: false,
            is_last_in_section: false,
            is_first_in_chapter: false,
        }
    }

    /// Section pages that carry a `pageId` are the only ones with remote content.
    pub fn is_content(&self) -> bool {
        self.page_type == PageType::Section && self.page_id.is_some()
    }

    pub fn is_structural(&self) -> bool {
        !self.is_content()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookMetadata {
    pub title: String,
    pub author: String,
    pub publisher: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub toc_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageSpan {
    pub start: u32,
    pub end: u32,
}

impl PageSpan {
    pub fn contains(&self, page: u32) -> bool {
        self.start <= page && page <= self.end
    }

    pub fn contains_span(&self, other: &PageSpan) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SectionPageRange {
    pub section_id: String,
    pub chapter_id: String,
    pub sthanam_id: String,
    pub intro_page: u32,
    /// Equals `last_content_page + 1` when the section has no content pages.
    pub first_content_page: u32,
    pub last_content_page: u32,
    /// Including the intro page.
    pub total_pages: u32,
    pub page_ids: Vec<String>,
    pub header: String,
}

impl SectionPageRange {
    pub fn span(&self) -> PageSpan {
        PageSpan {
            start: self.intro_page,
            end: self.last_content_page,
        }
    }

    pub fn content_pages(&self) -> RangeInclusive<u32> {
        self.first_content_page..=self.last_content_page
    }

    pub fn has_content(&self) -> bool {
        !self.page_ids.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChapterPageRange {
    pub chapter_id: String,
    pub sthanam_id: String,
    pub intro_page: u32,
    pub sections: Vec<String>,
    pub page_range: PageSpan,
    pub header: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SthanamPageRange {
    pub sthanam_id: String,
    pub intro_page: u32,
    pub chapters: Vec<String>,
    pub page_range: PageSpan,
    pub header: String,
}

/// One row of the navigation outline shown on the TOC page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TocEntry {
    pub page: u32,
    pub page_type: PageType,
    pub header: String,
    /// 1 = book section / sthanam, 2 = chapter, 3 = section.
    pub level: u8,
    pub has_children: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Breadcrumb {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book_section: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sthanam: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatModel {
    cache_version: String,
    book_id: String,
    server_updated_at: Option<String>,
    sequence_digest: String,
    book_metadata: BookMetadata,
    total_pages: u32,
    page_sequence: Vec<FlatPageItem>,
    page_id_to_number: BTreeMap<String, u32>,
    section_page_ranges: Vec<SectionPageRange>,
    chapter_page_ranges: Vec<ChapterPageRange>,
    sthanam_page_ranges: Vec<SthanamPageRange>,

    #[serde(skip)]
    toc_entries: Vec<TocEntry>,
    #[serde(skip)]
    section_index: HashMap<String, usize>,
    #[serde(skip)]
    chapter_index: HashMap<String, usize>,
    #[serde(skip)]
    sthanam_index: HashMap<String, usize>,
}

pub(crate) struct FlatModelParts {
    pub book_id: String,
    pub book_metadata: BookMetadata,
    pub server_updated_at: Option<String>,
    pub pages: Vec<FlatPageItem>,
    pub sections: Vec<SectionPageRange>,
    pub chapters: Vec<ChapterPageRange>,
    pub sthanams: Vec<SthanamPageRange>,
}

impl FlatModel {
    pub(crate) fn from_parts(parts: FlatModelParts) -> Result<Self, serde_json::Error> {
        let FlatModelParts {
            book_id,
            book_metadata,
            server_updated_at,
            pages,
            sections,
            chapters,
            sthanams,
        } = parts;

        debug_assert!(
            pages
                .iter()
                .enumerate()
                .all(|(idx, p)| p.page as usize == idx + 1),
            "page numbers must be contiguous from 1"
        );

        let sequence_digest = hex::encode(Sha256::digest(serde_json::to_vec(&pages)?));

        let page_id_to_number = pages
            .iter()
            .filter_map(|p| p.page_id.as_ref().map(|id| (id.clone(), p.page)))
            .collect::<BTreeMap<_, _>>();

        let section_index = sections
            .iter()
            .enumerate()
            .map(|(idx, s)| (s.section_id.clone(), idx))
            .collect::<HashMap<_, _>>();
        let chapter_index = chapters
            .iter()
            .enumerate()
            .map(|(idx, c)| (c.chapter_id.clone(), idx))
            .collect::<HashMap<_, _>>();
        let sthanam_index = sthanams
            .iter()
            .enumerate()
            .map(|(idx, s)| (s.sthanam_id.clone(), idx))
            .collect::<HashMap<_, _>>();

        let toc_entries = build_toc_entries(&pages, &sections, &chapters, &sthanams);

        Ok(Self {
            cache_version: CACHE_VERSION.to_owned(),
            book_id,
            server_updated_at,
            sequence_digest,
            book_metadata,
            total_pages: pages.len() as u32,
            page_sequence: pages,
            page_id_to_number,
            section_page_ranges: sections,
            chapter_page_ranges: chapters,
            sthanam_page_ranges: sthanams,
            toc_entries,
            section_index,
            chapter_index,
            sthanam_index,
        })
    }

    pub fn cache_version(&self) -> &str {
        &self.cache_version
    }

    pub fn book_id(&self) -> &str {
        &self.book_id
    }

    /// Most recent `updatedAt` across the emitted content pages.
    pub fn server_updated_at(&self) -> Option<&str> {
        self.server_updated_at.as_deref()
    }

    /// SHA-256 of the serialized page sequence.
    pub fn sequence_digest(&self) -> &str {
        &self.sequence_digest
    }

    pub fn metadata(&self) -> &BookMetadata {
        &self.book_metadata
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn pages(&self) -> &[FlatPageItem] {
        &self.page_sequence
    }

    pub fn content_pages(&self) -> impl Iterator<Item = &FlatPageItem> {
        self.page_sequence.iter().filter(|p| p.is_content())
    }

    pub fn by_number(&self, page: u32) -> Option<&FlatPageItem> {
        let idx = (page as usize).checked_sub(1)?;
        self.page_sequence.get(idx)
    }

    pub fn page_number_for(&self, page_id: &str) -> Option<u32> {
        self.page_id_to_number.get(page_id).copied()
    }

    pub fn by_page_id(&self, page_id: &str) -> Option<&FlatPageItem> {
        self.page_number_for(page_id)
            .and_then(|page| self.by_number(page))
    }

    pub fn section_range(&self, section_id: &str) -> Option<&SectionPageRange> {
        self.section_index
            .get(section_id)
            .map(|&idx| &self.section_page_ranges[idx])
    }

    pub fn chapter_range(&self, chapter_id: &str) -> Option<&ChapterPageRange> {
        self.chapter_index
            .get(chapter_id)
            .map(|&idx| &self.chapter_page_ranges[idx])
    }

    pub fn sthanam_range(&self, sthanam_id: &str) -> Option<&SthanamPageRange> {
        self.sthanam_index
            .get(sthanam_id)
            .map(|&idx| &self.sthanam_page_ranges[idx])
    }

    pub fn section_ranges(&self) -> &[SectionPageRange] {
        &self.section_page_ranges
    }

    pub fn chapter_ranges(&self) -> &[ChapterPageRange] {
        &self.chapter_page_ranges
    }

    pub fn sthanam_ranges(&self) -> &[SthanamPageRange] {
        &self.sthanam_page_ranges
    }

    /// Content page records of a section, in reading order.
    pub fn section_pages(&self, section_id: &str) -> &[FlatPageItem] {
        let Some(range) = self.section_range(section_id) else {
            return &[];
        };
        if !range.has_content() {
            return &[];
        }
        let start = range.first_content_page as usize - 1;
        let end = range.last_content_page as usize;
        &self.page_sequence[start..end]
    }

    pub fn toc_entries(&self) -> &[TocEntry] {
        &self.toc_entries
    }

    /// Index into [`Self::toc_entries`] of the last entry at or before `page`.
    pub fn toc_index_for_page(&self, page: u32) -> Option<usize> {
        let after = self.toc_entries.partition_point(|e| e.page <= page);
        after.checked_sub(1)
    }

    pub fn chapter_for_page(&self, page: u32) -> Option<&ChapterPageRange> {
        let after = self
            .chapter_page_ranges
            .partition_point(|c| c.page_range.start <= page);
        let candidate = &self.chapter_page_ranges[after.checked_sub(1)?];
        candidate.page_range.contains(page).then_some(candidate)
    }

    pub fn sthanam_for_page(&self, page: u32) -> Option<&SthanamPageRange> {
        let after = self
            .sthanam_page_ranges
            .partition_point(|s| s.page_range.start <= page);
        let candidate = &self.sthanam_page_ranges[after.checked_sub(1)?];
        candidate.page_range.contains(page).then_some(candidate)
    }

    pub fn breadcrumb(&self, page: u32) -> Option<Breadcrumb> {
        let item = self.by_number(page)?;
        let mut crumb = Breadcrumb::default();
        if item.page_type == PageType::BookSection {
            crumb.book_section = Some(item.toc_header.clone());
        }
        crumb.sthanam = item
            .sthanam_id
            .as_deref()
            .and_then(|id| self.sthanam_range(id))
            .map(|r| r.header.clone());
        crumb.chapter = item
            .chapter_id
            .as_deref()
            .and_then(|id| self.chapter_range(id))
            .map(|r| r.header.clone());
        crumb.section = item
            .section_id
            .as_deref()
            .and_then(|id| self.section_range(id))
            .map(|r| r.header.clone());
        Some(crumb)
    }
}

fn build_toc_entries(
    pages: &[FlatPageItem],
    sections: &[SectionPageRange],
    chapters: &[ChapterPageRange],
    sthanams: &[SthanamPageRange],
) -> Vec<TocEntry> {
    let section_intros = sections
        .iter()
        .map(|s| s.intro_page)
        .collect::<HashSet<_>>();
    let parent_chapters = chapters
        .iter()
        .filter(|c| !c.sections.is_empty())
        .map(|c| c.intro_page)
        .collect::<HashSet<_>>();
    let parent_sthanams = sthanams
        .iter()
        .filter(|s| !s.chapters.is_empty())
        .map(|s| s.intro_page)
        .collect::<HashSet<_>>();

    let mut entries = Vec::new();
    for page in pages {
        let (level, has_children, parent_id) = match page.page_type {
            PageType::CoverPage | PageType::Toc => continue,
            PageType::BookSection => (1, false, None),
            PageType::Sthanam => (1, parent_sthanams.contains(&page.page), None),
            PageType::Chapter => (
                2,
                parent_chapters.contains(&page.page),
                page.sthanam_id.clone(),
            ),
            PageType::Section if section_intros.contains(&page.page) => {
                (3, false, page.chapter_id.clone())
            }
            PageType::Section => continue,
        };
        entries.push(TocEntry {
            page: page.page,
            page_type: page.page_type,
            header: page.toc_header.clone(),
            level,
            has_children,
            parent_id,
        });
    }
    entries
}
