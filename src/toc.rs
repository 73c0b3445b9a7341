use std::collections::HashSet;

use thiserror::Error;

use crate::flat::{
    BookMetadata, ChapterPageRange, FlatModel, FlatModelParts, FlatPageItem, PageSpan, PageType,
    SectionPageRange, SthanamPageRange,
};
use crate::formats::{NestedBookSection, NestedBookStructure, NestedChapter, NestedSection, NestedSthanam};

#[derive(Debug, Error)]
pub enum TocError {
    #[error("missing required field `{0}`")]
    MissingField(String),
    #[error("field `{field}` must be {expected}")]
    InvalidField {
        field: String,
        expected: &'static str,
    },
    #[error("field `{0}` must not be empty")]
    EmptyField(String),
    #[error("duplicate {kind} `{id}` at `{field}`")]
    DuplicateId {
        kind: &'static str,
        id: String,
        field: String,
    },
    #[error("malformed toc document: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("serialize page sequence: {0}")]
    Digest(#[source] serde_json::Error),
}

/// Parses a TOC response body. Top-level shape problems are reported with the
/// offending field name before serde gets a chance to produce a generic error.
pub fn parse_document(bytes: &[u8]) -> Result<NestedBookStructure, TocError> {
    let value: serde_json::Value = serde_json::from_slice(bytes).map_err(TocError::Malformed)?;
    let object = value.as_object().ok_or_else(|| TocError::InvalidField {
        field: "$".to_owned(),
        expected: "an object",
    })?;

    match object.get("title") {
        None | Some(serde_json::Value::Null) => {
            return Err(TocError::MissingField("title".to_owned()));
        }
        Some(serde_json::Value::String(_)) => {}
        Some(_) => {
            return Err(TocError::InvalidField {
                field: "title".to_owned(),
                expected: "a string",
            });
        }
    }
    match object.get("sthanams") {
        None | Some(serde_json::Value::Null) => {
            return Err(TocError::MissingField("sthanams".to_owned()));
        }
        Some(serde_json::Value::Array(_)) => {}
        Some(_) => {
            return Err(TocError::InvalidField {
                field: "sthanams".to_owned(),
                expected: "an array",
            });
        }
    }
    if let Some(sections) = object.get("bookSections")
        && !(sections.is_array() || sections.is_null())
    {
        return Err(TocError::InvalidField {
            field: "bookSections".to_owned(),
            expected: "an array",
        });
    }

    let doc: NestedBookStructure = serde_json::from_value(value).map_err(TocError::Malformed)?;
    validate(&doc)?;
    Ok(doc)
}

/// Checks the reachable (active) part of the tree: non-empty title and ids, and
/// ids unique per kind so the lookup maps stay one-to-one.
pub fn validate(doc: &NestedBookStructure) -> Result<(), TocError> {
    if doc.title.trim().is_empty() {
        return Err(TocError::EmptyField("title".to_owned()));
    }

    let mut seen = SeenIds::default();
    for (idx, bs) in doc.book_sections.iter().enumerate() {
        if !bs.is_active {
            continue;
        }
        let field = format!("bookSections[{idx}].sectionId");
        seen.check(IdKind::BookSection, &bs.section_id, field)?;
    }

    for (st_idx, sthanam) in doc.sthanams.iter().enumerate() {
        if !sthanam.is_active {
            continue;
        }
        let st_path = format!("sthanams[{st_idx}]");
        seen.check(
            IdKind::Sthanam,
            &sthanam.sthanam_id,
            format!("{st_path}.sthanamId"),
        )?;

        for (ch_idx, chapter) in sthanam.chapters.iter().enumerate() {
            if !chapter.is_active {
                continue;
            }
            let ch_path = format!("{st_path}.chapters[{ch_idx}]");
            seen.check(
                IdKind::Chapter,
                &chapter.chapter_id,
                format!("{ch_path}.chapterId"),
            )?;

            for (sec_idx, section) in chapter.sections.iter().enumerate() {
                if !section.is_active {
                    continue;
                }
                let sec_path = format!("{ch_path}.sections[{sec_idx}]");
                seen.check(
                    IdKind::Section,
                    &section.section_id,
                    format!("{sec_path}.sectionId"),
                )?;

                for (page_idx, page) in section.pages.iter().enumerate() {
                    seen.check(
                        IdKind::Page,
                        &page.page_id,
                        format!("{sec_path}.pages[{page_idx}].pageId"),
                    )?;
                }
            }
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum IdKind {
    BookSection,
    Sthanam,
    Chapter,
    Section,
    Page,
}

impl IdKind {
    fn label(self) -> &'static str {
        match self {
            Self::BookSection => "book section id",
            Self::Sthanam => "sthanam id",
            Self::Chapter => "chapter id",
            Self::Section => "section id",
            Self::Page => "page id",
        }
    }
}

#[derive(Default)]
struct SeenIds {
    book_sections: HashSet<String>,
    sthanams: HashSet<String>,
    chapters: HashSet<String>,
    sections: HashSet<String>,
    pages: HashSet<String>,
}

impl SeenIds {
    fn check(&mut self, kind: IdKind, id: &str, field: String) -> Result<(), TocError> {
        if id.trim().is_empty() {
            return Err(TocError::EmptyField(field));
        }
        let set = match kind {
            IdKind::BookSection => &mut self.book_sections,
            IdKind::Sthanam => &mut self.sthanams,
            IdKind::Chapter => &mut self.chapters,
            IdKind::Section => &mut self.sections,
            IdKind::Page => &mut self.pages,
        };
        if !set.insert(id.to_owned()) {
            return Err(TocError::DuplicateId {
                kind: kind.label(),
                id: id.to_owned(),
                field,
            });
        }
        Ok(())
    }
}

/// Flattens the nested structure into the sequential page model.
///
/// Order: cover (1), table of contents (2), active book sections, then each
/// active sthanam depth-first. Inactive nodes are skipped together with their
/// subtree and reserve no page numbers.
pub fn flatten(doc: &NestedBookStructure, book_id: &str) -> Result<FlatModel, TocError> {
    validate(doc)?;

    let mut flattener = Flattener::new();

    let mut cover = FlatPageItem::structural(0, PageType::CoverPage, doc.title.clone());
    cover.display_title = "Cover".to_owned();
    cover.description = doc.description.clone();
    flattener.emit(cover);
    flattener.emit(FlatPageItem::structural(
        0,
        PageType::Toc,
        "Table of Contents",
    ));

    for bs in &doc.book_sections {
        if !bs.is_active {
            tracing::debug!(book_id, section_id = %bs.section_id, "skip inactive book section");
            continue;
        }
        flattener.visit_book_section(bs);
    }

    for sthanam in &doc.sthanams {
        if !sthanam.is_active {
            tracing::debug!(book_id, sthanam_id = %sthanam.sthanam_id, "skip inactive sthanam");
            continue;
        }
        flattener.visit_sthanam(sthanam);
    }

    let Flattener {
        pages,
        sections,
        chapters,
        sthanams,
        ..
    } = flattener;

    tracing::debug!(
        book_id,
        total_pages = pages.len(),
        sthanams = sthanams.len(),
        chapters = chapters.len(),
        sections = sections.len(),
        "flattened toc"
    );

    FlatModel::from_parts(FlatModelParts {
        book_id: book_id.to_owned(),
        book_metadata: BookMetadata {
            title: doc.title.clone(),
            author: doc.author.clone(),
            publisher: doc.publisher.clone(),
            image: doc.image.clone(),
            toc_type: doc.toc_type.clone(),
            description: doc.description.clone(),
        },
        server_updated_at: latest_updated_at(doc),
        pages,
        sections,
        chapters,
        sthanams,
    })
    .map_err(TocError::Digest)
}

/// Greatest `updatedAt` over every content page in the document, inactive
/// subtrees included, so an upstream edit anywhere marks the book stale.
/// ISO-8601 strings order lexically.
pub fn latest_updated_at(doc: &NestedBookStructure) -> Option<String> {
    doc.sthanams
        .iter()
        .flat_map(|sthanam| &sthanam.chapters)
        .flat_map(|chapter| &chapter.sections)
        .flat_map(|section| &section.pages)
        .filter_map(|page| page.updated_at.as_deref())
        .max()
        .map(str::to_owned)
}

pub fn section_header(section: &NestedSection) -> String {
    match section.header.as_deref().map(str::trim) {
        Some(header) if !header.is_empty() => header.to_owned(),
        _ => match section.section_number {
            Some(number) => format!("Section {number}"),
            None => "Section".to_owned(),
        },
    }
}

/// Traversal state for one `flatten` call. The page counter lives here and
/// nowhere else.
struct Flattener {
    next_page: u32,
    pages: Vec<FlatPageItem>,
    sections: Vec<SectionPageRange>,
    chapters: Vec<ChapterPageRange>,
    sthanams: Vec<SthanamPageRange>,
}

impl Flattener {
    fn new() -> Self {
        Self {
            next_page: 1,
            pages: Vec::new(),
            sections: Vec::new(),
            chapters: Vec::new(),
            sthanams: Vec::new(),
        }
    }

    fn emit(&mut self, mut item: FlatPageItem) -> u32 {
        item.page = self.next_page;
        self.next_page += 1;
        self.pages.push(item);
        self.next_page - 1
    }

    fn last_emitted(&self) -> u32 {
        self.next_page - 1
    }

    fn visit_book_section(&mut self, bs: &NestedBookSection) {
        let mut item = FlatPageItem::structural(0, PageType::BookSection, bs.header.clone());
        item.book_section_id = Some(bs.section_id.clone());
        item.section_number = bs.section_number;
        item.description = bs.description.clone();
        self.emit(item);
    }

    fn visit_sthanam(&mut self, sthanam: &NestedSthanam) {
        let mut item = FlatPageItem::structural(0, PageType::Sthanam, sthanam.header.clone());
        item.sthanam_id = Some(sthanam.sthanam_id.clone());
        item.sthanam_number = sthanam.sthanam_number;
        item.description = sthanam.description.clone();
        let intro_page = self.emit(item);

        let mut chapter_ids = Vec::new();
        for chapter in &sthanam.chapters {
            if !chapter.is_active {
                tracing::debug!(chapter_id = %chapter.chapter_id, "skip inactive chapter");
                continue;
            }
            chapter_ids.push(chapter.chapter_id.clone());
            self.visit_chapter(sthanam, chapter);
        }

        self.sthanams.push(SthanamPageRange {
            sthanam_id: sthanam.sthanam_id.clone(),
            intro_page,
            chapters: chapter_ids,
            page_range: PageSpan {
                start: intro_page,
                end: self.last_emitted(),
            },
            header: sthanam.header.clone(),
        });
    }

    fn visit_chapter(&mut self, sthanam: &NestedSthanam, chapter: &NestedChapter) {
        let mut item = FlatPageItem::structural(0, PageType::Chapter, chapter.header.clone());
        item.chapter_id = Some(chapter.chapter_id.clone());
        item.sthanam_id = Some(sthanam.sthanam_id.clone());
        item.sthanam_number = sthanam.sthanam_number;
        item.description = chapter.description.clone();
        item.is_first_in_chapter = true;
        let intro_page = self.emit(item);

        let mut section_ids = Vec::new();
        for section in &chapter.sections {
            if !section.is_active {
                tracing::debug!(section_id = %section.section_id, "skip inactive section");
                continue;
            }
            section_ids.push(section.section_id.clone());
            self.visit_section(sthanam, chapter, section);
        }

        self.chapters.push(ChapterPageRange {
            chapter_id: chapter.chapter_id.clone(),
            sthanam_id: sthanam.sthanam_id.clone(),
            intro_page,
            sections: section_ids,
            page_range: PageSpan {
                start: intro_page,
                end: self.last_emitted(),
            },
            header: chapter.header.clone(),
        });
    }

    fn visit_section(
        &mut self,
        sthanam: &NestedSthanam,
        chapter: &NestedChapter,
        section: &NestedSection,
    ) {
        let header = section_header(section);

        let mut intro = FlatPageItem::structural(0, PageType::Section, header.clone());
        intro.section_id = Some(section.section_id.clone());
        intro.section_number = section.section_number;
        intro.chapter_id = Some(chapter.chapter_id.clone());
        intro.sthanam_id = Some(sthanam.sthanam_id.clone());
        intro.sthanam_number = sthanam.sthanam_number;
        intro.description = section.description.clone();
        intro.is_first_in_section = true;
        let intro_page = self.emit(intro);

        let first_content_page = self.next_page;
        let total = section.pages.len() as u32;
        let mut page_ids = Vec::with_capacity(section.pages.len());

        // API order is reading order; `pageOrder` is kept as metadata only.
        for (idx, content) in section.pages.iter().enumerate() {
            let idx = idx as u32;
            let mut item = FlatPageItem::structural(0, PageType::Section, header.clone());
            item.display_title = format!("{header} - Page {} of {total}", idx + 1);
            item.page_id = Some(content.page_id.clone());
            item.element_id = content.element_id.clone();
            item.section_id = Some(section.section_id.clone());
            item.section_number = section.section_number;
            item.chapter_id = Some(chapter.chapter_id.clone());
            item.sthanam_id = Some(sthanam.sthanam_id.clone());
            item.sthanam_number = sthanam.sthanam_number;
            item.original_page_number = content.page_number;
            item.page_order = content.page_order;
            item.available_translations = content.available_translations.clone();
            item.updated_at = content.updated_at.clone();
            item.section_page_index = Some(idx);
            item.section_total_pages = Some(total);
            item.is_first_in_section = idx == 0;
            item.is_last_in_section = idx + 1 == total;
            self.emit(item);

            page_ids.push(content.page_id.clone());
        }

        let last_content_page = self.last_emitted();
        self.sections.push(SectionPageRange {
            section_id: section.section_id.clone(),
            chapter_id: chapter.chapter_id.clone(),
            sthanam_id: sthanam.sthanam_id.clone(),
            intro_page,
            first_content_page,
            last_content_page,
            total_pages: last_content_page - intro_page + 1,
            page_ids,
            header,
        });
    }
}
