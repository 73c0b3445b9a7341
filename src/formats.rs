use serde::{Deserialize, Deserializer, Serialize};

use crate::flat::PageType;

fn default_active() -> bool {
    true
}

/// Child lists may be sent as `null`; that reads as an empty list.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Book structure as returned by `GET /books/{bookId}/generate-pages`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NestedBookStructure {
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub toc_type: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub book_sections: Vec<NestedBookSection>,
    pub sthanams: Vec<NestedSthanam>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NestedBookSection {
    pub section_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_number: Option<u32>,
    #[serde(default)]
    pub header: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NestedSthanam {
    pub sthanam_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sthanam_number: Option<u32>,
    #[serde(default)]
    pub header: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub chapters: Vec<NestedChapter>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NestedChapter {
    pub chapter_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_number: Option<u32>,
    #[serde(default)]
    pub header: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub sections: Vec<NestedSection>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NestedSection {
    pub section_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub pages: Vec<ContentPage>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

/// A content page entry inside a section. Body URLs and inline bodies sent by
/// the API are ignored here; bodies are fetched per page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContentPage {
    pub page_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_order: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub available_translations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Body of `POST /books/{bookId}/page`, wrapped as `{"params": ...}` on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    pub page: u32,
    pub page_type: PageType,
    pub input: PageRequestInput,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageRequestInput {
    pub bookid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sthanam_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sthanam_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
}

/// Block-structured page body. Passed through to the formatter unmodified,
/// so unknown fields are kept alongside the known ones.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub blocks: Vec<ContentBlock>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Header,
    Paragraph,
    List,
    Quote,
    Image,
    Code,
    Table,
    Delimiter,
    Embed,
    Raw,
    Warning,
    Other,
}

impl ContentBlock {
    pub fn block_kind(&self) -> BlockKind {
        match self.kind.as_str() {
            "header" => BlockKind::Header,
            "paragraph" => BlockKind::Paragraph,
            "list" => BlockKind::List,
            "quote" => BlockKind::Quote,
            "image" => BlockKind::Image,
            "code" => BlockKind::Code,
            "table" => BlockKind::Table,
            "delimiter" => BlockKind::Delimiter,
            "embed" => BlockKind::Embed,
            "raw" => BlockKind::Raw,
            "warning" => BlockKind::Warning,
            _ => BlockKind::Other,
        }
    }
}
