use serde::{Deserialize, Serialize};

pub const DEFAULT_TOP_K: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ItemMetadata {
    pub item_key: String,
    pub title: String,
    pub authors: Vec<String>,
    pub item_type: String,
    pub date: String,
    pub archive: String,
    pub archive_location: String,
    pub tags: Vec<String>,
    pub collections: Vec<String>,
    pub archive_collection: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ChunkMetadata {
    pub item: ItemMetadata,
    pub page_start: Option<u32>,
    pub page_end: Option<u32>,
    pub pdf_page: Option<u32>,
    pub page_count: Option<u32>,
    pub chapter: Option<String>,
    pub source_type: Option<String>,
}

impl ChunkMetadata {
    pub fn for_item(item: &ItemMetadata) -> Self {
        Self {
            item: item.clone(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chapter {
    pub title: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DocumentContent {
    Text(String),
    Chapters(Vec<Chapter>),
    Note { text: String, source_type: String },
    Empty,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceDocument {
    pub metadata: ItemMetadata,
    pub content: DocumentContent,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DocClass {
    Short,
    Medium,
    Long,
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkingOptions {
    pub chunk_size_tokens: usize,
    pub overlap_tokens: usize,
    pub short_doc_threshold_tokens: usize,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            chunk_size_tokens: 600,
            overlap_tokens: 150,
            short_doc_threshold_tokens: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilterValue {
    pub text: String,
    pub exact: bool,
}

impl FilterValue {
    pub fn fuzzy(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            exact: false,
        }
    }

    pub fn exact(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            exact: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SearchFilters {
    pub item_type: Option<FilterValue>,
    pub author: Option<FilterValue>,
    pub tag: Option<FilterValue>,
    pub collection: Option<FilterValue>,
    pub archive: Option<FilterValue>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

impl SearchFilters {
    pub fn has_client_side(&self) -> bool {
        self.author.is_some()
            || self.tag.is_some()
            || self.collection.is_some()
            || self.archive.is_some()
            || self.date_from.is_some()
            || self.date_to.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchRequest {
    pub text: String,
    pub top_k: usize,
    pub filters: SearchFilters,
}

impl SearchRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            top_k: DEFAULT_TOP_K,
            filters: SearchFilters::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ChunkPayload {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub item_key: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
    pub authors: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub item_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub date: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub archive: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub archive_location: String,
    pub tags: Vec<String>,
    pub collections: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub archive_collection: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub source_type: String,
    pub page_start: u32,
    pub page_end: u32,
    pub page_count: u32,
    pub pdf_page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub id: String,
    pub score: f32,
    pub metadata: ChunkPayload,
    pub rerank_score: Option<f32>,
}
