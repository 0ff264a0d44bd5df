use crate::chunking::Chunker;
use crate::error::{IngestError, SearchError};
use crate::models::{
    Chunk, ChunkMetadata, ChunkPayload, DocumentContent, ItemMetadata, SourceDocument,
};
use crate::token::Tokenizer;
use crate::traits::{EmbeddingProvider, UpsertPoint, VectorStore};
use std::time::Duration;
use tracing::{info, warn};

pub const EMBED_BATCH_SIZE: usize = 50;
const PAYLOAD_TEXT_LIMIT: usize = 2_000;
const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(60);
const DEFAULT_SOURCE_TYPE: &str = "document";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedItem {
    pub item_key: String,
    pub title: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct IndexReport {
    pub items_indexed: usize,
    pub items_skipped: Vec<SkippedItem>,
    pub chunks_upserted: usize,
}

pub fn build_context_header(metadata: &ItemMetadata) -> String {
    let mut lines = Vec::new();
    if !metadata.title.is_empty() {
        lines.push(format!("Title: {}", metadata.title));
    }
    if !metadata.authors.is_empty() {
        lines.push(format!("Authors: {}", metadata.authors.join(", ")));
    }
    if !metadata.date.is_empty() {
        lines.push(format!("Date: {}", metadata.date));
    }
    if !metadata.item_type.is_empty() {
        lines.push(format!("Type: {}", metadata.item_type));
    }
    if !metadata.archive.is_empty() {
        lines.push(format!("Archive: {}", metadata.archive));
    }
    if !metadata.archive_location.is_empty() {
        lines.push(format!("Location: {}", metadata.archive_location));
    }
    if lines.is_empty() {
        return String::new();
    }
    format!("{}\n---\n", lines.join("\n"))
}

pub fn flatten_chunk(chunk: &Chunk) -> ChunkPayload {
    let item = &chunk.metadata.item;
    ChunkPayload {
        text: chunk.text.chars().take(PAYLOAD_TEXT_LIMIT).collect(),
        item_key: item.item_key.clone(),
        title: item.title.clone(),
        authors: item.authors.clone(),
        item_type: item.item_type.clone(),
        date: item.date.clone(),
        archive: item.archive.clone(),
        archive_location: item.archive_location.clone(),
        tags: item.tags.clone(),
        collections: item.collections.clone(),
        archive_collection: item.archive_collection.clone(),
        chunk_index: chunk.chunk_index,
        total_chunks: chunk.total_chunks,
        source_type: chunk
            .metadata
            .source_type
            .clone()
            .unwrap_or_else(|| DEFAULT_SOURCE_TYPE.to_string()),
        page_start: chunk.metadata.page_start.unwrap_or(0),
        page_end: chunk.metadata.page_end.unwrap_or(0),
        page_count: chunk.metadata.page_count.unwrap_or(0),
        pdf_page: chunk.metadata.pdf_page.unwrap_or(0),
        chapter: chunk.metadata.chapter.clone(),
    }
}

fn metadata_summary(metadata: &ItemMetadata) -> String {
    let mut summary = format!(
        "{}. {}. {}.",
        metadata.title,
        metadata.authors.join(", "),
        metadata.date
    );
    if !metadata.archive.is_empty() {
        summary.push_str(&format!(" {}.", metadata.archive));
    }
    if !metadata.tags.is_empty() {
        summary.push_str(&format!(" Tags: {}.", metadata.tags.join(", ")));
    }
    summary
}

fn chunk_content<T: Tokenizer>(
    chunker: &Chunker<T>,
    metadata: &ItemMetadata,
    content: &DocumentContent,
) -> Result<Vec<Chunk>, IngestError> {
    match content {
        DocumentContent::Text(text) => {
            chunker.chunk_document(text, &metadata.item_type, metadata)
        }
        DocumentContent::Chapters(chapters) => chunker.chunk_chapters(chapters, metadata),
        DocumentContent::Note { text, source_type } => {
            chunker.chunk_note(text, metadata, source_type)
        }
        DocumentContent::Empty => {
            if metadata.abstract_text.trim().is_empty() {
                Ok(vec![Chunk {
                    text: metadata_summary(metadata),
                    chunk_index: 0,
                    total_chunks: 1,
                    metadata: ChunkMetadata::for_item(metadata),
                }])
            } else {
                chunker.chunk_document(&metadata.abstract_text, &metadata.item_type, metadata)
            }
        }
    }
}

async fn embed_with_retry<E>(embedder: &E, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError>
where
    E: EmbeddingProvider + Send + Sync,
{
    match embedder.embed_batch(texts).await {
        Err(SearchError::RateLimited(backend)) => {
            warn!(backend = %backend, "rate limited, waiting before retry");
            tokio::time::sleep(RATE_LIMIT_BACKOFF).await;
            embedder.embed_batch(texts).await
        }
        other => other,
    }
}

pub async fn index_documents<T, E, V>(
    chunker: &Chunker<T>,
    embedder: &E,
    store: &V,
    documents: &[SourceDocument],
) -> Result<IndexReport, SearchError>
where
    T: Tokenizer + Send + Sync,
    E: EmbeddingProvider + Send + Sync,
    V: VectorStore + Send + Sync,
{
    let mut report = IndexReport::default();
    let mut all_chunks: Vec<Chunk> = Vec::new();

    for document in documents {
        let mut metadata = document.metadata.clone();
        if metadata.title.trim().is_empty() {
            metadata.title = format!("[Untitled {}, {}]", metadata.item_type, metadata.date);
        }

        match chunk_content(chunker, &metadata, &document.content) {
            Ok(chunks) if chunks.is_empty() => {
                report.items_skipped.push(SkippedItem {
                    item_key: metadata.item_key.clone(),
                    title: metadata.title.clone(),
                    reason: "no extractable content".to_string(),
                });
            }
            Ok(chunks) => {
                all_chunks.extend(chunks);
                report.items_indexed += 1;
            }
            Err(error) => {
                warn!(item_key = %metadata.item_key, %error, "skipping item");
                report.items_skipped.push(SkippedItem {
                    item_key: metadata.item_key.clone(),
                    title: metadata.title.clone(),
                    reason: error.to_string(),
                });
            }
        }
    }

    info!(
        items = report.items_indexed,
        skipped = report.items_skipped.len(),
        chunks = all_chunks.len(),
        "embedding chunks"
    );

    for batch in all_chunks.chunks(EMBED_BATCH_SIZE) {
        let texts: Vec<String> = batch
            .iter()
            .map(|chunk| format!("{}{}", build_context_header(&chunk.metadata.item), chunk.text))
            .collect();
        let vectors = embed_with_retry(embedder, &texts).await?;
        let points: Vec<UpsertPoint> = batch
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| UpsertPoint {
                id: format!("{}_c{}", chunk.metadata.item.item_key, chunk.chunk_index),
                vector,
                payload: flatten_chunk(chunk),
            })
            .collect();
        store.upsert(&points).await?;
        report.chunks_upserted += points.len();
    }

    info!(
        indexed = report.items_indexed,
        skipped = report.items_skipped.len(),
        upserted = report.chunks_upserted,
        "indexing finished"
    );
    Ok(report)
}
