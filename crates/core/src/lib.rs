pub mod aliases;
pub mod chunking;
pub mod error;
pub mod ingest;
pub mod models;
pub mod pages;
pub mod providers;
pub mod query;
pub mod search;
pub mod stores;
pub mod token;
pub mod traits;

pub use aliases::ArchiveAliases;
pub use chunking::{classify_document, split_at_boundaries, split_by_tokens, Chunker, Passage};
pub use error::{IngestError, SearchError};
pub use ingest::{
    build_context_header, flatten_chunk, index_documents, IndexReport, SkippedItem,
    EMBED_BATCH_SIZE,
};
pub use models::{
    Chapter, Chunk, ChunkMetadata, ChunkPayload, ChunkingOptions, DocClass, DocumentContent,
    FilterValue, ItemMetadata, SearchFilters, SearchRequest, SearchResult, SourceDocument,
    DEFAULT_TOP_K,
};
pub use pages::{build_page_map, PageIndex, PAGE_MARKER};
pub use providers::{HttpReranker, OllamaEmbeddings, OpenAiEmbeddings};
pub use query::{parse_shorthand, FilterKey};
pub use search::SearchPipeline;
pub use stores::PineconeStore;
pub use token::{Cl100kTokenizer, Tokenizer};
pub use traits::{
    EmbeddingProvider, NativeFilter, RerankEntry, Reranker, ScoredPoint, UpsertPoint, VectorStore,
};
