use crate::models::ChunkPayload;
use crate::SearchError;
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq)]
pub struct UpsertPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: ChunkPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NativeFilter {
    pub item_type: Option<String>,
}

impl NativeFilter {
    pub fn is_empty(&self) -> bool {
        self.item_type.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RerankEntry {
    pub index: usize,
    pub score: f32,
}

#[async_trait]
pub trait EmbeddingProvider {
    fn dimension(&self) -> usize;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, SearchError>;
}

#[async_trait]
pub trait VectorStore {
    async fn upsert(&self, points: &[UpsertPoint]) -> Result<(), SearchError>;

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&NativeFilter>,
    ) -> Result<Vec<ScoredPoint>, SearchError>;

    async fn delete_by_item(&self, item_key: &str) -> Result<(), SearchError>;
}

#[async_trait]
pub trait Reranker {
    async fn rerank(&self, query: &str, texts: &[String]) -> Result<Vec<RerankEntry>, SearchError>;
}
