use crate::error::SearchError;
use crate::models::ChunkPayload;
use crate::traits::{NativeFilter, ScoredPoint, UpsertPoint, VectorStore};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

pub const UPSERT_BATCH_SIZE: usize = 100;

#[derive(Debug)]
pub struct PineconeStore {
    endpoint: String,
    api_key: String,
    dimension: usize,
    client: Client,
}

impl PineconeStore {
    pub fn new(
        endpoint: &str,
        api_key: impl Into<String>,
        dimension: usize,
    ) -> Result<Self, SearchError> {
        Url::parse(endpoint)?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            dimension,
            client: Client::new(),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), SearchError> {
        if vector.len() != self.dimension {
            return Err(SearchError::Request(format!(
                "vector dimension {} does not match index dimension {}",
                vector.len(),
                self.dimension
            )));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Value,
}

fn scored_points(response: QueryResponse) -> Vec<ScoredPoint> {
    response
        .matches
        .into_iter()
        .map(|matched| ScoredPoint {
            id: matched.id,
            score: matched.score,
            payload: serde_json::from_value::<ChunkPayload>(matched.metadata).unwrap_or_default(),
        })
        .collect()
}

#[async_trait]
impl VectorStore for PineconeStore {
    async fn upsert(&self, points: &[UpsertPoint]) -> Result<(), SearchError> {
        for batch in points.chunks(UPSERT_BATCH_SIZE) {
            let vectors = batch
                .iter()
                .map(|point| {
                    self.check_dimension(&point.vector)?;
                    Ok(json!({
                        "id": point.id,
                        "values": point.vector,
                        "metadata": serde_json::to_value(&point.payload)?,
                    }))
                })
                .collect::<Result<Vec<_>, SearchError>>()?;

            let response = self
                .client
                .post(format!("{}/vectors/upsert", self.endpoint))
                .header("Api-Key", &self.api_key)
                .json(&json!({ "vectors": vectors }))
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(SearchError::BackendResponse {
                    backend: "pinecone".to_string(),
                    details: response.status().to_string(),
                });
            }
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&NativeFilter>,
    ) -> Result<Vec<ScoredPoint>, SearchError> {
        self.check_dimension(vector)?;

        let mut body = json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
        });
        if let Some(item_type) = filter.and_then(|f| f.item_type.as_deref()) {
            body["filter"] = json!({ "item_type": { "$eq": item_type } });
        }

        let response = self
            .client
            .post(format!("{}/query", self.endpoint))
            .header("Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "pinecone".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: QueryResponse = response.json().await?;
        Ok(scored_points(parsed))
    }

    async fn delete_by_item(&self, item_key: &str) -> Result<(), SearchError> {
        let response = self
            .client
            .post(format!("{}/vectors/delete", self.endpoint))
            .header("Api-Key", &self.api_key)
            .json(&json!({ "filter": { "item_key": { "$eq": item_key } } }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "pinecone".to_string(),
                details: response.status().to_string(),
            });
        }
        Ok(())
    }
}
