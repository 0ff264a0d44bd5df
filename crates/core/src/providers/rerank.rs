use crate::error::SearchError;
use crate::traits::{RerankEntry, Reranker};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

pub struct HttpReranker {
    endpoint: String,
    client: Client,
}

impl HttpReranker {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct RerankRow {
    index: usize,
    #[serde(default)]
    score: f32,
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(&self, query: &str, texts: &[String]) -> Result<Vec<RerankEntry>, SearchError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(format!("{}/rerank", self.endpoint))
            .json(&json!({ "query": query, "texts": texts }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "reranker".to_string(),
                details: response.status().to_string(),
            });
        }

        let rows: Vec<RerankRow> = response.json().await?;
        Ok(rows
            .into_iter()
            .map(|row| RerankEntry {
                index: row.index,
                score: row.score,
            })
            .collect())
    }
}
