use crate::error::SearchError;
use crate::traits::EmbeddingProvider;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use super::sanitize_embed_input;

pub const OPENAI_EMBED_BATCH_SIZE: usize = 2_048;

pub struct OpenAiEmbeddings {
    endpoint: String,
    api_key: String,
    model: String,
    dimension: usize,
    client: Client,
}

impl OpenAiEmbeddings {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            dimension,
            client: Client::new(),
        }
    }

    async fn request_embeddings(&self, input: Value) -> Result<Vec<Vec<f32>>, SearchError> {
        let response = self
            .client
            .post(format!("{}/v1/embeddings", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "input": input }))
            .send()
            .await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(SearchError::RateLimited("openai".to_string()));
        }
        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "openai".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: EmbeddingResponse = response.json().await?;
        Ok(collect_embeddings(parsed))
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    embedding: Vec<f32>,
}

fn collect_embeddings(mut response: EmbeddingResponse) -> Vec<Vec<f32>> {
    response.data.sort_by_key(|row| row.index);
    response.data.into_iter().map(|row| row.embedding).collect()
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let sanitized: Vec<String> = texts
            .iter()
            .map(|text| sanitize_embed_input(text))
            .collect();

        let mut embeddings = Vec::with_capacity(sanitized.len());
        for batch in sanitized.chunks(OPENAI_EMBED_BATCH_SIZE) {
            let returned = self.request_embeddings(json!(batch)).await?;
            if returned.len() != batch.len() {
                return Err(SearchError::BackendResponse {
                    backend: "openai".to_string(),
                    details: format!(
                        "expected {} embeddings, got {}",
                        batch.len(),
                        returned.len()
                    ),
                });
            }
            embeddings.extend(returned);
        }
        Ok(embeddings)
    }

    // Batch inputs are sanitized; queries are posted as-is.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        let mut embeddings = self.request_embeddings(json!(text)).await?;
        if embeddings.is_empty() {
            return Err(SearchError::BackendResponse {
                backend: "openai".to_string(),
                details: "no embedding returned".to_string(),
            });
        }
        Ok(embeddings.remove(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_reordered_by_index() {
        let canned = r#"{
            "data": [
                {"index": 1, "embedding": [0.4, 0.5]},
                {"index": 0, "embedding": [0.1, 0.2]}
            ]
        }"#;
        let parsed: EmbeddingResponse = serde_json::from_str(canned).unwrap();
        let embeddings = collect_embeddings(parsed);
        assert_eq!(embeddings, vec![vec![0.1, 0.2], vec![0.4, 0.5]]);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let parsed: EmbeddingResponse = serde_json::from_str(r#"{"data": [{}]}"#).unwrap();
        let embeddings = collect_embeddings(parsed);
        assert_eq!(embeddings, vec![Vec::<f32>::new()]);

        let parsed: EmbeddingResponse = serde_json::from_str("{}").unwrap();
        assert!(collect_embeddings(parsed).is_empty());
    }

    #[tokio::test]
    async fn empty_batches_skip_the_request() {
        let provider = OpenAiEmbeddings::new("http://localhost:1", "key", "test-model", 2);
        let embeddings = provider.embed_batch(&[]).await.unwrap();
        assert!(embeddings.is_empty());
    }
}
