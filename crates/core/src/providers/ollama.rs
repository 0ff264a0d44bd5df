use crate::error::SearchError;
use crate::traits::EmbeddingProvider;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::sanitize_embed_input;

pub struct OllamaEmbeddings {
    endpoint: String,
    model: String,
    dimension: usize,
    client: Client,
}

impl OllamaEmbeddings {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            dimension,
            client: Client::new(),
        }
    }

    /// Probes the server with a throwaway prompt to detect the model's
    /// embedding dimension.
    pub async fn connect(
        endpoint: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, SearchError> {
        let mut provider = Self::new(endpoint, model, 0);
        let probe = provider.request_embedding("test").await?;
        provider.dimension = probe.len();
        Ok(provider)
    }

    async fn request_embedding(&self, prompt: &str) -> Result<Vec<f32>, SearchError> {
        let response = self
            .client
            .post(format!("{}/api/embeddings", self.endpoint))
            .json(&json!({ "model": self.model, "prompt": prompt }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "ollama".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: OllamaEmbedding = response.json().await?;
        if parsed.embedding.is_empty() {
            return Err(SearchError::BackendResponse {
                backend: "ollama".to_string(),
                details: "no embedding returned".to_string(),
            });
        }
        Ok(parsed.embedding)
    }
}

#[derive(Deserialize)]
struct OllamaEmbedding {
    #[serde(default)]
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddings {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            let embedding = self.request_embedding(&sanitize_embed_input(text)).await?;
            embeddings.push(embedding);
        }
        Ok(embeddings)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        self.request_embedding(&sanitize_embed_input(text)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_parses_from_the_response_body() {
        let parsed: OllamaEmbedding =
            serde_json::from_str(r#"{"embedding": [0.25, -0.5, 1.0]}"#).unwrap();
        assert_eq!(parsed.embedding, vec![0.25, -0.5, 1.0]);
    }

    #[test]
    fn missing_embedding_defaults_to_empty() {
        let parsed: OllamaEmbedding = serde_json::from_str("{}").unwrap();
        assert!(parsed.embedding.is_empty());
    }
}
