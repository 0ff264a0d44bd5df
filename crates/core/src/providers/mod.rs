pub mod ollama;
pub mod openai;
pub mod rerank;

pub use ollama::OllamaEmbeddings;
pub use openai::OpenAiEmbeddings;
pub use rerank::HttpReranker;

pub(crate) const EMBED_INPUT_CHAR_LIMIT: usize = 30_000;

pub(crate) fn sanitize_embed_input(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return "[empty]".to_string();
    }
    trimmed.chars().take(EMBED_INPUT_CHAR_LIMIT).collect()
}
