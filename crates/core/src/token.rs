use crate::error::IngestError;
use tiktoken_rs::CoreBPE;

pub trait Tokenizer {
    fn count(&self, text: &str) -> usize;

    fn encode(&self, text: &str) -> Vec<u32>;

    fn decode(&self, tokens: &[u32]) -> String;
}

pub struct Cl100kTokenizer {
    bpe: CoreBPE,
}

impl Cl100kTokenizer {
    pub fn new() -> Result<Self, IngestError> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|error| IngestError::Tokenizer(error.to_string()))?;
        Ok(Self { bpe })
    }
}

impl Tokenizer for Cl100kTokenizer {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    fn encode(&self, text: &str) -> Vec<u32> {
        self.bpe.encode_ordinary(text)
    }

    fn decode(&self, tokens: &[u32]) -> String {
        match self.bpe.decode(tokens.to_vec()) {
            Ok(text) => text,
            // A window boundary can land inside a multi-byte scalar.
            Err(_) => tokens
                .iter()
                .map(|&token| {
                    self.bpe
                        .decode(vec![token])
                        .unwrap_or_else(|_| "\u{FFFD}".to_string())
                })
                .collect(),
        }
    }
}

#[cfg(test)]
pub(crate) struct CharTokenizer;

#[cfg(test)]
impl Tokenizer for CharTokenizer {
    fn count(&self, text: &str) -> usize {
        text.chars().count()
    }

    fn encode(&self, text: &str) -> Vec<u32> {
        text.chars().map(|ch| ch as u32).collect()
    }

    fn decode(&self, tokens: &[u32]) -> String {
        tokens.iter().filter_map(|&id| char::from_u32(id)).collect()
    }
}
