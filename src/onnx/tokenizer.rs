//! Tokenizer handle used for usage accounting

use std::path::Path;
use tokenizers::Tokenizer;

use crate::models::model::TokenCounter;
use crate::models::{EmbeddingError, EmbeddingResult};

/// HuggingFace tokenizer counting tokens before any truncation
pub struct HfTokenCounter {
    tokenizer: Tokenizer,
}

impl HfTokenCounter {
    pub fn from_file(path: &Path) -> EmbeddingResult<Self> {
        Ok(Self {
            tokenizer: crate::onnx::onnx_engine::load_tokenizer(path)?,
        })
    }
}

impl TokenCounter for HfTokenCounter {
    fn count_tokens(&self, text: &str) -> EmbeddingResult<usize> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| EmbeddingError::inference(format!("Tokenization failed: {}", e)))?;
        Ok(encoding.len())
    }
}
