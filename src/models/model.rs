//! Model definitions and traits
//!
//! The embedding model and the tokenizer are treated as two opaque
//! capabilities. Both are synchronous: callers run them on a blocking
//! thread, never on the async I/O path.

use serde::Serialize;

use crate::models::device::{Device, QuantizationPolicy};
use crate::models::{Embedding, EmbeddingResult};

/// Information about a loaded model
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    /// Hub identifier or local directory the weights came from
    pub name: String,
    /// Graph file that was loaded
    pub model_path: String,
    pub device: Device,
    pub quantization: QuantizationPolicy,
    /// Embedding dimension, if the graph declares a static one
    pub dimension: Option<usize>,
}

/// Core embedding model capability
pub trait EmbeddingModel: Send + Sync {
    /// Get model information
    fn info(&self) -> &ModelInfo;

    /// Embed every text, steering with `instruction`, truncating each input
    /// to `max_length` tokens. Returns one vector per text, in input order.
    fn encode(
        &self,
        texts: &[String],
        instruction: &str,
        max_length: usize,
    ) -> EmbeddingResult<Vec<Embedding>>;

    /// Whether the model can switch to a memory-efficient execution mode
    fn supports_memory_efficient_attention(&self) -> bool {
        false
    }

    /// Switch to the memory-efficient execution mode
    fn enable_memory_efficient_attention(&mut self) -> EmbeddingResult<()> {
        Ok(())
    }

    /// Put the model into inference (non-training) mode
    fn set_inference_mode(&mut self) {}
}

/// Tokenizer capability used for usage accounting
pub trait TokenCounter: Send + Sync {
    /// Number of tokens in `text`, special tokens included, before truncation
    fn count_tokens(&self, text: &str) -> EmbeddingResult<usize>;
}
