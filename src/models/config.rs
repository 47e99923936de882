//! Configuration for the embedding model
//!
//! Lives under the `[model]` table of the server configuration file. Every
//! field has a default, so an empty table (or no file at all) serves the
//! kanana-nano embedding model from the HuggingFace Hub.

use serde::{Deserialize, Serialize};

/// Configuration for the served model
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelConfig {
    /// HuggingFace Hub repository the weights and tokenizer are fetched from
    pub model_id: String,
    pub revision: String,
    /// Label echoed back when a request carries no `model`
    pub served_model_name: String,

    /// Load from this local directory instead of the Hub
    pub model_dir: Option<String>,
    /// Override for the hf-hub cache location
    pub cache_dir: Option<String>,

    /// File paths (relative to the repository / model_dir)
    pub model_file: String,
    pub quantized_model_file: String,
    pub tokenizer_file: String,

    /// ONNX Runtime intra-op threads on CPU
    pub intra_threads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_id: "kakaocorp/kanana-nano-2.1b-embedding".to_string(),
            revision: "main".to_string(),
            served_model_name: "kanana-nano-2.1b-embedding".to_string(),
            model_dir: None,
            cache_dir: None,
            model_file: "onnx/model.onnx".to_string(),
            quantized_model_file: "onnx/model_quantized.onnx".to_string(),
            tokenizer_file: "tokenizer.json".to_string(),
            intra_threads: 4,
        }
    }
}

impl ModelConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::models::EmbeddingError> {
        if self.model_id.trim().is_empty() && self.model_dir.is_none() {
            return Err(crate::models::EmbeddingError::ConfigError {
                message: "Either model.model_id or model.model_dir must be set".to_string(),
            });
        }

        if self.intra_threads == 0 {
            return Err(crate::models::EmbeddingError::ConfigError {
                message: "model.intra_threads must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}
