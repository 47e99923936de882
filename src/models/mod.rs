//! Model lifecycle, capabilities and the embedding request path

pub mod config;
pub mod device;
pub mod inference;
pub mod manager;
pub mod model;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use config::ModelConfig;
pub use device::{select_device, select_quantization, Device, LoadPlan, QuantizationPolicy};
pub use inference::{create_embeddings, MAX_INPUT_TOKENS};
pub use manager::{LifecyclePhase, ModelLifecycle, ModelLoader, ModelState};
pub use model::{EmbeddingModel, ModelInfo, TokenCounter};

/// Embedding vector type
pub type Embedding = Vec<f32>;

/// Result type for embedding models operations
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Errors that can occur in embedding models operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Initialization failed during {stage}: {error}")]
    InitializationFailed { stage: String, error: String },

    #[error("Model not loaded")]
    ModelNotReady,

    #[error("Model load failed: {error}")]
    ModelLoadFailed { error: String },

    #[error("Inference failed: {error}")]
    InferenceFailed { error: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("IO error: {error}")]
    IoError { error: std::io::Error },

    #[error("TOML parsing error: {error}")]
    TomlError { error: toml::de::Error },
}

impl EmbeddingError {
    /// Wrap any startup error with the lifecycle stage it happened in
    pub fn initialization(stage: &str, error: impl std::fmt::Display) -> Self {
        EmbeddingError::InitializationFailed {
            stage: stage.to_string(),
            error: error.to_string(),
        }
    }

    pub fn inference(error: impl std::fmt::Display) -> Self {
        EmbeddingError::InferenceFailed {
            error: error.to_string(),
        }
    }
}

impl From<std::io::Error> for EmbeddingError {
    fn from(error: std::io::Error) -> Self {
        EmbeddingError::IoError { error }
    }
}

impl From<toml::de::Error> for EmbeddingError {
    fn from(error: toml::de::Error) -> Self {
        EmbeddingError::TomlError { error }
    }
}

impl From<ort::Error> for EmbeddingError {
    fn from(error: ort::Error) -> Self {
        EmbeddingError::ModelLoadFailed { error: error.to_string() }
    }
}
