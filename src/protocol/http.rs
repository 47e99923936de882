//! HTTP REST API Protocol
//!
//! OpenAI-compatible embeddings API:
//! - Endpoint: POST /v1/embeddings (alias POST /embeddings)
//! - Request body: {"input": "..." | ["...", ...], "model": "...", "instruction": "..."}
//! - Response body: {"object": "list", "data": [{"object": "embedding", "embedding": [...], "index": 0}],
//!   "model": "...", "usage": {"prompt_tokens": N, "total_tokens": N}}

use serde::{Deserialize, Serialize};

/// Either a single string or an ordered list of strings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingInput {
    Single(String),
    Batch(Vec<String>),
}

impl EmbeddingInput {
    /// Normalize to an ordered list
    pub fn into_texts(self) -> Vec<String> {
        match self {
            EmbeddingInput::Single(text) => vec![text],
            EmbeddingInput::Batch(texts) => texts,
        }
    }
}

/// HTTP Embedding Request - OpenAI Format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    /// Text(s) to embed
    pub input: EmbeddingInput,

    /// Opaque label echoed back in the response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Steers the embedding semantics (e.g. query vs. document)
    #[serde(default)]
    pub instruction: String,
}

/// One embedding entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingData {
    pub object: String,
    pub embedding: Vec<f32>,
    pub index: usize,
}

impl EmbeddingData {
    pub fn new(index: usize, embedding: Vec<f32>) -> Self {
        Self {
            object: "embedding".to_string(),
            embedding,
            index,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub total_tokens: usize,
}

impl Usage {
    /// Embeddings have no completion tokens, so both counters agree
    pub fn from_prompt_tokens(tokens: usize) -> Self {
        Self {
            prompt_tokens: tokens,
            total_tokens: tokens,
        }
    }
}

/// HTTP Embedding Response - OpenAI Format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    pub object: String,
    pub data: Vec<EmbeddingData>,
    pub model: String,
    pub usage: Usage,
}

impl EmbeddingResponse {
    /// Build the list envelope, tagging each vector with its input position
    pub fn new(model: impl Into<String>, embeddings: Vec<Vec<f32>>, prompt_tokens: usize) -> Self {
        Self {
            object: "list".to_string(),
            data: embeddings
                .into_iter()
                .enumerate()
                .map(|(index, embedding)| EmbeddingData::new(index, embedding))
                .collect(),
            model: model.into(),
            usage: Usage::from_prompt_tokens(prompt_tokens),
        }
    }
}

/// HTTP Error Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpErrorResponse {
    /// Error message
    pub error: String,

    /// Error code (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Additional details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl HttpErrorResponse {
    /// Create a new error response
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
            details: None,
        }
    }

    /// Create error with code
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Create error with details
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Body could not be parsed into an [`EmbeddingRequest`]
    pub fn invalid_request(details: impl Into<String>) -> Self {
        Self::new("Invalid request body")
            .with_code("INVALID_REQUEST")
            .with_details(details)
    }

    /// Create model not ready error
    pub fn model_not_ready() -> Self {
        Self::new("Model not loaded").with_code("MODEL_NOT_READY")
    }

    /// The model or tokenizer failed for this request
    pub fn inference_failed(message: impl Into<String>) -> Self {
        Self::new(message).with_code("INFERENCE_FAILED")
    }

    /// Create internal error
    pub fn internal_error(details: impl Into<String>) -> Self {
        Self::new("Internal server error")
            .with_code("INTERNAL_ERROR")
            .with_details(details)
    }
}

/// `GET /health` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
        }
    }
}

/// `GET /` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootResponse {
    pub status: String,
    pub model: String,
    /// `None` until the model is ready
    pub device: Option<String>,
}
