//! Embedding Server Library
//!
//! OpenAI-compatible HTTP server for text embeddings backed by ONNX Runtime

pub mod models;
pub mod onnx;
pub mod protocol;
pub mod server;

// Re-exports
pub use models::{create_embeddings, Embedding, EmbeddingError, ModelLifecycle, ModelLoader};
pub use onnx::OnnxModelLoader;
pub use protocol::{EmbeddingRequest, EmbeddingResponse};
pub use server::{start_hyper_http_server, ServerConfig};
