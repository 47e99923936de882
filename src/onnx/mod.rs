//! ONNX Runtime backend for the model and tokenizer capabilities

pub mod artifacts;
pub mod loader;
pub mod onnx_engine;
pub mod tokenizer;

#[cfg(test)]
pub(crate) mod testing;

pub use artifacts::ArtifactSource;
pub use loader::OnnxModelLoader;
pub use onnx_engine::OnnxEmbeddingEngine;
pub use tokenizer::HfTokenCounter;
