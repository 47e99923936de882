//! Wire types for the OpenAI-compatible HTTP API

pub mod http;

pub use http::{
    EmbeddingData, EmbeddingInput, EmbeddingRequest, EmbeddingResponse, HealthResponse,
    HttpErrorResponse, RootResponse, Usage,
};
