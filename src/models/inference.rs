//! Embedding Request Handler
//!
//! Turns one [`EmbeddingRequest`] into one [`EmbeddingResponse`] using the
//! ready model state. Inference is blocking work and runs on tokio's
//! blocking pool so the I/O threads keep accepting connections.

use std::sync::Arc;
use tracing::{debug, error};

use crate::models::manager::{ModelLifecycle, ModelState};
use crate::models::{Embedding, EmbeddingError, EmbeddingResult};
use crate::protocol::http::{EmbeddingRequest, EmbeddingResponse};

/// Per-input truncation bound, in tokens
pub const MAX_INPUT_TOKENS: usize = 512;

/// Create embeddings for every input text, in input order
pub async fn create_embeddings(
    lifecycle: &ModelLifecycle,
    request: EmbeddingRequest,
    default_model: &str,
) -> EmbeddingResult<EmbeddingResponse> {
    let state = lifecycle.current_state().await?;

    let model_label = request.model.unwrap_or_else(|| default_model.to_string());
    let texts = request.input.into_texts();
    if texts.is_empty() {
        return Ok(EmbeddingResponse::new(model_label, Vec::new(), 0));
    }

    let instruction = request.instruction;
    let (embeddings, total_tokens) =
        tokio::task::spawn_blocking(move || run_inference(&state, &texts, &instruction))
            .await
            .map_err(|e| {
                error!("Error generating embeddings: {}", e);
                EmbeddingError::inference(e)
            })?
            .map_err(|e| {
                error!("Error generating embeddings: {}", e);
                match e {
                    e @ EmbeddingError::InferenceFailed { .. } => e,
                    e => EmbeddingError::inference(e),
                }
            })?;

    Ok(EmbeddingResponse::new(model_label, embeddings, total_tokens))
}

fn run_inference(
    state: &Arc<ModelState>,
    texts: &[String],
    instruction: &str,
) -> EmbeddingResult<(Vec<Embedding>, usize)> {
    let embeddings = state.model.encode(texts, instruction, MAX_INPUT_TOKENS)?;
    if embeddings.len() != texts.len() {
        return Err(EmbeddingError::inference(format!(
            "model returned {} embeddings for {} inputs",
            embeddings.len(),
            texts.len()
        )));
    }
    if let Some(index) = embeddings.iter().position(|e| e.iter().any(|v| !v.is_finite())) {
        return Err(EmbeddingError::inference(format!(
            "embedding {} contains non-finite values",
            index
        )));
    }

    let total_tokens = texts
        .iter()
        .map(|text| state.tokenizer.count_tokens(text))
        .sum::<EmbeddingResult<usize>>()?;

    debug!("Generated {} embeddings ({} tokens)", embeddings.len(), total_tokens);
    Ok((embeddings, total_tokens))
}
