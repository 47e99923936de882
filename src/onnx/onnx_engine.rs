//! # ONNX Embedding Engine
//!
//! Pure Rust implementation of embedding generation using ONNX Runtime.
//!
//! ## Features
//!
//! - Execution provider chosen from the startup [`LoadPlan`] (CUDA, CoreML or CPU)
//! - 8-bit graphs with runtime node placement, or f32 graphs bound to one device
//! - Instruction-steered embeddings: instruction tokens are excluded from pooling
//! - Mean pooling followed by L2 normalization
//!
//! ## Usage
//!
//! ```rust,ignore
//! let plan = LoadPlan::new(Device::Cpu, false);
//! let engine = OnnxEmbeddingEngine::load(&model_path, &tokenizer_path, &plan, &config)?;
//! let embeddings = engine.encode(&["Hello world".to_string()], "", 512)?;
//! ```

use ndarray::ArrayViewD;
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProviderDispatch,
};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::{RunOptions, Session};
use ort::value::Tensor;
use std::path::Path;
use std::sync::Mutex;
use tokenizers::{Encoding, Tokenizer, TruncationDirection};
use tracing::{debug, info, instrument};

use crate::models::device::{Device, LoadPlan, QuantizationPolicy};
use crate::models::model::{EmbeddingModel, ModelInfo};
use crate::models::{Embedding, EmbeddingError, EmbeddingResult, ModelConfig, MAX_INPUT_TOKENS};

/// Preferred output; falls back to the graph's first output
const HIDDEN_STATE_OUTPUT: &str = "last_hidden_state";

struct Runner {
    session: Session,
    run_options: RunOptions,
}

/// ONNX-based embedding engine for generating text embeddings
pub struct OnnxEmbeddingEngine {
    /// `Session::run` needs `&mut`, so concurrent requests queue here
    runner: Mutex<Runner>,
    /// HuggingFace tokenizer for text preprocessing (no truncation configured)
    tokenizer: Tokenizer,
    info: ModelInfo,
    output_name: String,
    needs_token_type_ids: bool,
    needs_position_ids: bool,
}

impl std::fmt::Debug for OnnxEmbeddingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbeddingEngine")
            .field("info", &self.info)
            .field("output_name", &self.output_name)
            .finish_non_exhaustive()
    }
}

impl OnnxEmbeddingEngine {
    /// Load the graph under `plan` and validate it with a warm-up inference
    ///
    /// # Arguments
    /// * `model_path` - ONNX graph (f32 or 8-bit, matching `plan.quantization`)
    /// * `tokenizer_path` - tokenizer.json shipped with the model
    /// * `plan` - device and quantization decided at startup
    /// * `config` - model configuration (name, threads)
    pub fn load(
        model_path: &Path,
        tokenizer_path: &Path,
        plan: &LoadPlan,
        config: &ModelConfig,
    ) -> EmbeddingResult<Self> {
        info!(
            "Initializing ONNX embedding engine with model: {} ({} on {})",
            model_path.display(),
            plan.quantization,
            plan.device
        );

        let builder = Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;

        let builder = match plan.quantization {
            // Runtime assigns each node to CUDA, spilling unsupported ones to CPU
            QuantizationPolicy::Int8 => builder
                .with_execution_providers([
                    CUDAExecutionProvider::default().build(),
                    CPUExecutionProvider::default().build(),
                ])?
                .with_intra_threads(1)?,
            // No pre-planned memory pattern keeps peak usage down during load
            QuantizationPolicy::FullPrecision => builder
                .with_memory_pattern(false)?
                .with_execution_providers([execution_provider(plan.device)])?
                .with_intra_threads(intra_threads(plan.device, config.intra_threads))?,
        };

        let session = builder
            .commit_from_file(model_path)
            .map_err(|e| EmbeddingError::ModelLoadFailed {
                error: format!("Failed to load ONNX model: {}", e),
            })?;

        let input_names: Vec<&str> = session.inputs.iter().map(|i| i.name.as_str()).collect();
        debug!("ONNX inputs: {:?}", input_names);
        let needs_token_type_ids = input_names.contains(&"token_type_ids");
        let needs_position_ids = input_names.contains(&"position_ids");

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name == HIDDEN_STATE_OUTPUT)
            .or_else(|| session.outputs.first())
            .map(|o| o.name.clone())
            .ok_or_else(|| EmbeddingError::ModelLoadFailed {
                error: "ONNX model declares no outputs".to_string(),
            })?;

        let tokenizer = load_tokenizer(tokenizer_path)?;

        let mut engine = Self {
            runner: Mutex::new(Runner {
                session,
                run_options: RunOptions::new()?,
            }),
            tokenizer,
            info: ModelInfo {
                name: config.model_dir.clone().unwrap_or_else(|| config.model_id.clone()),
                model_path: model_path.display().to_string(),
                device: plan.device,
                quantization: plan.quantization,
                dimension: None,
            },
            output_name,
            needs_token_type_ids,
            needs_position_ids,
        };

        let probe = engine.encode(&["validation test".to_string()], "", MAX_INPUT_TOKENS)?;
        engine.info.dimension = probe.first().map(Vec::len);

        info!(
            "ONNX embedding engine initialized: output '{}', dimension {:?}",
            engine.output_name, engine.info.dimension
        );
        Ok(engine)
    }

    /// Run one text through the graph and pool it into a single vector
    fn embed_one(
        &self,
        runner: &mut Runner,
        text: &str,
        instruction: &str,
        max_length: usize,
    ) -> EmbeddingResult<Embedding> {
        let (encoding, pool_mask) = steered_encoding(&self.tokenizer, text, instruction, max_length)?;
        let seq_len = encoding.len();

        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&x| x as i64).collect();
        let attention_mask: Vec<i64> = encoding.get_attention_mask().iter().map(|&x| x as i64).collect();

        // 2D tensors [batch_size=1, seq_len]
        let shape = [1i64, seq_len as i64];
        let mut inputs = vec![
            ("input_ids", input_tensor(shape, input_ids)?),
            ("attention_mask", input_tensor(shape, attention_mask)?),
        ];
        if self.needs_token_type_ids {
            inputs.push(("token_type_ids", input_tensor(shape, vec![0i64; seq_len])?));
        }
        if self.needs_position_ids {
            let positions: Vec<i64> = (0..seq_len as i64).collect();
            inputs.push(("position_ids", input_tensor(shape, positions)?));
        }

        let Runner { session, run_options } = runner;
        let outputs = session
            .run_with_options(inputs, &*run_options)
            .map_err(|e| EmbeddingError::inference(format!("ONNX inference failed: {}", e)))?;

        // Copies out of the runtime's host buffer into plain f32s
        let (shape, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbeddingError::inference(format!("Failed to extract output tensor: {}", e)))?;

        let dims: Vec<usize> = shape.iter().map(|&x| x as usize).collect();
        let output_array = ndarray::ArrayView::from_shape(dims.as_slice(), data)
            .map_err(|e| EmbeddingError::inference(format!("Failed to create output array view: {:?}", e)))?;

        let embedding = match dims.len() {
            3 => mean_pooling(&output_array, &pool_mask)?,
            // Already pooled by the graph: [1, hidden_size]
            2 => output_array.iter().copied().collect(),
            n => {
                return Err(EmbeddingError::inference(format!(
                    "Expected 2D or 3D output tensor, got {}D",
                    n
                )))
            }
        };

        normalize_embedding(&embedding)
    }
}

impl EmbeddingModel for OnnxEmbeddingEngine {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    #[instrument(skip(self, texts, instruction), fields(text_count = texts.len()))]
    fn encode(&self, texts: &[String], instruction: &str, max_length: usize) -> EmbeddingResult<Vec<Embedding>> {
        debug!("Generating embeddings for {} texts", texts.len());

        let mut runner = self
            .runner
            .lock()
            .map_err(|_| EmbeddingError::inference("ONNX session lock poisoned"))?;

        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed_one(&mut runner, text, instruction, max_length)?);
        }

        debug!("Successfully generated {} embeddings", embeddings.len());
        Ok(embeddings)
    }

    fn supports_memory_efficient_attention(&self) -> bool {
        self.info.quantization == QuantizationPolicy::FullPrecision
    }

    /// Shrink the memory arena back after every run instead of keeping the
    /// high-water mark of the longest input
    fn enable_memory_efficient_attention(&mut self) -> EmbeddingResult<()> {
        let arena = match self.info.device {
            Device::Cuda => "gpu:0",
            Device::CoreMl | Device::Cpu => "cpu:0",
        };
        let runner = self
            .runner
            .get_mut()
            .map_err(|_| EmbeddingError::inference("ONNX session lock poisoned"))?;
        runner
            .run_options
            .add_config_entry("memory.enable_memory_arena_shrinkage", arena)?;
        Ok(())
    }
}

fn execution_provider(device: Device) -> ExecutionProviderDispatch {
    match device {
        Device::Cuda => CUDAExecutionProvider::default().build().error_on_failure(),
        Device::CoreMl => CoreMLExecutionProvider::default().build().error_on_failure(),
        Device::Cpu => CPUExecutionProvider::default().build(),
    }
}

fn intra_threads(device: Device, configured: usize) -> usize {
    match device {
        // CUDA doesn't benefit from multiple threads
        Device::Cuda => 1,
        Device::CoreMl | Device::Cpu => configured,
    }
}

/// Load a tokenizer with any truncation/padding from tokenizer.json removed
pub(crate) fn load_tokenizer(path: &Path) -> EmbeddingResult<Tokenizer> {
    let mut tokenizer = Tokenizer::from_file(path).map_err(|e| EmbeddingError::ModelLoadFailed {
        error: format!("Failed to load tokenizer: {}", e),
    })?;
    tokenizer
        .with_truncation(None)
        .map_err(|e| EmbeddingError::ModelLoadFailed {
            error: format!("Failed to reset tokenizer truncation: {}", e),
        })?;
    tokenizer.with_padding(None);
    Ok(tokenizer)
}

/// Tokenize `instruction` + `text`, truncate to `max_length`, and return the
/// encoding with its pooling mask (instruction tokens excluded)
fn steered_encoding(
    tokenizer: &Tokenizer,
    text: &str,
    instruction: &str,
    max_length: usize,
) -> EmbeddingResult<(Encoding, Vec<u32>)> {
    let (input, prefix_tokens) = if instruction.is_empty() {
        (text.to_string(), 0)
    } else {
        let prefix = tokenizer
            .encode(instruction, false)
            .map_err(|e| EmbeddingError::inference(format!("Tokenization failed: {}", e)))?;
        (format!("{}{}", instruction, text), prefix.len())
    };

    let mut encoding = tokenizer
        .encode(input.as_str(), true)
        .map_err(|e| EmbeddingError::inference(format!("Tokenization failed: {}", e)))?;
    encoding.truncate(max_length, 0, TruncationDirection::Right);

    if encoding.get_ids().is_empty() {
        return Err(EmbeddingError::inference("Tokenizer produced no tokens"));
    }

    let pool_mask = pooling_mask(
        encoding.get_attention_mask(),
        encoding.get_special_tokens_mask(),
        prefix_tokens,
    );
    Ok((encoding, pool_mask))
}

/// `[1, seq_len]` int64 model input
fn input_tensor(shape: [i64; 2], data: Vec<i64>) -> EmbeddingResult<Tensor<i64>> {
    Tensor::from_array((shape, data))
        .map_err(|e| EmbeddingError::inference(format!("Failed to build input tensor: {}", e)))
}

/// Attention mask with the instruction prefix masked out
///
/// The prefix starts right after the leading special tokens (BOS). If the
/// text itself contributed no tokens the full attention mask is kept.
fn pooling_mask(attention_mask: &[u32], special_tokens_mask: &[u32], prefix_tokens: usize) -> Vec<u32> {
    let mut mask = attention_mask.to_vec();
    if prefix_tokens == 0 {
        return mask;
    }

    let start = special_tokens_mask.iter().take_while(|&&s| s == 1).count();
    let end = (start + prefix_tokens).min(mask.len());
    for m in &mut mask[start.min(end)..end] {
        *m = 0;
    }

    if mask.iter().all(|&m| m == 0) {
        return attention_mask.to_vec();
    }
    mask
}

/// Apply mean pooling to the token embeddings
///
/// # Arguments
/// * `output_tensor` - Output tensor from the model [batch_size, seq_len, hidden_size]
/// * `mask` - 1 for tokens that contribute, 0 for padding / instruction tokens
fn mean_pooling(output_tensor: &ArrayViewD<f32>, mask: &[u32]) -> EmbeddingResult<Vec<f32>> {
    let shape = output_tensor.shape();
    if shape.len() != 3 {
        return Err(EmbeddingError::inference(format!(
            "Expected 3D output tensor, got {}D",
            shape.len()
        )));
    }

    let seq_len = shape[1];
    let hidden_size = shape[2];

    if mask.len() != seq_len {
        return Err(EmbeddingError::inference(format!(
            "Attention mask length {} doesn't match sequence length {}",
            mask.len(),
            seq_len
        )));
    }

    let mut pooled = vec![0.0f32; hidden_size];
    let mut valid_tokens = 0;

    for seq_idx in 0..seq_len {
        if mask[seq_idx] == 1 {
            for hidden_idx in 0..hidden_size {
                pooled[hidden_idx] += output_tensor[[0, seq_idx, hidden_idx]];
            }
            valid_tokens += 1;
        }
    }

    if valid_tokens == 0 {
        return Err(EmbeddingError::inference("No valid tokens found in attention mask"));
    }

    for val in &mut pooled {
        *val /= valid_tokens as f32;
    }

    Ok(pooled)
}

/// Normalize embedding using L2 normalization
fn normalize_embedding(embedding: &[f32]) -> EmbeddingResult<Vec<f32>> {
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm == 0.0 || !norm.is_finite() {
        return Err(EmbeddingError::inference(format!(
            "Cannot normalize embedding with norm {}",
            norm
        )));
    }

    Ok(embedding.iter().map(|x| x / norm).collect())
}
