//! [`ModelLoader`] backed by ONNX Runtime and the HuggingFace Hub

use async_trait::async_trait;
use ort::execution_providers::{CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider};
use std::sync::Arc;
use tracing::{debug, info};

use crate::models::device::{Device, LoadPlan, QuantizationPolicy};
use crate::models::manager::ModelLoader;
use crate::models::model::{EmbeddingModel, TokenCounter};
use crate::models::{EmbeddingError, EmbeddingResult, ModelConfig};
use crate::onnx::artifacts::ArtifactSource;
use crate::onnx::onnx_engine::OnnxEmbeddingEngine;
use crate::onnx::tokenizer::HfTokenCounter;

pub struct OnnxModelLoader {
    config: Arc<ModelConfig>,
    source: Arc<ArtifactSource>,
}

impl OnnxModelLoader {
    pub fn new(config: ModelConfig) -> EmbeddingResult<Self> {
        let source = ArtifactSource::from_config(&config)?;
        Ok(Self {
            config: Arc::new(config),
            source: Arc::new(source),
        })
    }

    /// Run blocking artifact / runtime work off the async threads
    async fn blocking<T, F>(&self, f: F) -> EmbeddingResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&ModelConfig, &ArtifactSource) -> EmbeddingResult<T> + Send + 'static,
    {
        let config = Arc::clone(&self.config);
        let source = Arc::clone(&self.source);
        tokio::task::spawn_blocking(move || f(&config, &source))
            .await
            .map_err(|e| EmbeddingError::ModelLoadFailed {
                error: format!("Loader task failed: {}", e),
            })?
    }
}

#[async_trait]
impl ModelLoader for OnnxModelLoader {
    fn model_id(&self) -> &str {
        self.config.model_dir.as_deref().unwrap_or(&self.config.model_id)
    }

    fn device_available(&self, device: Device) -> bool {
        let available = match device {
            Device::Cuda => CUDAExecutionProvider::default().is_available(),
            Device::CoreMl => CoreMLExecutionProvider::default().is_available(),
            Device::Cpu => Ok(true),
        };
        debug!("Execution provider {} available: {:?}", device, available);
        available.unwrap_or(false)
    }

    async fn quantization_available(&self) -> bool {
        self.blocking(|config, source| Ok(source.contains(&config.quantized_model_file)))
            .await
            .unwrap_or(false)
    }

    async fn load_model(&self, plan: &LoadPlan) -> EmbeddingResult<Box<dyn EmbeddingModel>> {
        let plan = *plan;
        let engine = self
            .blocking(move |config, source| {
                let file = match plan.quantization {
                    QuantizationPolicy::Int8 => &config.quantized_model_file,
                    QuantizationPolicy::FullPrecision => &config.model_file,
                };
                info!("Fetching {}", file);
                let model_path = source.fetch_graph(file)?;
                let tokenizer_path = source.fetch(&config.tokenizer_file)?;
                OnnxEmbeddingEngine::load(&model_path, &tokenizer_path, &plan, config)
            })
            .await?;
        Ok(Box::new(engine))
    }

    async fn load_tokenizer(&self) -> EmbeddingResult<Arc<dyn TokenCounter>> {
        let counter = self
            .blocking(|config, source| {
                let path = source.fetch(&config.tokenizer_file)?;
                HfTokenCounter::from_file(&path)
            })
            .await?;
        Ok(Arc::new(counter))
    }
}
