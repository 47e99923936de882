//! Model Lifecycle Manager
//!
//! Owns the process-wide model state. The state is built exactly once by
//! [`ModelLifecycle::initialize`] before the server accepts any request and
//! is read-only afterwards:
//!
//! ```text
//! Uninitialized -> Initializing -> Ready
//!                              \-> Failed
//! ```
//!
//! There is no way back to `Uninitialized` and no hot reload.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::models::device::{select_device, Device, LoadPlan, QuantizationPolicy};
use crate::models::model::{EmbeddingModel, TokenCounter};
use crate::models::{EmbeddingError, EmbeddingResult};

/// Source of the model and tokenizer capabilities
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Identifier the weights and tokenizer are fetched by
    fn model_id(&self) -> &str;

    /// Whether the runtime can execute on `device`. Never called for Cpu.
    fn device_available(&self, device: Device) -> bool;

    /// Whether 8-bit quantized weights can be loaded
    async fn quantization_available(&self) -> bool;

    /// Load the model under the given plan
    async fn load_model(&self, plan: &LoadPlan) -> EmbeddingResult<Box<dyn EmbeddingModel>>;

    /// Load the tokenizer (independent of the quantization policy)
    async fn load_tokenizer(&self) -> EmbeddingResult<Arc<dyn TokenCounter>>;
}

/// Ready-state tuple shared read-only by every request
pub struct ModelState {
    pub model_id: String,
    pub device: Device,
    pub quantization: QuantizationPolicy,
    pub model: Arc<dyn EmbeddingModel>,
    pub tokenizer: Arc<dyn TokenCounter>,
}

impl std::fmt::Debug for ModelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelState")
            .field("model_id", &self.model_id)
            .field("device", &self.device)
            .field("quantization", &self.quantization)
            .finish_non_exhaustive()
    }
}

/// Observable lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

impl LifecyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecyclePhase::Uninitialized => "uninitialized",
            LifecyclePhase::Initializing => "initializing",
            LifecyclePhase::Ready => "healthy",
            LifecyclePhase::Failed => "failed",
        }
    }
}

enum Phase {
    Uninitialized,
    Initializing,
    Ready(Arc<ModelState>),
    Failed(String),
}

/// Main manager for the embedding model lifecycle
pub struct ModelLifecycle {
    phase: RwLock<Phase>,
}

impl ModelLifecycle {
    pub fn new() -> Self {
        Self {
            phase: RwLock::new(Phase::Uninitialized),
        }
    }

    /// Select device and policy, load model and tokenizer. Any failure is
    /// terminal: the lifecycle moves to `Failed` and the caller must not serve.
    pub async fn initialize(&self, loader: &dyn ModelLoader) -> EmbeddingResult<Arc<ModelState>> {
        {
            let mut phase = self.phase.write().await;
            if !matches!(*phase, Phase::Uninitialized) {
                return Err(EmbeddingError::initialization(
                    "lifecycle",
                    "model lifecycle was already initialized",
                ));
            }
            *phase = Phase::Initializing;
        }

        info!("Loading {} model...", loader.model_id());

        match Self::load(loader).await {
            Ok(state) => {
                let state = Arc::new(state);
                *self.phase.write().await = Phase::Ready(Arc::clone(&state));
                Ok(state)
            }
            Err(e) => {
                error!("Failed to load model: {}", e);
                *self.phase.write().await = Phase::Failed(e.to_string());
                Err(e)
            }
        }
    }

    async fn load(loader: &dyn ModelLoader) -> EmbeddingResult<ModelState> {
        let device = select_device(|device| loader.device_available(device));
        info!("Using {}", device);

        // Only worth probing when the device could use it
        let quant_capability = device == Device::Cuda && loader.quantization_available().await;
        if device == Device::Cuda && !quant_capability {
            info!("8-bit weights not available - will use memory-efficient loading");
        }
        let plan = LoadPlan::new(device, quant_capability);
        info!("Loading model with {}", plan.quantization);

        let mut model = loader
            .load_model(&plan)
            .await
            .map_err(|e| Self::stage_error("model load", e))?;

        if model.supports_memory_efficient_attention() {
            match model.enable_memory_efficient_attention() {
                Ok(()) => info!("Memory-efficient attention enabled"),
                Err(e) => warn!("Could not enable memory-efficient attention: {}", e),
            }
        }

        let tokenizer = loader
            .load_tokenizer()
            .await
            .map_err(|e| Self::stage_error("tokenizer load", e))?;

        model.set_inference_mode();
        let model_info = model.info();
        info!(
            "Model {} loaded from {} (dimension {:?})",
            model_info.name, model_info.model_path, model_info.dimension
        );
        info!("Model loaded successfully with {} on {}", plan.quantization, device);

        Ok(ModelState {
            model_id: loader.model_id().to_string(),
            device,
            quantization: plan.quantization,
            model: Arc::from(model),
            tokenizer,
        })
    }

    fn stage_error(stage: &str, error: EmbeddingError) -> EmbeddingError {
        match error {
            e @ EmbeddingError::InitializationFailed { .. } => e,
            e => EmbeddingError::initialization(stage, e),
        }
    }

    /// The ready-state tuple. Never triggers initialization.
    pub async fn current_state(&self) -> EmbeddingResult<Arc<ModelState>> {
        match &*self.phase.read().await {
            Phase::Ready(state) => Ok(Arc::clone(state)),
            _ => Err(EmbeddingError::ModelNotReady),
        }
    }

    pub async fn phase(&self) -> LifecyclePhase {
        match &*self.phase.read().await {
            Phase::Uninitialized => LifecyclePhase::Uninitialized,
            Phase::Initializing => LifecyclePhase::Initializing,
            Phase::Ready(_) => LifecyclePhase::Ready,
            Phase::Failed(_) => LifecyclePhase::Failed,
        }
    }

    /// Cause of the failure, if initialization failed
    pub async fn failure(&self) -> Option<String> {
        match &*self.phase.read().await {
            Phase::Failed(cause) => Some(cause.clone()),
            _ => None,
        }
    }

    /// Best-effort release notification. Handles are freed at process exit.
    pub async fn shutdown(&self) {
        match &*self.phase.read().await {
            Phase::Ready(state) => {
                debug!("Releasing {} ({} in-flight references)", state.model_id, Arc::strong_count(state) - 1);
                info!("Shutting down embedding server");
            }
            _ => info!("Shutting down embedding server (model was never ready)"),
        }
    }
}

impl Default for ModelLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::testing::{FakeLoader, FakeModel};

    #[tokio::test]
    async fn test_starts_uninitialized() {
        let lifecycle = ModelLifecycle::new();
        assert_eq!(lifecycle.phase().await, LifecyclePhase::Uninitialized);
        assert!(matches!(
            lifecycle.current_state().await,
            Err(EmbeddingError::ModelNotReady)
        ));
    }

    #[tokio::test]
    async fn test_initialize_cuda_with_quantization() {
        let loader = FakeLoader::new().with_devices(&[Device::Cuda, Device::CoreMl]).with_quantization(true);
        let lifecycle = ModelLifecycle::new();

        let state = lifecycle.initialize(&loader).await.unwrap();
        assert_eq!(state.device, Device::Cuda);
        assert_eq!(state.quantization, QuantizationPolicy::Int8);
        assert_eq!(state.model_id, "test/model");
        assert_eq!(lifecycle.phase().await, LifecyclePhase::Ready);
        assert_eq!(loader.loaded_plans(), vec![LoadPlan::new(Device::Cuda, true)]);
    }

    #[tokio::test]
    async fn test_quantization_ignored_off_cuda() {
        let loader = FakeLoader::new().with_devices(&[Device::CoreMl]).with_quantization(true);
        let lifecycle = ModelLifecycle::new();

        let state = lifecycle.initialize(&loader).await.unwrap();
        assert_eq!(state.device, Device::CoreMl);
        assert_eq!(state.quantization, QuantizationPolicy::FullPrecision);
    }

    #[tokio::test]
    async fn test_cpu_fallback() {
        let loader = FakeLoader::new();
        let lifecycle = ModelLifecycle::new();

        let state = lifecycle.initialize(&loader).await.unwrap();
        assert_eq!(state.device, Device::Cpu);
        assert_eq!(state.quantization, QuantizationPolicy::FullPrecision);
    }

    #[tokio::test]
    async fn test_model_load_failure_is_terminal() {
        let loader = FakeLoader::new().failing_model("weights not found");
        let lifecycle = ModelLifecycle::new();

        let err = lifecycle.initialize(&loader).await.unwrap_err();
        match err {
            EmbeddingError::InitializationFailed { stage, error } => {
                assert_eq!(stage, "model load");
                assert!(error.contains("weights not found"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(lifecycle.phase().await, LifecyclePhase::Failed);
        assert!(lifecycle.failure().await.unwrap().contains("weights not found"));
        assert!(matches!(
            lifecycle.current_state().await,
            Err(EmbeddingError::ModelNotReady)
        ));
    }

    #[tokio::test]
    async fn test_tokenizer_failure_is_terminal() {
        let loader = FakeLoader::new().failing_tokenizer("tokenizer.json missing");
        let lifecycle = ModelLifecycle::new();

        let err = lifecycle.initialize(&loader).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::InitializationFailed { ref stage, .. } if stage == "tokenizer load"));
        assert_eq!(lifecycle.phase().await, LifecyclePhase::Failed);
    }

    #[tokio::test]
    async fn test_no_second_initialization() {
        let loader = FakeLoader::new();
        let lifecycle = ModelLifecycle::new();
        lifecycle.initialize(&loader).await.unwrap();

        let err = lifecycle.initialize(&loader).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::InitializationFailed { ref stage, .. } if stage == "lifecycle"));
        assert_eq!(lifecycle.phase().await, LifecyclePhase::Ready);
        assert_eq!(loader.loaded_plans().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_efficient_attention_failure_is_not_fatal() {
        let loader = FakeLoader::new().with_model(|| FakeModel::new(4).with_attention_failure());
        let lifecycle = ModelLifecycle::new();

        assert!(lifecycle.initialize(&loader).await.is_ok());
        assert_eq!(lifecycle.phase().await, LifecyclePhase::Ready);
    }

    #[tokio::test]
    async fn test_shutdown_keeps_state() {
        let loader = FakeLoader::new();
        let lifecycle = ModelLifecycle::new();
        lifecycle.initialize(&loader).await.unwrap();

        lifecycle.shutdown().await;
        assert_eq!(lifecycle.phase().await, LifecyclePhase::Ready);
    }
}
