//! In-memory fakes for the model capabilities

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::models::device::{Device, LoadPlan, QuantizationPolicy};
use crate::models::manager::{ModelLifecycle, ModelLoader};
use crate::models::model::{EmbeddingModel, ModelInfo, TokenCounter};
use crate::models::{Embedding, EmbeddingError, EmbeddingResult};

/// Deterministic model: each component depends on the text and instruction
pub struct FakeModel {
    info: ModelInfo,
    dimension: usize,
    fail_with: Option<String>,
    drop_last: bool,
    attention_failure: bool,
    pub calls: Arc<AtomicUsize>,
    /// Truncation bound of every `encode` call
    pub max_lengths: Arc<Mutex<Vec<usize>>>,
}

impl FakeModel {
    pub fn new(dimension: usize) -> Self {
        Self {
            info: ModelInfo {
                name: "test/model".to_string(),
                model_path: "model.onnx".to_string(),
                device: Device::Cpu,
                quantization: QuantizationPolicy::FullPrecision,
                dimension: Some(dimension),
            },
            dimension,
            fail_with: None,
            drop_last: false,
            attention_failure: false,
            calls: Arc::new(AtomicUsize::new(0)),
            max_lengths: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.fail_with = Some(message.to_string());
        self
    }

    /// Return one vector fewer than asked for
    pub fn dropping_last(mut self) -> Self {
        self.drop_last = true;
        self
    }

    pub fn with_attention_failure(mut self) -> Self {
        self.attention_failure = true;
        self
    }
}

impl EmbeddingModel for FakeModel {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn encode(&self, texts: &[String], instruction: &str, max_length: usize) -> EmbeddingResult<Vec<Embedding>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.max_lengths.lock().unwrap().push(max_length);
        if let Some(message) = &self.fail_with {
            return Err(EmbeddingError::inference(message));
        }

        let mut embeddings: Vec<Embedding> = texts
            .iter()
            .map(|text| {
                (0..self.dimension)
                    .map(|j| (text.len() + instruction.len() * 3 + j) as f32 / 10.0)
                    .collect()
            })
            .collect();
        if self.drop_last {
            embeddings.pop();
        }
        Ok(embeddings)
    }

    fn supports_memory_efficient_attention(&self) -> bool {
        true
    }

    fn enable_memory_efficient_attention(&mut self) -> EmbeddingResult<()> {
        if self.attention_failure {
            return Err(EmbeddingError::ModelLoadFailed {
                error: "attention kernel unavailable".to_string(),
            });
        }
        Ok(())
    }
}

/// Counts whitespace-separated words plus one special token
pub struct FakeTokenizer {
    fail_with: Option<String>,
}

impl FakeTokenizer {
    pub fn new() -> Self {
        Self { fail_with: None }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
        }
    }
}

impl TokenCounter for FakeTokenizer {
    fn count_tokens(&self, text: &str) -> EmbeddingResult<usize> {
        match &self.fail_with {
            Some(message) => Err(EmbeddingError::inference(message)),
            None => Ok(text.split_whitespace().count() + 1),
        }
    }
}

type ModelFactory = Box<dyn Fn() -> FakeModel + Send + Sync>;

pub struct FakeLoader {
    devices: Vec<Device>,
    quantization: bool,
    model: ModelFactory,
    model_error: Option<String>,
    tokenizer_error: Option<String>,
    plans: Mutex<Vec<LoadPlan>>,
}

impl FakeLoader {
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            quantization: false,
            model: Box::new(|| FakeModel::new(4)),
            model_error: None,
            tokenizer_error: None,
            plans: Mutex::new(Vec::new()),
        }
    }

    pub fn with_devices(mut self, devices: &[Device]) -> Self {
        self.devices = devices.to_vec();
        self
    }

    pub fn with_quantization(mut self, available: bool) -> Self {
        self.quantization = available;
        self
    }

    pub fn with_model(mut self, factory: impl Fn() -> FakeModel + Send + Sync + 'static) -> Self {
        self.model = Box::new(factory);
        self
    }

    pub fn failing_model(mut self, message: &str) -> Self {
        self.model_error = Some(message.to_string());
        self
    }

    pub fn failing_tokenizer(mut self, message: &str) -> Self {
        self.tokenizer_error = Some(message.to_string());
        self
    }

    pub fn loaded_plans(&self) -> Vec<LoadPlan> {
        self.plans.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelLoader for FakeLoader {
    fn model_id(&self) -> &str {
        "test/model"
    }

    fn device_available(&self, device: Device) -> bool {
        self.devices.contains(&device)
    }

    async fn quantization_available(&self) -> bool {
        self.quantization
    }

    async fn load_model(&self, plan: &LoadPlan) -> EmbeddingResult<Box<dyn EmbeddingModel>> {
        self.plans.lock().unwrap().push(*plan);
        if let Some(error) = &self.model_error {
            return Err(EmbeddingError::ModelLoadFailed { error: error.clone() });
        }
        Ok(Box::new((self.model)()))
    }

    async fn load_tokenizer(&self) -> EmbeddingResult<Arc<dyn TokenCounter>> {
        if let Some(error) = &self.tokenizer_error {
            return Err(EmbeddingError::ModelLoadFailed { error: error.clone() });
        }
        Ok(Arc::new(FakeTokenizer::new()))
    }
}

/// A lifecycle already in the Ready phase
pub async fn ready_lifecycle(model: FakeModel) -> ModelLifecycle {
    let lifecycle = ModelLifecycle::new();
    let model = Mutex::new(Some(model));
    let loader = FakeLoader::new().with_model(move || model.lock().unwrap().take().expect("model is loaded once"));
    lifecycle.initialize(&loader).await.unwrap();
    lifecycle
}

/// A lifecycle whose tokenizer always fails
pub async fn lifecycle_with_failing_tokenizer(message: &str) -> ModelLifecycle {
    struct Loader(String);

    #[async_trait]
    impl ModelLoader for Loader {
        fn model_id(&self) -> &str {
            "test/model"
        }

        fn device_available(&self, _device: Device) -> bool {
            false
        }

        async fn quantization_available(&self) -> bool {
            false
        }

        async fn load_model(&self, _plan: &LoadPlan) -> EmbeddingResult<Box<dyn EmbeddingModel>> {
            Ok(Box::new(FakeModel::new(4)))
        }

        async fn load_tokenizer(&self) -> EmbeddingResult<Arc<dyn TokenCounter>> {
            Ok(Arc::new(FakeTokenizer::failing(&self.0)))
        }
    }

    let lifecycle = ModelLifecycle::new();
    lifecycle.initialize(&Loader(message.to_string())).await.unwrap();
    lifecycle
}
