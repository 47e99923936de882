//! Model artifact resolution
//!
//! Weights and tokenizer come either from a local directory or from the
//! HuggingFace Hub cache (downloaded on first use). All methods block and
//! must be called from a blocking thread.

use hf_hub::api::sync::{Api, ApiBuilder};
use hf_hub::{Repo, RepoType};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::models::{EmbeddingError, EmbeddingResult, ModelConfig};

/// Where model files are read from
pub enum ArtifactSource {
    Local(PathBuf),
    Hub { api: Api, repo: Repo, model_id: String },
}

impl ArtifactSource {
    pub fn from_config(config: &ModelConfig) -> EmbeddingResult<Self> {
        if let Some(dir) = &config.model_dir {
            info!("Using local model directory {}", dir);
            return Ok(ArtifactSource::Local(PathBuf::from(dir)));
        }

        let mut builder = ApiBuilder::new()
            .with_progress(false)
            .with_token(std::env::var("HF_TOKEN").ok());
        if let Some(cache_dir) = &config.cache_dir {
            builder = builder.with_cache_dir(PathBuf::from(cache_dir));
        }
        let api = builder
            .build()
            .map_err(|e| EmbeddingError::initialization("hub client", e))?;

        Ok(ArtifactSource::Hub {
            api,
            repo: Repo::with_revision(config.model_id.clone(), RepoType::Model, config.revision.clone()),
            model_id: config.model_id.clone(),
        })
    }

    /// Whether `file` exists without downloading it
    pub fn contains(&self, file: &str) -> bool {
        match self {
            ArtifactSource::Local(dir) => dir.join(file).is_file(),
            ArtifactSource::Hub { api, repo, model_id } => match api.repo(repo.clone()).info() {
                Ok(info) => info.siblings.iter().any(|s| s.rfilename == file),
                Err(e) => {
                    warn!("Could not list {}: {}", model_id, e);
                    false
                }
            },
        }
    }

    /// Local path of `file`, downloading it first if needed
    pub fn fetch(&self, file: &str) -> EmbeddingResult<PathBuf> {
        match self {
            ArtifactSource::Local(dir) => {
                let path = dir.join(file);
                if !path.is_file() {
                    return Err(EmbeddingError::ModelLoadFailed {
                        error: format!("Model file not found: {}", path.display()),
                    });
                }
                Ok(path)
            }
            ArtifactSource::Hub { api, repo, model_id } => {
                debug!("Fetching {} from {}", file, model_id);
                api.repo(repo.clone())
                    .get(file)
                    .map_err(|e| EmbeddingError::ModelLoadFailed {
                        error: format!("Failed to fetch {}: {}", file, e),
                    })
            }
        }
    }

    /// Fetch an ONNX graph along with its external-data file, if it has one.
    /// Graphs over 2GB keep their weights in `<file>_data` next to the graph.
    pub fn fetch_graph(&self, file: &str) -> EmbeddingResult<PathBuf> {
        let path = self.fetch(file)?;
        let data_file = format!("{}_data", file);
        if self.contains(&data_file) {
            self.fetch(&data_file)?;
        }
        Ok(path)
    }
}
