//! Embedding providers.
//!
//! The catalog only needs `text -> vector`. Two providers implement it:
//! - [`OllamaEmbedder`]: HTTP call to an Ollama server (`/api/embeddings`)
//! - [`LocalEmbedder`]: in-process fastembed model (`local-embed` feature)

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{EmbeddingConfig, EmbeddingProviderKind};

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned status {0}")]
    Status(u16),

    #[error("provider returned an empty embedding")]
    Empty,

    #[error("model initialization failed: {0}")]
    InitFailed(String),

    #[error("embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("invalid model name: {0}")]
    InvalidModel(String),
}

/// Opaque `text -> vector` function. Calls may be slow and may fail.
pub trait EmbeddingProvider: Send + Sync {
    fn generate(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Name of the model producing the vectors.
    fn model(&self) -> &str;
}

/// Build the provider selected in the config.
pub fn from_config(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>, EmbeddingError> {
    match config.provider {
        EmbeddingProviderKind::Ollama => Ok(Box::new(OllamaEmbedder::new(
            &config.base_url,
            &config.model,
            Duration::from_secs(config.timeout_secs),
        )?)),
        #[cfg(feature = "local-embed")]
        EmbeddingProviderKind::Local => Ok(Box::new(LocalEmbedder::new(
            &config.model,
            crate::base_path().join("models"),
        )?)),
        #[cfg(not(feature = "local-embed"))]
        EmbeddingProviderKind::Local => Err(EmbeddingError::InitFailed(
            "local embeddings require building with the `local-embed` feature".to_string(),
        )),
    }
}

pub struct OllamaEmbedder {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, EmbeddingError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/api/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
        })
    }
}

impl EmbeddingProvider for OllamaEmbedder {
    fn generate(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        log::debug!("requesting embedding model={} chars={}", self.model, text.len());

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&OllamaRequest {
                model: &self.model,
                prompt: text,
            })
            .send()?;

        let status = resp.status();
        if !status.is_success() {
            log::warn!("ollama returned status {status}");
            return Err(EmbeddingError::Status(status.as_u16()));
        }

        let body: OllamaResponse = resp.json()?;
        if body.embedding.is_empty() {
            return Err(EmbeddingError::Empty);
        }

        Ok(body.embedding)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Wrapper around fastembed's TextEmbedding model.
/// Uses a Mutex because fastembed's embed() requires &mut self.
#[cfg(feature = "local-embed")]
pub struct LocalEmbedder {
    model: std::sync::Mutex<fastembed::TextEmbedding>,
    model_name: String,
}

#[cfg(feature = "local-embed")]
impl LocalEmbedder {
    /// Load (downloading on first use) the named model into `cache_dir`.
    pub fn new(model_name: &str, cache_dir: std::path::PathBuf) -> Result<Self, EmbeddingError> {
        use fastembed::{InitOptions, TextEmbedding};

        let model_enum = Self::parse_model_name(model_name)?;

        std::fs::create_dir_all(&cache_dir).map_err(|e| {
            EmbeddingError::InitFailed(format!("Failed to create models directory: {}", e))
        })?;

        let options = InitOptions::new(model_enum)
            .with_cache_dir(cache_dir)
            .with_show_download_progress(true);

        let model = TextEmbedding::try_new(options)
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

        Ok(Self {
            model: std::sync::Mutex::new(model),
            model_name: model_name.to_string(),
        })
    }

    fn parse_model_name(name: &str) -> Result<fastembed::EmbeddingModel, EmbeddingError> {
        match name.to_lowercase().as_str() {
            "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
            "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
            "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
            "nomic-embed-text" | "nomic-embed-text-v1.5" => {
                Ok(fastembed::EmbeddingModel::NomicEmbedTextV15)
            }
            _ => Err(EmbeddingError::InvalidModel(format!(
                "Unknown model: {}. Supported models: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5, nomic-embed-text",
                name
            ))),
        }
    }
}

#[cfg(feature = "local-embed")]
impl EmbeddingProvider for LocalEmbedder {
    fn generate(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut model = self.model.lock().map_err(|e| {
            EmbeddingError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
        })?;

        let embeddings = model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

        embeddings
            .into_iter()
            .next()
            .filter(|v| !v.is_empty())
            .ok_or(EmbeddingError::Empty)
    }

    fn model(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn embedder(server: &MockServer) -> OllamaEmbedder {
        OllamaEmbedder::new(&server.base_url(), "nomic-embed-text", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_ollama_generate() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/embeddings")
                .json_body(json!({"model": "nomic-embed-text", "prompt": "Dune by Frank Herbert"}));
            then.status(200)
                .json_body(json!({"embedding": [0.25, -0.5, 1.0]}));
        });

        let vector = embedder(&server).generate("Dune by Frank Herbert").unwrap();

        mock.assert();
        assert_eq!(vector, vec![0.25, -0.5, 1.0]);
    }

    #[test]
    fn test_ollama_error_status() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/embeddings");
            then.status(500).body("model not loaded");
        });

        let result = embedder(&server).generate("anything");
        assert!(matches!(result, Err(EmbeddingError::Status(500))));
    }

    #[test]
    fn test_ollama_empty_embedding() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/embeddings");
            then.status(200).json_body(json!({"embedding": []}));
        });

        let result = embedder(&server).generate("anything");
        assert!(matches!(result, Err(EmbeddingError::Empty)));
    }

    #[test]
    fn test_trailing_slash_in_base_url() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/api/embeddings");
            then.status(200).json_body(json!({"embedding": [1.0]}));
        });

        let embedder = OllamaEmbedder::new(
            &format!("{}/", server.base_url()),
            "m",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(embedder.generate("x").unwrap(), vec![1.0]);
        mock.assert();
    }

    #[cfg(not(feature = "local-embed"))]
    #[test]
    fn test_local_provider_requires_feature() {
        let config = EmbeddingConfig {
            provider: EmbeddingProviderKind::Local,
            ..Default::default()
        };
        assert!(matches!(from_config(&config), Err(EmbeddingError::InitFailed(_))));
    }
}
