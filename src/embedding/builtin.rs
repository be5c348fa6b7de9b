// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local fastembed model.

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::env;
use std::sync::Mutex;
use tracing::warn;

use super::provider::{truncate_texts, EmbeddingProvider};
use crate::errors::ProviderError;

const DEFAULT_FASTEMBED_MODEL: &str = "minilm";
const DEFAULT_FASTEMBED_BATCH_SIZE: usize = 256;
pub(super) const MAX_FASTEMBED_BATCH_SIZE: usize = 1024;
const DEFAULT_FASTEMBED_MAX_CHARS: usize = 2000;

/// Configuration for the builtin fastembed provider.
#[derive(Debug, Clone)]
pub struct EmbeddingProviderConfig {
    pub model: EmbeddingModel,
    pub batch_size: usize,
    pub max_chars: usize,
}

impl EmbeddingProviderConfig {
    pub fn from_env() -> Result<Self, ProviderError> {
        let model = parse_model_env()?;
        let mut batch_size = parse_usize_env("FASTEMBED_BATCH_SIZE", DEFAULT_FASTEMBED_BATCH_SIZE)?;
        if batch_size == 0 {
            batch_size = DEFAULT_FASTEMBED_BATCH_SIZE;
        }
        if batch_size > MAX_FASTEMBED_BATCH_SIZE {
            warn!(
                "FASTEMBED_BATCH_SIZE={} exceeds max {}; clamping.",
                batch_size, MAX_FASTEMBED_BATCH_SIZE
            );
            batch_size = MAX_FASTEMBED_BATCH_SIZE;
        }

        let mut max_chars = parse_usize_env("FASTEMBED_MAX_CHARS", DEFAULT_FASTEMBED_MAX_CHARS)?;
        if max_chars == 0 {
            max_chars = DEFAULT_FASTEMBED_MAX_CHARS;
        }

        Ok(Self {
            model,
            batch_size,
            max_chars,
        })
    }

    pub fn has_env_overrides() -> bool {
        env::var_os("FASTEMBED_MODEL").is_some()
            || env::var_os("FASTEMBED_BATCH_SIZE").is_some()
            || env::var_os("FASTEMBED_MAX_CHARS").is_some()
    }
}

impl Default for EmbeddingProviderConfig {
    fn default() -> Self {
        Self {
            model: EmbeddingModel::AllMiniLML6V2,
            batch_size: DEFAULT_FASTEMBED_BATCH_SIZE,
            max_chars: DEFAULT_FASTEMBED_MAX_CHARS,
        }
    }
}

/// FastEmbed provider using sentence-transformers/all-MiniLM-L6-v2.
pub struct FastEmbedder {
    embedder: Mutex<TextEmbedding>,
    config: EmbeddingProviderConfig,
    model_id: String,
}

impl FastEmbedder {
    pub fn new(config: EmbeddingProviderConfig) -> Result<Self, ProviderError> {
        let model = config.model.clone();
        let model_id = model.to_string();
        let init = InitOptions::new(model);
        let embedder = TextEmbedding::try_new(init).map_err(|err| {
            ProviderError::init(format!("Failed to initialize fastembed model: {}", err))
        })?;

        Ok(Self {
            embedder: Mutex::new(embedder),
            config,
            model_id,
        })
    }
}

impl EmbeddingProvider for FastEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let prepared = truncate_texts(texts, self.config.max_chars);
        let mut embedder = self
            .embedder
            .lock()
            .map_err(|_| ProviderError::upstream(texts, "fastembed model lock poisoned"))?;
        embedder
            .embed(&prepared, Some(self.config.batch_size))
            .map_err(|err| ProviderError::upstream(texts, err.to_string()))
    }
}

fn parse_model_env() -> Result<EmbeddingModel, ProviderError> {
    let raw = env::var("FASTEMBED_MODEL").unwrap_or_else(|_| DEFAULT_FASTEMBED_MODEL.to_string());
    let value = raw.trim();
    if value.is_empty() {
        return Ok(EmbeddingModel::AllMiniLML6V2);
    }

    match value.to_lowercase().as_str() {
        "minilm"
        | "all-minilm-l6-v2"
        | "allminilm-l6-v2"
        | "sentence-transformers/all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        other => Err(ProviderError::init(format!(
            "Unsupported FASTEMBED_MODEL '{}'. Supported value: {}",
            other, DEFAULT_FASTEMBED_MODEL
        ))),
    }
}

fn parse_usize_env(name: &str, default: usize) -> Result<usize, ProviderError> {
    match env::var(name) {
        Ok(raw) => {
            let value = raw.trim();
            if value.is_empty() {
                Ok(default)
            } else {
                value
                    .parse::<usize>()
                    .map_err(|_| ProviderError::init(format!("Invalid {} value: {}", name, value)))
            }
        }
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(ProviderError::init(format!("Failed to read {}: {}", name, err))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_minilm() {
        let config = EmbeddingProviderConfig::default();
        assert!(matches!(config.model, EmbeddingModel::AllMiniLML6V2));
        assert_eq!(config.batch_size, DEFAULT_FASTEMBED_BATCH_SIZE);
        assert!(config.batch_size <= MAX_FASTEMBED_BATCH_SIZE);
        assert_eq!(config.max_chars, DEFAULT_FASTEMBED_MAX_CHARS);
    }
}
