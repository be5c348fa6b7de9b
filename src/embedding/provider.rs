// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding provider interface and implementations.
//!
//! Backends implement [`EmbeddingProvider::embed_batch`]; callers go through
//! [`EmbeddingProvider::embed_texts`], which enforces the batch contract and
//! L2-normalizes every returned vector.

use serde::Deserialize;
use serde_json::Value;
use std::borrow::Cow;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
use super::builtin::{EmbeddingProviderConfig, FastEmbedder, MAX_FASTEMBED_BATCH_SIZE};

use super::vector::l2_normalize;
use crate::config::{EmbeddingConfig, EmbeddingProviderType};
use crate::errors::{CommandError, ProviderError, ProviderErrorKind};
use crate::process::run_json_command;

const DEFAULT_BATCH_SIZE: usize = 256;

/// Trait for embedding providers.
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier.
    fn model_id(&self) -> &str;

    /// Maximum number of texts accepted per call.
    fn batch_size(&self) -> usize;

    /// Backend call: one raw vector per text, in order.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    /// Generates unit-normalized embeddings for the given texts.
    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Err(ProviderError::empty_input());
        }
        if texts.len() > self.batch_size() {
            return Err(ProviderError::new(
                ProviderErrorKind::BatchTooLarge,
                texts,
                format!("batch limit is {}", self.batch_size()),
            ));
        }

        let mut vectors = self.embed_batch(texts)?;
        if vectors.len() != texts.len() {
            return Err(ProviderError::invalid_response(
                texts,
                format!("expected {} vectors, got {}", texts.len(), vectors.len()),
            ));
        }
        if vectors.iter().any(|v| v.is_empty()) {
            return Err(ProviderError::invalid_response(texts, "empty vector returned"));
        }

        for vector in vectors.iter_mut() {
            l2_normalize(vector);
        }
        debug!(
            model = self.model_id(),
            count = vectors.len(),
            dim = vectors[0].len(),
            "embedded batch"
        );
        Ok(vectors)
    }

    /// Generates an embedding for a single text.
    fn embed_one(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let texts = [text.to_string()];
        let mut result = self.embed_texts(&texts)?;
        result
            .pop()
            .ok_or_else(|| ProviderError::invalid_response(&texts, "no embedding returned"))
    }
}

#[derive(Debug, Deserialize)]
struct HttpEmbeddingObject {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct HttpEmbeddingResponse {
    data: Vec<HttpEmbeddingObject>,
}

/// Provider for an OpenAI-compatible `/embeddings` endpoint.
pub struct HttpProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    batch_size: usize,
    max_chars: usize,
    timeout: Duration,
}

impl HttpProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, ProviderError> {
        let timeout = Duration::from_millis(config.timeout_ms());
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ProviderError::init(format!("Failed to build HTTP client: {}", err)))?;

        let api_key = env::var(config.api_key_env())
            .ok()
            .filter(|key| !key.trim().is_empty());
        if api_key.is_none() {
            warn!(
                "{} is not set; calling {} without authentication",
                config.api_key_env(),
                config.base_url()
            );
        }

        Ok(Self {
            client,
            base_url: config.base_url().trim_end_matches('/').to_string(),
            api_key,
            model: config.model().to_string(),
            batch_size: config.batch_size(),
            max_chars: config.max_chars(),
            timeout,
        })
    }
}

impl EmbeddingProvider for HttpProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let url = format!("{}/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": truncate_texts(texts, self.max_chars),
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().map_err(|err| {
            if err.is_timeout() {
                ProviderError::timeout(texts, self.timeout)
            } else {
                ProviderError::upstream(texts, format!("request to {} failed: {}", url, err))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(ProviderError::upstream(
                texts,
                format!("embedding API returned {}: {}", status, text.trim()),
            ));
        }

        let parsed: HttpEmbeddingResponse = response
            .json()
            .map_err(|err| ProviderError::invalid_response(texts, err.to_string()))?;

        // The API may return objects out of order; sort by index.
        let mut data = parsed.data;
        data.sort_by_key(|e| e.index);
        Ok(data.into_iter().map(|e| e.embedding).collect())
    }
}

/// Command provider that shells out to an external process.
pub struct CommandProvider {
    command: String,
    model: String,
    batch_size: usize,
    max_chars: usize,
    timeout: Duration,
}

impl CommandProvider {
    pub fn new(command: String, model: String) -> Self {
        Self {
            command,
            model,
            batch_size: 64,
            max_chars: 8000,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            command: config.command().to_string(),
            model: config.model().to_string(),
            batch_size: config.batch_size(),
            max_chars: config.max_chars(),
            timeout: Duration::from_millis(config.timeout_ms()),
        }
    }

    fn parse_vectors(texts: &[String], parsed: Value) -> Result<Vec<Vec<f32>>, ProviderError> {
        let embeddings_value = match parsed {
            Value::Array(arr) => Value::Array(arr),
            Value::Object(mut obj) => {
                match ["embeddings", "vectors", "data"]
                    .iter()
                    .find_map(|key| obj.remove(*key))
                {
                    Some(value) => value,
                    None => {
                        return Err(ProviderError::invalid_response(
                            texts,
                            "output missing 'embeddings' field",
                        ))
                    }
                }
            }
            _ => {
                return Err(ProviderError::invalid_response(
                    texts,
                    "output must be JSON array or object",
                ))
            }
        };

        serde_json::from_value::<Vec<Vec<f32>>>(embeddings_value)
            .map_err(|err| ProviderError::invalid_response(texts, err.to_string()))
    }
}

impl EmbeddingProvider for CommandProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let payload = serde_json::json!({
            "model": self.model,
            "texts": truncate_texts(texts, self.max_chars),
        });

        let parsed = run_json_command(&self.command, &payload, self.timeout).map_err(|err| {
            match err {
                CommandError::Timeout { timeout, .. } => ProviderError::timeout(texts, timeout),
                CommandError::InvalidOutput { message, .. } => {
                    ProviderError::invalid_response(texts, message)
                }
                other => ProviderError::upstream(texts, other.to_string()),
            }
        })?;

        Self::parse_vectors(texts, parsed)
    }
}

/// Deterministic feature-hashing provider.
///
/// Lowercased alphanumeric tokens are hashed with blake3 into a fixed number
/// of signed buckets. Identical texts map to identical vectors and texts with
/// shared words get positive similarity, without any model download.
pub struct HashProvider {
    model: String,
    dimension: usize,
    batch_size: usize,
}

impl HashProvider {
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            model: format!("hash-{}", dimension),
            dimension,
            batch_size: 1024,
        }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            let hash = blake3::hash(token.as_bytes());
            let bytes = hash.as_bytes();
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&bytes[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        vector
    }
}

impl EmbeddingProvider for HashProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

/// Dummy provider that returns zero vectors (for diagnostics).
pub struct DummyProvider {
    model: String,
    dimension: usize,
    batch_size: usize,
}

impl DummyProvider {
    /// Creates a new dummy provider with specified dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            model: "dummy".to_string(),
            dimension,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl EmbeddingProvider for DummyProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|_| vec![0.0; self.dimension]).collect())
    }
}

/// Builds the provider selected in the configuration.
pub fn create_provider(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>, ProviderError> {
    let provider: Arc<dyn EmbeddingProvider> = match config.provider() {
        #[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
        EmbeddingProviderType::Builtin => {
            let mut builtin = EmbeddingProviderConfig::from_env()?;
            if !EmbeddingProviderConfig::has_env_overrides() {
                if let Some(batch_size) = config.batch_size {
                    builtin.batch_size = batch_size.clamp(1, MAX_FASTEMBED_BATCH_SIZE);
                }
                if let Some(max_chars) = config.max_chars.filter(|&n| n > 0) {
                    builtin.max_chars = max_chars;
                }
            }
            Arc::new(FastEmbedder::new(builtin)?)
        }
        #[cfg(all(target_os = "macos", target_arch = "x86_64"))]
        EmbeddingProviderType::Builtin => {
            return Err(ProviderError::init(
                "the builtin provider is not available on this platform",
            ))
        }
        EmbeddingProviderType::Http => Arc::new(HttpProvider::new(config)?),
        EmbeddingProviderType::Command => Arc::new(CommandProvider::from_config(config)),
        EmbeddingProviderType::Hash => Arc::new(HashProvider::new(config.dimension())),
        EmbeddingProviderType::Dummy => Arc::new(DummyProvider::new(config.dimension())),
    };
    debug!(model = provider.model_id(), "embedding provider ready");
    Ok(provider)
}

pub(super) fn truncate_texts<'a>(texts: &'a [String], max_chars: usize) -> Vec<Cow<'a, str>> {
    texts
        .iter()
        .map(|text| truncate_to_chars(text.as_str(), max_chars))
        .collect()
}

fn truncate_to_chars(input: &str, max_chars: usize) -> Cow<'_, str> {
    if max_chars == 0 {
        return Cow::Borrowed("");
    }

    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => Cow::Owned(input[..idx].to_string()),
        None => Cow::Borrowed(input),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;
    use crate::testutil::StubServer;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_dummy_provider() {
        let provider = DummyProvider::new(384);
        assert_eq!(provider.model_id(), "dummy");

        let result = provider.embed_texts(&texts(&["hello", "world"])).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].len(), 384);
        assert!(result[0].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_empty_embed_is_error() {
        let provider = DummyProvider::new(8);
        let err = provider.embed_texts(&[]).unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::EmptyInput);
    }

    #[test]
    fn test_batch_limit() {
        let provider = DummyProvider::new(4);
        let many: Vec<String> = (0..provider.batch_size() + 1).map(|i| i.to_string()).collect();
        let err = provider.embed_texts(&many).unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::BatchTooLarge);
        assert_eq!(err.count, many.len());
        assert_eq!(err.sample, "0");
    }

    #[test]
    fn test_hash_provider_is_normalized_and_deterministic() {
        let provider = HashProvider::new(128);
        let vectors = provider
            .embed_texts(&texts(&["Python developer", "python Developer", "Kubernetes"]))
            .unwrap();

        for v in &vectors {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
        }
        assert!((cosine_similarity(&vectors[0], &vectors[1]) - 1.0).abs() < 1e-5);
        assert_eq!(provider.embed_one("Kubernetes").unwrap(), vectors[2]);
    }

    #[test]
    fn test_hash_provider_shared_words() {
        let provider = HashProvider::new(512);
        let a = provider.embed_one("data scientist python").unwrap();
        let b = provider.embed_one("python").unwrap();
        let sim = cosine_similarity(&a, &b);
        assert!(sim > 0.3 && sim < 0.9, "{}", sim);
    }

    #[test]
    fn test_truncate_to_chars() {
        let input = "hello";
        assert_eq!(
            truncate_to_chars(input, 2),
            Cow::<str>::Owned("he".to_string())
        );
        assert_eq!(truncate_to_chars(input, 5), Cow::Borrowed(input));
        assert_eq!(truncate_to_chars("héllo", 2), Cow::<str>::Owned("hé".to_string()));
    }

    #[test]
    fn test_http_provider_unreachable_is_upstream() {
        let config = EmbeddingConfig {
            base_url: Some("http://127.0.0.1:9/v1/".into()),
            api_key_env: Some("RAGMATCH_TEST_UNSET_KEY".into()),
            timeout_ms: Some(2_000),
            ..Default::default()
        };
        let provider = HttpProvider::new(&config).unwrap();
        assert_eq!(provider.model_id(), "text-embedding-3-small");

        let err = provider.embed_one("Python").unwrap_err();
        assert!(matches!(
            err.kind,
            ProviderErrorKind::Upstream | ProviderErrorKind::Timeout
        ));
        assert_eq!(err.count, 1);
    }

    fn http_provider(base_url: &str, key_env: &str) -> HttpProvider {
        let config = EmbeddingConfig {
            base_url: Some(base_url.to_string()),
            api_key_env: Some(key_env.to_string()),
            model: Some("test-model".into()),
            timeout_ms: Some(5_000),
            ..Default::default()
        };
        HttpProvider::new(&config).unwrap()
    }

    #[test]
    fn test_http_provider_orders_by_index() {
        let server = StubServer::start(|_| {
            (
                200,
                r#"{"data": [
                    {"index": 1, "embedding": [0.0, 2.0]},
                    {"index": 0, "embedding": [3.0, 4.0]}
                ]}"#
                .to_string(),
            )
        });
        std::env::set_var("RAGMATCH_TEST_HTTP_PROVIDER_KEY", "sk-test");
        let provider = http_provider(
            &format!("{}/v1/", server.url()),
            "RAGMATCH_TEST_HTTP_PROVIDER_KEY",
        );

        let vectors = provider.embed_texts(&texts(&["first", "second"])).unwrap();
        assert!((vectors[0][0] - 0.6).abs() < 1e-6);
        assert!((vectors[0][1] - 0.8).abs() < 1e-6);
        assert!((vectors[1][1] - 1.0).abs() < 1e-6);

        let requests = server.requests();
        assert!(requests[0].request_line.starts_with("POST /v1/embeddings "));
        assert_eq!(requests[0].header("authorization"), Some("Bearer sk-test"));
        let body: Value = serde_json::from_str(&requests[0].body).unwrap();
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["input"], serde_json::json!(["first", "second"]));
    }

    #[test]
    fn test_http_provider_error_status_is_upstream() {
        let server =
            StubServer::start(|_| (429, r#"{"error": "rate limited"}"#.to_string()));
        let provider = http_provider(server.url(), "RAGMATCH_TEST_UNSET_KEY");

        let err = provider.embed_one("Python").unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Upstream);
        assert!(err.message.contains("rate limited"), "{}", err.message);
        assert!(server.requests()[0].header("authorization").is_none());
    }

    #[test]
    fn test_http_provider_count_mismatch() {
        let server = StubServer::start(|_| {
            (200, r#"{"data": [{"index": 0, "embedding": [1.0]}]}"#.to_string())
        });
        let provider = http_provider(server.url(), "RAGMATCH_TEST_UNSET_KEY");

        let err = provider.embed_texts(&texts(&["a", "b"])).unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::InvalidResponse);
    }

    #[test]
    fn test_zero_vector_stays_zero() {
        let provider = HashProvider::new(16);
        let vector = provider.embed_one("++").unwrap();
        assert!(vector.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_command_output_shapes() {
        let input = texts(&["a"]);
        let bare = serde_json::json!([[3.0, 4.0]]);
        assert_eq!(
            CommandProvider::parse_vectors(&input, bare).unwrap(),
            vec![vec![3.0, 4.0]]
        );

        let wrapped = serde_json::json!({"vectors": [[1.0]]});
        assert_eq!(
            CommandProvider::parse_vectors(&input, wrapped).unwrap(),
            vec![vec![1.0]]
        );

        let bad = serde_json::json!({"nothing": []});
        assert_eq!(
            CommandProvider::parse_vectors(&input, bad).unwrap_err().kind,
            ProviderErrorKind::InvalidResponse
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_command_provider_normalizes() {
        let provider = CommandProvider::new(
            "cat > /dev/null; echo '{\"embeddings\": [[3.0, 4.0], [0.0, 2.0]]}'".into(),
            "test".into(),
        );
        let vectors = provider.embed_texts(&texts(&["a", "b"])).unwrap();
        assert!((vectors[0][0] - 0.6).abs() < 1e-6);
        assert!((vectors[1][1] - 1.0).abs() < 1e-6);
    }

    #[cfg(unix)]
    #[test]
    fn test_command_provider_count_mismatch() {
        let provider = CommandProvider::new(
            "cat > /dev/null; echo '[[1.0]]'".into(),
            "test".into(),
        );
        let err = provider.embed_texts(&texts(&["a", "b"])).unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::InvalidResponse);
        assert_eq!(err.count, 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_command_provider_failure_is_upstream() {
        let provider = CommandProvider::new("cat > /dev/null; exit 2".into(), "test".into());
        let err = provider.embed_one("hello").unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Upstream);
        assert_eq!(err.sample, "hello");
    }
}
