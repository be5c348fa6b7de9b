// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration file support for ragmatch
//!
//! Loads configuration from .ragmatchrc.toml in the corpus root or current
//! directory, or ~/.config/ragmatch/config.toml

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::expand::ExpansionRule;

/// Minimum similarity for a document to count as relevant to a query.
pub const RELEVANCE_THRESHOLD: f32 = 0.3;
/// Minimum similarity for two skills to count as equivalent.
pub const SKILL_MATCH_THRESHOLD: f32 = 0.7;
/// Upper bound on documents scored by the brute-force fallback.
pub const FALLBACK_SCAN_LIMIT: usize = 100;
/// Number of passages returned when the caller does not ask for a count.
pub const DEFAULT_TOP_K: usize = 5;

const CONFIG_FILE: &str = ".ragmatchrc.toml";

/// Embedding provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderType {
    /// OpenAI-compatible embeddings endpoint
    #[default]
    Http,
    /// Local fastembed model
    Builtin,
    /// External process speaking JSON over stdio
    Command,
    /// Deterministic feature hashing, no model required
    Hash,
    Dummy,
}

/// Vector index backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackendType {
    #[default]
    Off,
    Command,
    Http,
}

/// Embedding configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider type (http, builtin, command, hash, dummy)
    pub provider: Option<EmbeddingProviderType>,
    /// Model identifier for the embedding provider
    pub model: Option<String>,
    /// Command to execute for command provider
    pub command: Option<String>,
    /// Base URL for the http provider
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key
    pub api_key_env: Option<String>,
    /// Maximum number of texts per provider call
    pub batch_size: Option<usize>,
    /// Texts are truncated to this many characters before embedding
    pub max_chars: Option<usize>,
    /// Vector dimension for the hash and dummy providers
    pub dimension: Option<usize>,
    /// Per-call timeout in milliseconds
    pub timeout_ms: Option<u64>,
}

impl EmbeddingConfig {
    /// Get provider type (defaults to Http)
    pub fn provider(&self) -> EmbeddingProviderType {
        self.provider.unwrap_or_default()
    }

    /// Get model identifier (defaults to "text-embedding-3-small")
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or("text-embedding-3-small")
    }

    /// Get command (defaults to "embedder")
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or("embedder")
    }

    /// Get base URL (defaults to the OpenAI API)
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or("https://api.openai.com/v1")
    }

    /// Get API key variable name (defaults to OPENAI_API_KEY)
    pub fn api_key_env(&self) -> &str {
        self.api_key_env.as_deref().unwrap_or("OPENAI_API_KEY")
    }

    /// Get batch size (defaults to 64)
    pub fn batch_size(&self) -> usize {
        self.batch_size.filter(|&n| n > 0).unwrap_or(64)
    }

    /// Get max chars (defaults to 8000)
    pub fn max_chars(&self) -> usize {
        self.max_chars.filter(|&n| n > 0).unwrap_or(8000)
    }

    /// Get dimension for hash/dummy providers (defaults to 256)
    pub fn dimension(&self) -> usize {
        self.dimension.filter(|&n| n > 0).unwrap_or(256)
    }

    /// Get timeout in milliseconds (defaults to 30000)
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms.unwrap_or(30_000)
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Default number of passages to return
    pub top_k: Option<usize>,
    /// Minimum similarity for a passage to be returned
    pub relevance_threshold: Option<f32>,
    /// Maximum number of documents scanned by the fallback ranker
    pub scan_limit: Option<usize>,
    /// Optional vector index backend (off, command, http)
    pub index: Option<IndexBackendType>,
    /// Command for the command index backend
    pub index_command: Option<String>,
    /// URL for the http index backend
    pub index_url: Option<String>,
    /// Name of the environment variable holding the index API key
    pub index_api_key_env: Option<String>,
    /// Per-call index timeout in milliseconds
    pub index_timeout_ms: Option<u64>,
}

impl RetrievalConfig {
    /// Get top k (defaults to 5)
    pub fn top_k(&self) -> usize {
        self.top_k.unwrap_or(DEFAULT_TOP_K)
    }

    /// Get relevance threshold (defaults to 0.3)
    pub fn relevance_threshold(&self) -> f32 {
        self.relevance_threshold.unwrap_or(RELEVANCE_THRESHOLD)
    }

    /// Get scan limit (defaults to 100)
    pub fn scan_limit(&self) -> usize {
        self.scan_limit.filter(|&n| n > 0).unwrap_or(FALLBACK_SCAN_LIMIT)
    }

    /// Get index backend (defaults to Off)
    pub fn index(&self) -> IndexBackendType {
        self.index.unwrap_or_default()
    }

    /// Get index timeout in milliseconds (defaults to 5000)
    pub fn index_timeout_ms(&self) -> u64 {
        self.index_timeout_ms.unwrap_or(5_000)
    }
}

/// Skill matching configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Similarity required for a skill match
    pub threshold: Option<f32>,
}

impl MatchingConfig {
    /// Get match threshold (defaults to 0.7)
    pub fn threshold(&self) -> f32 {
        self.threshold.unwrap_or(SKILL_MATCH_THRESHOLD)
    }
}

/// Query expansion configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExpansionConfig {
    /// Whether query variants are generated
    pub enabled: Option<bool>,
    /// Replacement pairs, applied whole-word
    pub synonyms: Option<Vec<(String, String)>>,
    /// Generic words dropped from the query
    pub filler: Option<Vec<String>>,
}

impl ExpansionConfig {
    /// Get enabled (defaults to true)
    pub fn enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// Build the rule table, using built-in rules for unset lists
    pub fn rules(&self) -> Vec<ExpansionRule> {
        if !self.enabled() {
            return Vec::new();
        }
        if self.synonyms.is_none() && self.filler.is_none() {
            return ExpansionRule::defaults();
        }

        let mut rules = Vec::new();
        for (from, to) in self.synonyms.iter().flatten() {
            rules.push(ExpansionRule::Synonym {
                from: from.clone(),
                to: to.clone(),
            });
        }
        for word in self.filler.iter().flatten() {
            rules.push(ExpansionRule::Filler { word: word.clone() });
        }
        rules
    }
}

/// Configuration loaded from .ragmatchrc.toml or ~/.config/ragmatch/config.toml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Embedding configuration
    #[serde(default)]
    pub embeddings: EmbeddingConfig,

    /// Retrieval configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Skill matching configuration
    #[serde(default)]
    pub matching: MatchingConfig,

    /// Query expansion configuration
    #[serde(default)]
    pub expansion: ExpansionConfig,
}

impl Config {
    /// Load configuration relative to a corpus root
    ///
    /// Precedence (highest to lowest):
    /// 1. .ragmatchrc.toml in `dir`
    /// 2. ~/.config/ragmatch/config.toml
    pub fn load_for_dir(dir: &Path) -> Self {
        if let Some(config) = Self::load_from_path(&dir.join(CONFIG_FILE)) {
            return config;
        }
        Self::load_global().unwrap_or_default()
    }

    fn load_global() -> Option<Self> {
        let home = dirs::home_dir()?;
        let config_path = home.join(".config").join("ragmatch").join("config.toml");
        Self::load_from_path(&config_path)
    }

    fn load_from_path(path: &PathBuf) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match toml::from_str(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Get the embedding configuration
    pub fn embeddings(&self) -> &EmbeddingConfig {
        &self.embeddings
    }

    /// Get the retrieval configuration
    pub fn retrieval(&self) -> &RetrievalConfig {
        &self.retrieval
    }

    /// Get the matching configuration
    pub fn matching(&self) -> &MatchingConfig {
        &self.matching
    }

    /// Merge CLI options with config (CLI wins)
    pub fn merge_top_k(&self, cli_value: Option<usize>) -> usize {
        cli_value.unwrap_or_else(|| self.retrieval.top_k())
    }

    /// Merge CLI threshold with config (CLI wins)
    pub fn merge_match_threshold(&self, cli_value: Option<f32>) -> f32 {
        cli_value.unwrap_or_else(|| self.matching.threshold())
    }
}
