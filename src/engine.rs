// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retrieval and skill-matching entry points.
//!
//! An [`Engine`] owns the ranking strategy and the query expander and borrows
//! the shared embedding provider. Query variants are embedded and ranked in
//! parallel on the rayon pool; the per-variant lists are merged once all of
//! them have finished.

use anyhow::Result;
use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::Config;
use crate::corpus::CorpusStore;
use crate::embedding::{cosine_similarity, SharedProvider};
use crate::errors::ProviderError;
use crate::expand::{merge_ranked, QueryExpander};
use crate::index::create_index;
use crate::matcher::{self, MatchResult, Skill};
use crate::ranking::{RankedResult, Retriever};

/// A retrieved corpus passage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Passage {
    pub id: String,
    pub title: String,
    pub text_chunk: String,
    pub similarity: f32,
}

impl From<RankedResult> for Passage {
    fn from(result: RankedResult) -> Self {
        Self {
            id: result.document.id,
            title: result.document.title,
            text_chunk: result.document.text_chunk,
            similarity: result.similarity,
        }
    }
}

/// Tunables resolved from configuration.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub relevance_threshold: f32,
    pub match_threshold: f32,
}

impl EngineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            relevance_threshold: config.retrieval().relevance_threshold(),
            match_threshold: config.matching().threshold(),
        }
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

pub struct Engine {
    provider: Arc<SharedProvider>,
    retriever: Retriever,
    expander: QueryExpander,
    options: EngineOptions,
}

impl Engine {
    pub fn new(
        provider: Arc<SharedProvider>,
        retriever: Retriever,
        expander: QueryExpander,
        options: EngineOptions,
    ) -> Self {
        Self {
            provider,
            retriever,
            expander,
            options,
        }
    }

    /// Builds an engine over `corpus`, probing the configured index backend.
    pub fn from_config(
        config: &Config,
        provider: Arc<SharedProvider>,
        corpus: Arc<dyn CorpusStore>,
    ) -> Result<Self> {
        let index = match create_index(config.retrieval()) {
            Ok(index) => index,
            Err(err) => {
                warn!("Vector index misconfigured, using scan ranking: {}", err);
                None
            }
        };
        let retriever = Retriever::select(index, corpus, config.retrieval().scan_limit());
        let expander = QueryExpander::new(&config.expansion.rules())?;

        Ok(Self::new(
            provider,
            retriever,
            expander,
            EngineOptions::from_config(config),
        ))
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Name of the ranking strategy selected at construction.
    pub fn strategy(&self) -> &str {
        self.retriever.strategy()
    }

    /// Returns up to `top_k` passages relevant to `query`, best first.
    ///
    /// A variant whose embedding fails is skipped. The call fails only when
    /// every variant fails, with the error of the first one.
    pub fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<Passage>, ProviderError> {
        let variants = self.expander.expand(query);
        if variants.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let provider = self.provider.get()?;
        let threshold = self.options.relevance_threshold;
        debug!(?variants, threshold, top_k, "retrieving");

        let outcomes: Vec<Result<Vec<RankedResult>, ProviderError>> = variants
            .par_iter()
            .map(|variant| {
                let vector = provider.embed_one(variant)?;
                Ok(self.retriever.rank(&vector, top_k, threshold))
            })
            .collect();

        let mut first_error = None;
        let mut per_variant = Vec::with_capacity(outcomes.len());
        for (variant, outcome) in variants.iter().zip(outcomes) {
            match outcome {
                Ok(results) => per_variant.push(results),
                Err(err) => {
                    warn!("Skipping query variant {:?}: {}", variant, err);
                    first_error.get_or_insert(err);
                }
            }
        }

        if per_variant.is_empty() {
            if let Some(err) = first_error {
                return Err(err);
            }
        }

        Ok(merge_ranked(per_variant, top_k)
            .into_iter()
            .map(Passage::from)
            .collect())
    }

    /// Embeds skill names in provider-sized batches.
    pub fn embed_skills(&self, names: &[String]) -> Result<Vec<Skill>, ProviderError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let provider = self.provider.get()?;
        let mut skills = Vec::with_capacity(names.len());
        for batch in names.chunks(provider.batch_size().max(1)) {
            let vectors = provider.embed_texts(batch)?;
            skills.extend(
                batch
                    .iter()
                    .zip(vectors)
                    .map(|(name, embedding)| Skill::new(name.clone(), embedding)),
            );
        }
        Ok(skills)
    }

    /// Matches user skills against job skills by name.
    ///
    /// `threshold` overrides the configured match threshold. An empty list on
    /// either side returns the neutral result without calling the provider.
    pub fn match_skills(
        &self,
        user_skills: &[String],
        job_skills: &[String],
        threshold: Option<f32>,
    ) -> Result<MatchResult, ProviderError> {
        if user_skills.is_empty() || job_skills.is_empty() {
            return Ok(MatchResult {
                missing: job_skills.to_vec(),
                ..MatchResult::default()
            });
        }

        let threshold = threshold.unwrap_or(self.options.match_threshold);
        let user = self.embed_skills(user_skills)?;
        let job = self.embed_skills(job_skills)?;
        Ok(matcher::match_skills(&user, &job, threshold))
    }

    /// Cosine similarity between a profile text and a job description.
    ///
    /// Returns `None` when either text is blank.
    pub fn profile_similarity(
        &self,
        profile_text: &str,
        job_description: &str,
    ) -> Result<Option<f32>, ProviderError> {
        if profile_text.trim().is_empty() || job_description.trim().is_empty() {
            return Ok(None);
        }

        let provider = self.provider.get()?;
        let profile = provider.embed_one(profile_text)?;
        let job = provider.embed_one(job_description)?;
        Ok(Some(cosine_similarity(&profile, &job)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{CorpusRow, MemoryCorpus, StoredEmbedding};
    use crate::embedding::EmbeddingProvider;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider that looks texts up in a table; unknown texts fail upstream.
    struct TableProvider {
        table: HashMap<String, Vec<f32>>,
        batch_size: usize,
        calls: AtomicUsize,
    }

    impl TableProvider {
        fn new(entries: &[(&str, Vec<f32>)]) -> Self {
            Self {
                table: entries
                    .iter()
                    .map(|(text, v)| (text.to_string(), v.clone()))
                    .collect(),
                batch_size: 16,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl EmbeddingProvider for TableProvider {
        fn model_id(&self) -> &str {
            "table"
        }

        fn batch_size(&self) -> usize {
            self.batch_size
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            texts
                .iter()
                .map(|text| {
                    self.table
                        .get(text)
                        .cloned()
                        .ok_or_else(|| ProviderError::upstream(texts, "unknown text"))
                })
                .collect()
        }
    }

    fn at(sim: f32) -> Vec<f32> {
        vec![sim, (1.0 - sim * sim).max(0.0).sqrt()]
    }

    fn row(id: &str, title: &str, embedding: Vec<f32>) -> CorpusRow {
        CorpusRow {
            id: id.to_string(),
            title: title.to_string(),
            text_chunk: format!("{} text", title),
            embedding: StoredEmbedding::Native(embedding),
        }
    }

    fn engine_with(provider: Arc<TableProvider>, rows: Vec<CorpusRow>) -> Engine {
        let corpus: Arc<dyn CorpusStore> = Arc::new(MemoryCorpus::new(rows));
        Engine::new(
            Arc::new(SharedProvider::preloaded(provider)),
            Retriever::scan_only(corpus, 100),
            QueryExpander::with_defaults(),
            EngineOptions::default(),
        )
    }

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_retrieve_filters_by_threshold() {
        let provider = Arc::new(TableProvider::new(&[("data role", vec![1.0, 0.0])]));
        let engine = engine_with(
            provider,
            vec![
                row("1", "Data Scientist", at(0.9)),
                row("2", "Software Engineer", at(0.2)),
            ],
        );

        let passages = engine.retrieve("data role", 5).unwrap();
        assert_eq!(passages.len(), 1);
        assert_eq!(passages[0].title, "Data Scientist");
        assert_eq!(passages[0].text_chunk, "Data Scientist text");
        assert!((passages[0].similarity - 0.9).abs() < 1e-5);
    }

    #[test]
    fn test_retrieve_skips_failed_variant() {
        // Variants: original, "Software Engineer career" (unknown, fails),
        // and "Software Engineering".
        let provider = Arc::new(TableProvider::new(&[
            ("Software Engineering career", vec![1.0, 0.0]),
            ("Software Engineering", vec![0.0, 1.0]),
        ]));
        let engine = engine_with(
            provider,
            vec![
                row("a", "Backend Engineer", vec![1.0, 0.0]),
                row("b", "Platform Engineer", vec![0.0, 1.0]),
            ],
        );

        let passages = engine.retrieve("Software Engineering career", 5).unwrap();
        let titles: Vec<&str> = passages.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["Backend Engineer", "Platform Engineer"]);
    }

    #[test]
    fn test_retrieve_fails_when_every_variant_fails() {
        let provider = Arc::new(TableProvider::new(&[]));
        let engine = engine_with(provider, vec![row("1", "Anything", vec![1.0, 0.0])]);

        let err = engine.retrieve("Engineering career", 5).unwrap_err();
        assert_eq!(err.sample, "Engineering career");
    }

    #[test]
    fn test_blank_query_is_empty_without_provider_call() {
        let provider = Arc::new(TableProvider::new(&[]));
        let engine = engine_with(Arc::clone(&provider), Vec::new());
        assert!(engine.retrieve("   ", 5).unwrap().is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_retrieve_is_deterministic_and_deduplicated() {
        let provider = Arc::new(TableProvider::new(&[
            ("Engineer", vec![1.0, 0.0]),
            ("Engineering", at(0.95)),
        ]));
        let engine = engine_with(
            provider,
            vec![
                row("1", "Engineer", at(0.8)),
                row("2", "Engineer", at(0.7)),
                row("3", "Analyst", at(0.6)),
                row("4", "Designer", at(0.5)),
            ],
        );

        let first = engine.retrieve("Engineer", 3).unwrap();
        let second = engine.retrieve("Engineer", 3).unwrap();
        assert_eq!(first, second);

        // Both variants rank the two "Engineer" rows in their top 3; only the
        // first one survives the merge.
        let titles: Vec<&str> = first.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["Engineer", "Analyst"]);
        assert_eq!(first[0].id, "1");
    }

    #[test]
    fn test_match_skills_scenario() {
        let provider = Arc::new(TableProvider::new(&[
            ("Python", vec![1.0, 0.0]),
            ("SQL", at(0.1)),
        ]));
        let engine = engine_with(provider, Vec::new());

        let result = engine
            .match_skills(&names(&["Python"]), &names(&["Python", "SQL"]), None)
            .unwrap();
        assert_eq!(result.matched.len(), 1);
        assert_eq!(result.matched[0].job_skill, "Python");
        assert_eq!(result.missing, names(&["SQL"]));

        let strict = engine
            .match_skills(&names(&["SQL"]), &names(&["Python"]), Some(0.05))
            .unwrap();
        assert_eq!(strict.matched_user_skills, names(&["SQL"]));
    }

    #[test]
    fn test_match_skills_empty_user_list_skips_provider() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let shared = Arc::new(SharedProvider::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::init("should not be built"))
        }));
        let engine = Engine::new(
            Arc::clone(&shared),
            Retriever::scan_only(Arc::new(MemoryCorpus::default()), 100),
            QueryExpander::disabled(),
            EngineOptions::default(),
        );

        let result = engine
            .match_skills(&[], &names(&["Go", "SQL"]), None)
            .unwrap();
        assert!(result.matched.is_empty());
        assert_eq!(result.missing, names(&["Go", "SQL"]));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_embed_skills_respects_batch_size() {
        let mut provider = TableProvider::new(&[
            ("a", vec![1.0]),
            ("b", vec![1.0]),
            ("c", vec![1.0]),
            ("d", vec![1.0]),
            ("e", vec![1.0]),
        ]);
        provider.batch_size = 2;
        let provider = Arc::new(provider);
        let engine = engine_with(Arc::clone(&provider), Vec::new());

        let skills = engine.embed_skills(&names(&["a", "b", "c", "d", "e"])).unwrap();
        assert_eq!(skills.len(), 5);
        assert_eq!(skills[4].name, "e");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_profile_similarity() {
        let provider = Arc::new(TableProvider::new(&[
            ("Skills: Rust", vec![1.0, 0.0]),
            ("Rust developer", at(0.6)),
        ]));
        let engine = engine_with(provider, Vec::new());

        let sim = engine
            .profile_similarity("Skills: Rust", "Rust developer")
            .unwrap()
            .unwrap();
        assert!((sim - 0.6).abs() < 1e-5);
        assert_eq!(engine.profile_similarity("", "Rust developer").unwrap(), None);
    }
}
