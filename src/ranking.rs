// SPDX-License-Identifier: MIT OR Apache-2.0

//! Corpus ranking strategies.
//!
//! [`IndexRanker`] delegates nearest-neighbour search to a [`VectorIndex`];
//! [`ScanRanker`] scores a bounded corpus scan by brute-force cosine
//! similarity. [`Retriever`] picks the index when its capability probe passes
//! and falls back to the scan whenever the index fails.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::corpus::CorpusStore;
use crate::embedding::cosine_similarity;
use crate::errors::IndexUnavailable;
use crate::index::VectorIndex;

/// Document fields surfaced to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub text_chunk: String,
}

/// A document scored against one query.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedResult {
    pub document: Document,
    /// Cosine similarity to the query (-1.0 to 1.0)
    pub similarity: f32,
}

/// Stable descending sort; equal scores keep their incoming order.
pub fn sort_by_similarity(results: &mut [RankedResult]) {
    results.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// A strategy that ranks the corpus against a query vector.
pub trait Ranker: Send + Sync {
    fn name(&self) -> &str;

    /// Returns at most `k` results with similarity >= `threshold`, best first.
    fn rank(
        &self,
        query: &[f32],
        k: usize,
        threshold: f32,
    ) -> Result<Vec<RankedResult>, IndexUnavailable>;
}

/// Brute-force cosine ranking over a bounded corpus scan.
pub struct ScanRanker {
    corpus: Arc<dyn CorpusStore>,
    scan_limit: usize,
}

impl ScanRanker {
    pub fn new(corpus: Arc<dyn CorpusStore>, scan_limit: usize) -> Self {
        Self { corpus, scan_limit }
    }

    /// Ranks without a fallible signature; the scan path never fails.
    pub fn rank_scan(&self, query: &[f32], k: usize, threshold: f32) -> Vec<RankedResult> {
        if query.is_empty() || k == 0 {
            return Vec::new();
        }

        let rows = match self.corpus.scan(self.scan_limit) {
            Ok(rows) => rows,
            Err(err) => {
                warn!("Corpus scan failed, returning no results: {:#}", err);
                return Vec::new();
            }
        };

        let mut results: Vec<RankedResult> = rows
            .into_iter()
            .filter_map(|row| match row.embedding.decode_with_dim(query.len()) {
                Ok(embedding) => {
                    let similarity = cosine_similarity(query, &embedding);
                    (similarity >= threshold).then(|| RankedResult {
                        document: Document {
                            id: row.id,
                            title: row.title,
                            text_chunk: row.text_chunk,
                        },
                        similarity,
                    })
                }
                Err(err) => {
                    debug!(doc_id = %row.id, "Skipping document: {}", err);
                    None
                }
            })
            .collect();

        sort_by_similarity(&mut results);
        results.truncate(k);
        results
    }
}

impl Ranker for ScanRanker {
    fn name(&self) -> &str {
        "scan"
    }

    fn rank(
        &self,
        query: &[f32],
        k: usize,
        threshold: f32,
    ) -> Result<Vec<RankedResult>, IndexUnavailable> {
        Ok(self.rank_scan(query, k, threshold))
    }
}

/// Ranking through a vector index, hydrated from the corpus.
pub struct IndexRanker {
    index: Box<dyn VectorIndex>,
    corpus: Arc<dyn CorpusStore>,
}

impl IndexRanker {
    pub fn new(index: Box<dyn VectorIndex>, corpus: Arc<dyn CorpusStore>) -> Self {
        Self { index, corpus }
    }
}

impl Ranker for IndexRanker {
    fn name(&self) -> &str {
        self.index.name()
    }

    fn rank(
        &self,
        query: &[f32],
        k: usize,
        threshold: f32,
    ) -> Result<Vec<RankedResult>, IndexUnavailable> {
        let hits = self.index.search(query, k, threshold)?;
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = hits.iter().map(|hit| hit.id.clone()).collect();
        let mut rows: HashMap<String, Document> = self
            .corpus
            .fetch_by_ids(&ids)
            .map_err(|err| IndexUnavailable::Backend(format!("hydrating hits: {:#}", err)))?
            .into_iter()
            .map(|row| {
                (
                    row.id.clone(),
                    Document {
                        id: row.id,
                        title: row.title,
                        text_chunk: row.text_chunk,
                    },
                )
            })
            .collect();

        let mut results: Vec<RankedResult> = hits
            .into_iter()
            .filter(|hit| hit.similarity.is_finite() && hit.similarity >= threshold)
            .filter_map(|hit| match rows.remove(&hit.id) {
                Some(document) => Some(RankedResult {
                    document,
                    similarity: hit.similarity,
                }),
                None => {
                    debug!(doc_id = %hit.id, "Index hit not found in corpus");
                    None
                }
            })
            .collect();

        sort_by_similarity(&mut results);
        results.truncate(k);
        Ok(results)
    }
}

/// Ranking front-end with index-or-scan strategy selection.
pub struct Retriever {
    primary: Option<IndexRanker>,
    fallback: ScanRanker,
}

impl Retriever {
    /// Selects the index strategy when `index` is present and its probe passes.
    pub fn select(
        index: Option<Box<dyn VectorIndex>>,
        corpus: Arc<dyn CorpusStore>,
        scan_limit: usize,
    ) -> Self {
        let primary = index.and_then(|index| match index.probe() {
            Ok(()) => {
                debug!(backend = index.name(), "Using vector index");
                Some(IndexRanker::new(index, Arc::clone(&corpus)))
            }
            Err(err) => {
                warn!(
                    backend = index.name(),
                    "Vector index unavailable, using scan ranking: {}", err
                );
                None
            }
        });

        Self {
            primary,
            fallback: ScanRanker::new(corpus, scan_limit),
        }
    }

    /// Scan-only retriever.
    pub fn scan_only(corpus: Arc<dyn CorpusStore>, scan_limit: usize) -> Self {
        Self::select(None, corpus, scan_limit)
    }

    /// Name of the selected primary strategy.
    pub fn strategy(&self) -> &str {
        match &self.primary {
            Some(index) => index.name(),
            None => self.fallback.name(),
        }
    }

    /// Ranks with the index when selected, otherwise (or on failure) by scan.
    pub fn rank(&self, query: &[f32], k: usize, threshold: f32) -> Vec<RankedResult> {
        if let Some(primary) = &self.primary {
            match primary.rank(query, k, threshold) {
                Ok(results) if !results.is_empty() => return results,
                Ok(_) => debug!("Vector index returned no hits, scanning corpus"),
                Err(err) => warn!("Vector index search failed, scanning corpus: {}", err),
            }
        }
        self.fallback.rank_scan(query, k, threshold)
    }
}
