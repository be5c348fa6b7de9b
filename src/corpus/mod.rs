// SPDX-License-Identifier: MIT OR Apache-2.0

//! Corpus module - read access to the knowledge documents
//!
//! The engine never mutates the corpus. It performs bounded scans for the
//! fallback ranker and id lookups to hydrate vector index hits.

pub mod storage;

use anyhow::Result;

use crate::errors::MalformedEmbedding;

pub use storage::{CorpusStorage, DocumentInput};

/// A document embedding as it was stored.
///
/// Stores may hold vectors natively, as a serialized textual array
/// (`[0.1, 0.2]`, `{0.1,0.2}`, `(0.1, 0.2)`) or as little-endian `f32` bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredEmbedding {
    Native(Vec<f32>),
    Text(String),
    Blob(Vec<u8>),
    Missing,
}

impl StoredEmbedding {
    /// Decode into a vector.
    pub fn decode(&self) -> Result<Vec<f32>, MalformedEmbedding> {
        let vector = match self {
            StoredEmbedding::Native(values) => values.clone(),
            StoredEmbedding::Text(text) => parse_text_vector(text)?,
            StoredEmbedding::Blob(bytes) => blob_to_vector(bytes)?,
            StoredEmbedding::Missing => return Err(MalformedEmbedding::Missing),
        };

        if vector.is_empty() {
            return Err(MalformedEmbedding::Missing);
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(MalformedEmbedding::Unparseable(
                "non-finite component".to_string(),
            ));
        }
        Ok(vector)
    }

    /// Decode and check the dimension against the query vector.
    pub fn decode_with_dim(&self, expected: usize) -> Result<Vec<f32>, MalformedEmbedding> {
        let vector = self.decode()?;
        if vector.len() != expected {
            return Err(MalformedEmbedding::DimensionMismatch {
                expected,
                found: vector.len(),
            });
        }
        Ok(vector)
    }

    /// Compact little-endian encoding used for new rows.
    pub fn to_blob(vector: &[f32]) -> Vec<u8> {
        vector.iter().flat_map(|f| f.to_le_bytes()).collect()
    }
}

fn parse_text_vector(text: &str) -> Result<Vec<f32>, MalformedEmbedding> {
    let trimmed = text.trim();
    let inner = strip_brackets(trimmed)
        .ok_or_else(|| MalformedEmbedding::Unparseable(preview(trimmed)))?;

    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    inner
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .map_err(|_| MalformedEmbedding::Unparseable(preview(trimmed)))
        })
        .collect()
}

fn strip_brackets(text: &str) -> Option<&str> {
    let mut chars = text.chars();
    let open = chars.next()?;
    let close = chars.next_back()?;
    match (open, close) {
        ('[', ']') | ('{', '}') | ('(', ')') => Some(&text[1..text.len() - 1]),
        _ => None,
    }
}

fn blob_to_vector(bytes: &[u8]) -> Result<Vec<f32>, MalformedEmbedding> {
    if bytes.len() % 4 != 0 {
        return Err(MalformedEmbedding::Unparseable(format!(
            "blob length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn preview(text: &str) -> String {
    text.chars().take(32).collect()
}

/// A corpus row as returned by a store.
#[derive(Debug, Clone)]
pub struct CorpusRow {
    pub id: String,
    pub title: String,
    pub text_chunk: String,
    pub embedding: StoredEmbedding,
}

/// Read-only corpus access.
pub trait CorpusStore: Send + Sync {
    /// Returns at most `limit` rows in a stable fetch order.
    fn scan(&self, limit: usize) -> Result<Vec<CorpusRow>>;

    /// Returns the rows with the given ids. Unknown ids are ignored.
    fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<CorpusRow>>;
}

/// Corpus held entirely in memory, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryCorpus {
    rows: Vec<CorpusRow>,
}

impl MemoryCorpus {
    pub fn new(rows: Vec<CorpusRow>) -> Self {
        Self { rows }
    }
}

impl CorpusStore for MemoryCorpus {
    fn scan(&self, limit: usize) -> Result<Vec<CorpusRow>> {
        Ok(self.rows.iter().take(limit).cloned().collect())
    }

    fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<CorpusRow>> {
        Ok(self
            .rows
            .iter()
            .filter(|row| ids.contains(&row.id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_encodings() {
        let expected = vec![0.25, -0.5, 1.0];
        let encodings = [
            StoredEmbedding::Native(expected.clone()),
            StoredEmbedding::Text("[0.25, -0.5, 1.0]".into()),
            StoredEmbedding::Text("{0.25,-0.5,1}".into()),
            StoredEmbedding::Text(" (0.25, -5e-1, 1.0) ".into()),
            StoredEmbedding::Blob(StoredEmbedding::to_blob(&expected)),
        ];
        for encoding in encodings {
            assert_eq!(encoding.decode().unwrap(), expected, "{:?}", encoding);
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        for text in ["not a vector", "[0.1, abc]", "[0.1, 0.2", "[]", "[nan, 1.0]"] {
            assert!(
                StoredEmbedding::Text(text.into()).decode().is_err(),
                "{text}"
            );
        }
        assert!(StoredEmbedding::Blob(vec![0, 1, 2]).decode().is_err());
        assert_eq!(
            StoredEmbedding::Missing.decode(),
            Err(MalformedEmbedding::Missing)
        );
    }

    #[test]
    fn test_decode_with_dim() {
        let stored = StoredEmbedding::Native(vec![1.0, 0.0]);
        assert!(stored.decode_with_dim(2).is_ok());
        assert_eq!(
            stored.decode_with_dim(3),
            Err(MalformedEmbedding::DimensionMismatch {
                expected: 3,
                found: 2
            })
        );
    }

    #[test]
    fn test_memory_corpus() {
        let corpus = MemoryCorpus::new(
            (0..5)
                .map(|i| CorpusRow {
                    id: format!("d{i}"),
                    title: format!("Doc {i}"),
                    text_chunk: String::new(),
                    embedding: StoredEmbedding::Missing,
                })
                .collect(),
        );
        assert_eq!(corpus.scan(usize::MAX).unwrap().len(), 5);

        let scanned = corpus.scan(3).unwrap();
        let ids: Vec<&str> = scanned.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["d0", "d1", "d2"]);

        let fetched = corpus
            .fetch_by_ids(&["d4".to_string(), "nope".to_string()])
            .unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].title, "Doc 4");
    }
}
