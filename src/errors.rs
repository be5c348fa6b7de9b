// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types shared across the engine.
//!
//! Only [`ProviderError`] ever reaches callers of the engine. The other types
//! are recovered locally: an [`IndexUnavailable`] switches ranking to the scan
//! path and a [`MalformedEmbedding`] drops a single document.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Maximum number of characters kept in a [`ProviderError`] sample.
const SAMPLE_MAX_CHARS: usize = 80;

/// Category of an embedding provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// No texts were supplied.
    EmptyInput,
    /// More texts than the provider accepts in a single call.
    BatchTooLarge,
    /// The backend could not be constructed.
    Init,
    /// The backend was reached but rejected or failed the request.
    Upstream,
    /// The backend did not answer within the configured timeout.
    Timeout,
    /// The backend answered with something that is not one vector per text.
    InvalidResponse,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProviderErrorKind::EmptyInput => "empty input",
            ProviderErrorKind::BatchTooLarge => "batch too large",
            ProviderErrorKind::Init => "init",
            ProviderErrorKind::Upstream => "upstream",
            ProviderErrorKind::Timeout => "timeout",
            ProviderErrorKind::InvalidResponse => "invalid response",
        };
        f.write_str(label)
    }
}

/// The embedding backend could not produce vectors for a batch.
#[derive(Debug, Clone, Error)]
#[error("embedding provider error ({kind}) for {count} text(s), sample {sample:?}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    /// Number of texts in the failed batch
    pub count: usize,
    /// First text of the batch, truncated
    pub sample: String,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, texts: &[String], message: impl Into<String>) -> Self {
        Self {
            kind,
            count: texts.len(),
            sample: texts
                .first()
                .map(|text| truncate_sample(text))
                .unwrap_or_default(),
            message: message.into(),
        }
    }

    pub fn empty_input() -> Self {
        Self::new(ProviderErrorKind::EmptyInput, &[], "no texts to embed")
    }

    pub fn init(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Init, &[], message)
    }

    pub fn upstream(texts: &[String], message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Upstream, texts, message)
    }

    pub fn timeout(texts: &[String], timeout: Duration) -> Self {
        Self::new(
            ProviderErrorKind::Timeout,
            texts,
            format!("no response within {}ms", timeout.as_millis()),
        )
    }

    pub fn invalid_response(texts: &[String], message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::InvalidResponse, texts, message)
    }
}

fn truncate_sample(text: &str) -> String {
    match text.char_indices().nth(SAMPLE_MAX_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// The optional vector index could not serve a query.
#[derive(Debug, Clone, Error)]
pub enum IndexUnavailable {
    #[error("index backend does not support this operation: {0}")]
    Unsupported(String),
    #[error("index backend timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("index backend failed: {0}")]
    Backend(String),
    #[error("index backend returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// A stored document vector that cannot be compared with the query.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MalformedEmbedding {
    #[error("document has no embedding")]
    Missing,
    #[error("unparseable embedding: {0}")]
    Unparseable(String),
    #[error("embedding dimension {found} does not match query dimension {expected}")]
    DimensionMismatch { expected: usize, found: usize },
}

/// Failure while running an external helper process.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("i/o error talking to `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` did not finish within {}ms", .timeout.as_millis())]
    Timeout { command: String, timeout: Duration },
    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("`{command}` produced invalid JSON: {message}")]
    InvalidOutput { command: String, message: String },
}

/// The corpus has not been created yet.
#[derive(Debug, Error)]
#[error("Corpus not found at {path}. Run `ragmatch ingest <file>` first.")]
pub struct CorpusNotFoundError {
    pub path: String,
}
