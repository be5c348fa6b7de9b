// SPDX-License-Identifier: MIT OR Apache-2.0

//! Optional server-side nearest-neighbour search.
//!
//! Both backends send the same JSON request:
//! `{"query_embedding": [...], "match_count": k, "match_threshold": t}` and
//! accept either a bare array of hits or an object wrapping one under
//! `matches` or `data`. A hit is `{"id"|"doc_id": ..., "similarity"|"score": ...}`.

use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::{IndexBackendType, RetrievalConfig};
use crate::errors::{CommandError, IndexUnavailable};
use crate::process::run_json_command;

/// A document id and its similarity as reported by the index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub id: String,
    pub similarity: f32,
}

/// Trait for vector index backends.
pub trait VectorIndex: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Checks that the backend is reachable and supports search.
    fn probe(&self) -> Result<(), IndexUnavailable>;

    /// Returns up to `k` hits with similarity at or above `threshold`.
    fn search(
        &self,
        query: &[f32],
        k: usize,
        threshold: f32,
    ) -> Result<Vec<IndexHit>, IndexUnavailable>;
}

fn search_payload(query: &[f32], k: usize, threshold: f32) -> Value {
    serde_json::json!({
        "query_embedding": query,
        "match_count": k,
        "match_threshold": threshold,
    })
}

/// Parses an index response into hits.
pub fn parse_hits(value: &Value) -> Result<Vec<IndexHit>, IndexUnavailable> {
    let rows = match value {
        Value::Array(rows) => rows,
        Value::Object(obj) => match obj.get("matches").or_else(|| obj.get("data")) {
            Some(Value::Array(rows)) => rows,
            Some(Value::Null) => return Ok(Vec::new()),
            _ => {
                return Err(IndexUnavailable::InvalidResponse(
                    "missing 'matches' array".to_string(),
                ))
            }
        },
        Value::Null => return Ok(Vec::new()),
        _ => {
            return Err(IndexUnavailable::InvalidResponse(
                "response must be a JSON array or object".to_string(),
            ))
        }
    };

    rows.iter()
        .map(|row| {
            let id = match row.get("id").or_else(|| row.get("doc_id")) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => {
                    return Err(IndexUnavailable::InvalidResponse(
                        "hit without id".to_string(),
                    ))
                }
            };
            let similarity = row
                .get("similarity")
                .or_else(|| row.get("score"))
                .and_then(Value::as_f64)
                .ok_or_else(|| {
                    IndexUnavailable::InvalidResponse(format!("hit {} without similarity", id))
                })?;
            Ok(IndexHit {
                id,
                similarity: similarity as f32,
            })
        })
        .collect()
}

/// Index backend that shells out to an external process.
pub struct CommandIndex {
    command: String,
    timeout: Duration,
}

impl CommandIndex {
    pub fn new(command: String, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    /// First word of the command line that is not a `NAME=value` assignment.
    fn program(&self) -> Option<&str> {
        self.command
            .split_whitespace()
            .find(|word| !is_env_assignment(word))
    }
}

impl VectorIndex for CommandIndex {
    fn name(&self) -> &str {
        "command"
    }

    fn probe(&self) -> Result<(), IndexUnavailable> {
        let program = self
            .program()
            .ok_or_else(|| IndexUnavailable::Unsupported("empty index command".to_string()))?;
        which::which(program)
            .map(|path| debug!(path = %path.display(), "index command found"))
            .map_err(|err| IndexUnavailable::Unsupported(format!("{}: {}", program, err)))
    }

    fn search(
        &self,
        query: &[f32],
        k: usize,
        threshold: f32,
    ) -> Result<Vec<IndexHit>, IndexUnavailable> {
        let payload = search_payload(query, k, threshold);
        let value = run_json_command(&self.command, &payload, self.timeout).map_err(
            |err| match err {
                CommandError::Timeout { timeout, .. } => IndexUnavailable::Timeout(timeout),
                CommandError::InvalidOutput { message, .. } => {
                    IndexUnavailable::InvalidResponse(message)
                }
                other => IndexUnavailable::Backend(other.to_string()),
            },
        )?;
        parse_hits(&value)
    }
}

fn is_env_assignment(word: &str) -> bool {
    match word.split_once('=') {
        Some((name, _)) => {
            let mut chars = name.chars();
            matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
                && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
        }
        None => false,
    }
}

/// Index backend calling a remote match RPC over HTTP.
pub struct HttpIndex {
    client: reqwest::blocking::Client,
    url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpIndex {
    pub fn new(
        url: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, IndexUnavailable> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| IndexUnavailable::Backend(err.to_string()))?;
        Ok(Self {
            client,
            url,
            api_key,
            timeout,
        })
    }

    fn send(&self, payload: &Value) -> Result<reqwest::blocking::Response, IndexUnavailable> {
        let mut request = self.client.post(&self.url).json(payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key).header("apikey", key);
        }

        request.send().map_err(|err| {
            if err.is_timeout() {
                IndexUnavailable::Timeout(self.timeout)
            } else {
                IndexUnavailable::Backend(err.to_string())
            }
        })
    }

    fn unsupported(&self, status: StatusCode) -> Option<IndexUnavailable> {
        (status == StatusCode::NOT_FOUND || status == StatusCode::NOT_IMPLEMENTED).then(|| {
            IndexUnavailable::Unsupported(format!("{} returned {}", self.url, status))
        })
    }

    fn post(&self, payload: &Value) -> Result<Value, IndexUnavailable> {
        let response = self.send(payload)?;
        let status = response.status();
        if let Some(err) = self.unsupported(status) {
            return Err(err);
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(IndexUnavailable::Backend(format!("{}: {}", status, body)));
        }

        response
            .json::<Value>()
            .map_err(|err| IndexUnavailable::InvalidResponse(err.to_string()))
    }
}

impl VectorIndex for HttpIndex {
    fn name(&self) -> &str {
        "http"
    }

    /// Sends an empty search and only checks that the route exists.
    ///
    /// Match RPCs commonly reject a zero-length vector, so any answer other
    /// than a missing route or rejected credentials counts as reachable.
    fn probe(&self) -> Result<(), IndexUnavailable> {
        let status = self.send(&search_payload(&[], 0, 1.0))?.status();
        if let Some(err) = self.unsupported(status) {
            return Err(err);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(IndexUnavailable::Backend(format!(
                "{} rejected credentials ({})",
                self.url, status
            )));
        }
        debug!(url = %self.url, %status, "index endpoint reachable");
        Ok(())
    }

    fn search(
        &self,
        query: &[f32],
        k: usize,
        threshold: f32,
    ) -> Result<Vec<IndexHit>, IndexUnavailable> {
        let value = self.post(&search_payload(query, k, threshold))?;
        parse_hits(&value)
    }
}

/// Builds the configured index backend, if any.
pub fn create_index(
    config: &RetrievalConfig,
) -> Result<Option<Box<dyn VectorIndex>>, IndexUnavailable> {
    let timeout = Duration::from_millis(config.index_timeout_ms());
    match config.index() {
        IndexBackendType::Off => Ok(None),
        IndexBackendType::Command => {
            let command = config.index_command.clone().ok_or_else(|| {
                IndexUnavailable::Unsupported("retrieval.index_command is not set".to_string())
            })?;
            Ok(Some(Box::new(CommandIndex::new(command, timeout))))
        }
        IndexBackendType::Http => {
            let url = config.index_url.clone().ok_or_else(|| {
                IndexUnavailable::Unsupported("retrieval.index_url is not set".to_string())
            })?;
            let api_key = config
                .index_api_key_env
                .as_deref()
                .and_then(|name| std::env::var(name).ok());
            Ok(Some(Box::new(HttpIndex::new(url, api_key, timeout)?)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::StubServer;

    #[test]
    fn test_parse_hits_shapes() {
        let bare = serde_json::json!([
            {"id": "a", "similarity": 0.9},
            {"doc_id": 7, "score": 0.5}
        ]);
        assert_eq!(
            parse_hits(&bare).unwrap(),
            vec![
                IndexHit { id: "a".into(), similarity: 0.9 },
                IndexHit { id: "7".into(), similarity: 0.5 },
            ]
        );

        let wrapped = serde_json::json!({"matches": [{"id": "b", "similarity": 0.4}]});
        assert_eq!(parse_hits(&wrapped).unwrap().len(), 1);

        let data = serde_json::json!({"data": null});
        assert!(parse_hits(&data).unwrap().is_empty());
    }

    #[test]
    fn test_parse_hits_rejects_bad_rows() {
        assert!(parse_hits(&serde_json::json!([{"similarity": 0.1}])).is_err());
        assert!(parse_hits(&serde_json::json!([{"id": "x"}])).is_err());
        assert!(parse_hits(&serde_json::json!({"error": "nope"})).is_err());
        assert!(parse_hits(&serde_json::json!("text")).is_err());
    }

    #[test]
    fn test_create_index_off_by_default() {
        let config = RetrievalConfig::default();
        assert!(create_index(&config).unwrap().is_none());
    }

    #[test]
    fn test_create_index_requires_target() {
        let config = RetrievalConfig {
            index: Some(IndexBackendType::Http),
            ..Default::default()
        };
        assert!(matches!(
            create_index(&config),
            Err(IndexUnavailable::Unsupported(_))
        ));

        let config = RetrievalConfig {
            index: Some(IndexBackendType::Http),
            index_url: Some("http://127.0.0.1:9/rpc/match_documents".into()),
            ..Default::default()
        };
        let index = create_index(&config).unwrap().unwrap();
        assert_eq!(index.name(), "http");
    }

    #[test]
    fn test_command_index_probe_missing_program() {
        let index = CommandIndex::new(
            "ragmatch-definitely-missing-index --flag".into(),
            Duration::from_secs(1),
        );
        assert!(matches!(
            index.probe(),
            Err(IndexUnavailable::Unsupported(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_index_search() {
        let index = CommandIndex::new(
            r#"cat > /dev/null; echo '{"matches": [{"id": "d1", "similarity": 0.8}]}'"#.into(),
            Duration::from_secs(5),
        );
        let hits = index.search(&[1.0, 0.0], 3, 0.3).unwrap();
        assert_eq!(hits, vec![IndexHit { id: "d1".into(), similarity: 0.8 }]);
    }

    #[cfg(unix)]
    #[test]
    fn test_command_index_skips_env_assignments() {
        let index = CommandIndex::new("RAGMATCH_DIM=2 sh -c 'cat'".into(), Duration::from_secs(1));
        assert_eq!(index.program(), Some("sh"));
        assert!(index.probe().is_ok());

        let index = CommandIndex::new("FOO=1".into(), Duration::from_secs(1));
        assert!(matches!(
            index.probe(),
            Err(IndexUnavailable::Unsupported(_))
        ));
        assert!(!is_env_assignment("--opt=value"));
        assert!(!is_env_assignment("1X=2"));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_index_failure_maps_to_backend() {
        let index = CommandIndex::new("cat > /dev/null; exit 1".into(), Duration::from_secs(5));
        assert!(matches!(
            index.search(&[1.0], 1, 0.0),
            Err(IndexUnavailable::Backend(_))
        ));
    }

    fn http_index(url: String, api_key: Option<&str>) -> HttpIndex {
        HttpIndex::new(url, api_key.map(str::to_string), Duration::from_secs(5)).unwrap()
    }

    /// Behaves like a pgvector match RPC: a zero-length vector is a bad request.
    fn match_rpc() -> StubServer {
        StubServer::start(|request| {
            let payload: Value = serde_json::from_str(&request.body).unwrap_or_default();
            match payload["query_embedding"].as_array() {
                Some(v) if !v.is_empty() => {
                    (200, r#"[{"id": "1", "similarity": 0.95}]"#.to_string())
                }
                _ => (400, r#"{"message": "vector must have at least 1 dimension"}"#.into()),
            }
        })
    }

    #[test]
    fn test_http_index_reachable_when_rpc_rejects_empty_vector() {
        let server = match_rpc();
        let index = http_index(format!("{}/rpc/match_documents", server.url()), None);

        assert!(index.probe().is_ok());
        let hits = index.search(&[0.6, 0.8], 3, 0.3).unwrap();
        assert_eq!(hits, vec![IndexHit { id: "1".into(), similarity: 0.95 }]);

        let requests = server.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].request_line.starts_with("POST /rpc/match_documents"));
        let payload: Value = serde_json::from_str(&requests[1].body).unwrap();
        assert_eq!(payload["match_count"], 3);
        assert_eq!(payload["query_embedding"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_http_index_selected_and_hits_hydrated() {
        use crate::corpus::{CorpusRow, MemoryCorpus, StoredEmbedding};
        use crate::ranking::Retriever;
        use std::sync::Arc;

        let server = match_rpc();
        let index = http_index(server.url().to_string(), None);
        let corpus = MemoryCorpus::new(vec![CorpusRow {
            id: "1".into(),
            title: "Data Scientist".into(),
            text_chunk: "Models and statistics".into(),
            embedding: StoredEmbedding::Missing,
        }]);

        let retriever = Retriever::select(Some(Box::new(index)), Arc::new(corpus), 100);
        assert_eq!(retriever.strategy(), "http");

        let results = retriever.rank(&[1.0, 0.0], 5, 0.3);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.title, "Data Scientist");
        assert!((results[0].similarity - 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_http_missing_route_is_unsupported() {
        for status in [404u16, 501] {
            let server = StubServer::start(move |_| (status, "{}".to_string()));
            let index = http_index(server.url().to_string(), None);
            assert!(matches!(index.probe(), Err(IndexUnavailable::Unsupported(_))));
            assert!(matches!(
                index.search(&[1.0], 1, 0.0),
                Err(IndexUnavailable::Unsupported(_))
            ));
        }
    }

    #[test]
    fn test_http_index_rejected_credentials_unavailable() {
        let server = StubServer::start(|_| (401, r#"{"message": "invalid key"}"#.to_string()));
        let index = http_index(server.url().to_string(), Some("wrong"));
        assert!(matches!(index.probe(), Err(IndexUnavailable::Backend(_))));
    }

    #[test]
    fn test_http_search_errors() {
        let server = StubServer::start(|_| (500, "boom".to_string()));
        let index = http_index(server.url().to_string(), None);
        match index.search(&[1.0], 1, 0.0) {
            Err(IndexUnavailable::Backend(message)) => assert!(message.contains("boom")),
            other => panic!("unexpected result: {:?}", other),
        }

        let server = StubServer::start(|_| (200, "not json".to_string()));
        let index = http_index(server.url().to_string(), None);
        assert!(matches!(
            index.search(&[1.0], 1, 0.0),
            Err(IndexUnavailable::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_http_index_sends_api_key() {
        let server = StubServer::start(|_| (200, "[]".to_string()));
        let index = http_index(server.url().to_string(), Some("secret"));
        assert!(index.search(&[1.0], 1, 0.0).unwrap().is_empty());

        let requests = server.requests();
        assert_eq!(requests[0].header("authorization"), Some("Bearer secret"));
        assert_eq!(requests[0].header("apikey"), Some("secret"));
        assert_eq!(requests[0].header("content-type"), Some("application/json"));
    }
}
