// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query module - retrieval, matching and corpus inspection commands

pub mod profile;
pub mod retrieve;
pub mod skills;
pub mod stats;

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

use ragmatch::config::Config;
use ragmatch::corpus::{CorpusStorage, CorpusStore, MemoryCorpus};
use ragmatch::embedding::SharedProvider;
use ragmatch::engine::Engine;
use ragmatch::errors::CorpusNotFoundError;
use ragmatch::utils::{find_corpus_root, CORPUS_DB, INDEX_DIR};

/// Engine plus the configuration it was built from
pub struct Session {
    pub config: Config,
    pub engine: Engine,
}

/// Resolve the corpus root and configuration for the current directory.
pub fn locate() -> Result<(PathBuf, Option<PathBuf>, Config)> {
    let cwd = std::env::current_dir()?;
    match find_corpus_root(&cwd) {
        Some(found) => {
            let config = Config::load_for_dir(&found.root);
            Ok((found.root, Some(found.db_path), config))
        }
        None => {
            let config = Config::load_for_dir(&cwd);
            Ok((cwd, None, config))
        }
    }
}

/// Build an engine for the current directory.
///
/// Retrieval needs the corpus; matching commands run against an empty one.
pub fn open_session(require_corpus: bool, no_expand: bool) -> Result<Session> {
    let (root, db_path, mut config) = locate()?;
    if no_expand {
        config.expansion.enabled = Some(false);
    }

    let corpus: Arc<dyn CorpusStore> = match db_path {
        Some(path) => Arc::new(CorpusStorage::open(path)?),
        None if require_corpus => {
            return Err(CorpusNotFoundError {
                path: root.join(INDEX_DIR).join(CORPUS_DB).display().to_string(),
            }
            .into())
        }
        None => Arc::new(MemoryCorpus::default()),
    };

    let provider = Arc::new(SharedProvider::from_config(config.embeddings().clone()));
    let engine = Engine::from_config(&config, provider, corpus)?;
    Ok(Session { config, engine })
}
