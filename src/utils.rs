// SPDX-License-Identifier: MIT OR Apache-2.0

//! Utility functions for ragmatch

use std::path::{Path, PathBuf};

/// The name of the data directory
pub const INDEX_DIR: &str = ".ragmatch";

/// File name of the corpus database inside the data directory
pub const CORPUS_DB: &str = "corpus.sqlite";

/// Result of finding a corpus root
#[derive(Debug)]
pub struct CorpusRoot {
    /// The directory containing the .ragmatch folder
    pub root: PathBuf,
    /// The full path to the corpus database
    pub db_path: PathBuf,
}

/// Find the nearest corpus database by walking up from the given path.
/// Returns None if no corpus is found.
pub fn find_corpus_root(start: impl AsRef<Path>) -> Option<CorpusRoot> {
    let mut current = start.as_ref().to_path_buf();

    // Canonicalize to handle relative paths
    if let Ok(canonical) = current.canonicalize() {
        current = canonical;
    }

    loop {
        let db_path = current.join(INDEX_DIR).join(CORPUS_DB);
        if db_path.is_file() {
            return Some(CorpusRoot {
                root: current.clone(),
                db_path,
            });
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Get the root directory that contains the corpus.
/// Falls back to the given path if no corpus is found.
pub fn get_root_with_corpus(path: impl AsRef<Path>) -> PathBuf {
    match find_corpus_root(&path) {
        Some(root) => root.root,
        None => path.as_ref().to_path_buf(),
    }
}
