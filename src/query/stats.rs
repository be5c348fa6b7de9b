// SPDX-License-Identifier: MIT OR Apache-2.0

//! Corpus statistics

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::indexer::ingest::MODEL_META_KEY;
use crate::query::locate;
use ragmatch::corpus::CorpusStorage;
use ragmatch::errors::CorpusNotFoundError;
use ragmatch::output::print_json;
use ragmatch::utils::{CORPUS_DB, INDEX_DIR};

#[derive(Debug, Serialize)]
struct StatsOutput {
    path: String,
    documents: u64,
    model: Option<String>,
}

/// Run the stats command
pub fn run(format: OutputFormat, compact: bool) -> Result<()> {
    let (root, db_path, _) = locate()?;
    let db_path = db_path.ok_or_else(|| CorpusNotFoundError {
        path: root.join(INDEX_DIR).join(CORPUS_DB).display().to_string(),
    })?;

    let storage = CorpusStorage::open(&db_path)?;
    let stats = StatsOutput {
        path: db_path.display().to_string(),
        documents: storage.count_documents()?,
        model: storage.get_meta(MODEL_META_KEY)?,
    };

    match format {
        OutputFormat::Json => print_json(&stats, compact)?,
        OutputFormat::Text => {
            println!("{} {}", "Corpus:".bold(), stats.path.cyan());
            println!("  documents: {}", stats.documents);
            println!(
                "  model:     {}",
                stats.model.as_deref().unwrap_or("(none)")
            );
        }
    }
    Ok(())
}
