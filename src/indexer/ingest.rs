// SPDX-License-Identifier: MIT OR Apache-2.0

//! Corpus ingestion: embeds documents and writes them to the SQLite store

use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use crate::cli::OutputFormat;
use ragmatch::config::Config;
use ragmatch::corpus::{CorpusStorage, DocumentInput, StoredEmbedding};
use ragmatch::embedding::{EmbeddingProvider, SharedProvider};
use ragmatch::output::print_json;
use ragmatch::utils::get_root_with_corpus;

/// Meta key holding the id of the model that produced the stored vectors
pub const MODEL_META_KEY: &str = "embedding_model";

/// One document in an ingest file
#[derive(Debug, Clone, Deserialize)]
pub struct IngestRecord {
    pub title: String,
    pub text_chunk: String,
    #[serde(default)]
    pub doc_id: Option<String>,
}

impl IngestRecord {
    /// Explicit id, or one derived from the title so re-ingesting the same
    /// title is detected as a duplicate.
    pub fn resolved_id(&self) -> String {
        match self.doc_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                let hash = blake3::hash(self.title.trim().as_bytes());
                hash.to_hex()[..16].to_string()
            }
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub inserted: usize,
    /// Already present and not forced
    pub skipped: usize,
    /// Blank title or text
    pub invalid: usize,
}

/// Embeds and stores records in provider-sized batches.
pub fn ingest_records(
    storage: &CorpusStorage,
    provider: &dyn EmbeddingProvider,
    records: &[IngestRecord],
    force: bool,
    progress: Option<&ProgressBar>,
) -> Result<IngestStats> {
    let mut stats = IngestStats::default();

    if let Some(previous) = storage.get_meta(MODEL_META_KEY)? {
        if previous != provider.model_id() {
            warn!(
                "Corpus was embedded with '{}' but the provider is '{}'; similarities may be meaningless",
                previous,
                provider.model_id()
            );
        }
    }

    let mut pending: Vec<(String, &IngestRecord)> = Vec::with_capacity(records.len());
    for record in records {
        if record.title.trim().is_empty() || record.text_chunk.trim().is_empty() {
            stats.invalid += 1;
            if let Some(pb) = progress {
                pb.inc(1);
            }
            continue;
        }

        let id = record.resolved_id();
        if !force && (storage.contains(&id)? || pending.iter().any(|(p, _)| *p == id)) {
            debug!(title = %record.title, "already ingested, skipping");
            stats.skipped += 1;
            if let Some(pb) = progress {
                pb.inc(1);
            }
            continue;
        }
        pending.push((id, record));
    }

    for batch in pending.chunks(provider.batch_size().max(1)) {
        let texts: Vec<String> = batch.iter().map(|(_, r)| r.text_chunk.clone()).collect();
        let vectors = provider
            .embed_texts(&texts)
            .with_context(|| format!("Failed to embed batch of {} documents", texts.len()))?;

        let embeddings: Vec<StoredEmbedding> =
            vectors.into_iter().map(StoredEmbedding::Native).collect();
        let inputs: Vec<DocumentInput<'_>> = batch
            .iter()
            .zip(&embeddings)
            .map(|((id, record), embedding)| DocumentInput {
                doc_id: id,
                title: record.title.trim(),
                text_chunk: &record.text_chunk,
                embedding,
            })
            .collect();

        stats.inserted += storage.upsert_documents(&inputs)?;
        if let Some(pb) = progress {
            pb.inc(batch.len() as u64);
        }
    }

    if stats.inserted > 0 {
        storage.set_meta(MODEL_META_KEY, provider.model_id())?;
    }
    Ok(stats)
}

#[derive(Debug, Serialize)]
struct IngestOutput<'a> {
    #[serde(flatten)]
    stats: &'a IngestStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    removed: Option<usize>,
}

/// Run the ingest command
pub fn run(
    file: &Path,
    force: bool,
    replace: bool,
    format: OutputFormat,
    compact: bool,
) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let records: Vec<IngestRecord> = serde_json::from_str(&content).with_context(|| {
        format!("{} must be a JSON array of {{title, text_chunk}}", file.display())
    })?;

    let root = get_root_with_corpus(std::env::current_dir()?);
    let config = Config::load_for_dir(&root);
    let storage = CorpusStorage::open_default(&root)?;
    let shared = SharedProvider::from_config(config.embeddings().clone());
    let provider = shared.get()?;
    let removed = if replace {
        let removed = storage.clear_all()?;
        debug!(removed, "cleared corpus before ingest");
        Some(removed)
    } else {
        None
    };

    let pb = ProgressBar::new(records.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40.cyan/blue}] {pos}/{len} documents | {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##."),
    );
    pb.set_message(provider.model_id().to_string());

    let result = ingest_records(&storage, &**provider, &records, force, Some(&pb));
    pb.finish_and_clear();
    let stats = result?;

    match format {
        OutputFormat::Json => print_json(
            &IngestOutput {
                stats: &stats,
                removed,
            },
            compact,
        )?,
        OutputFormat::Text => {
            if let Some(removed) = removed {
                println!("{} Removed {} documents", "✓".green(), removed);
            }
            if stats.invalid > 0 {
                eprintln!("Warning: {} records without title or text were ignored", stats.invalid);
            }
            if stats.skipped > 0 {
                println!(
                    "{} Ingested {} documents ({} already present)",
                    "✓".green(),
                    stats.inserted.to_string().cyan(),
                    stats.skipped.to_string().dimmed()
                );
            } else {
                println!("{} Ingested {} documents", "✓".green(), stats.inserted);
            }
        }
    }
    Ok(())
}
