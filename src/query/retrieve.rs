// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retrieve corpus passages for a query

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::query::open_session;
use ragmatch::engine::Passage;
use ragmatch::output::{
    colorize_context, colorize_score, colorize_title, preview, print_json, use_colors,
};

#[derive(Debug, Serialize)]
struct RetrieveOutput<'a> {
    query: &'a str,
    strategy: &'a str,
    results: &'a [Passage],
}

/// Run the retrieve command
pub fn run(
    query: &str,
    top_k: Option<usize>,
    no_expand: bool,
    format: OutputFormat,
    compact: bool,
) -> Result<()> {
    let session = open_session(true, no_expand)?;
    let top_k = session.config.merge_top_k(top_k);
    let passages = session.engine.retrieve(query, top_k)?;

    match format {
        OutputFormat::Json => print_json(
            &RetrieveOutput {
                query,
                strategy: session.engine.strategy(),
                results: &passages,
            },
            compact,
        )?,
        OutputFormat::Text => {
            if passages.is_empty() {
                println!("{} No relevant passages for: {}", "✗".red(), query.yellow());
                return Ok(());
            }

            let use_color = use_colors();
            let threshold = session.engine.options().relevance_threshold;
            println!(
                "\n{} {} passage(s) for: {}\n",
                "🔍".cyan(),
                passages.len(),
                query.yellow()
            );
            for (rank, passage) in passages.iter().enumerate() {
                println!(
                    "  {}. {} [{}]",
                    rank + 1,
                    colorize_title(&passage.title, use_color),
                    colorize_score(passage.similarity, threshold, use_color)
                );
                println!(
                    "     {}",
                    colorize_context(&preview(&passage.text_chunk, 160), use_color)
                );
            }
            println!();
        }
    }
    Ok(())
}
