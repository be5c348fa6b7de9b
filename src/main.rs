// SPDX-License-Identifier: MIT OR Apache-2.0

//! ragmatch - Semantic retrieval and skill matching tool
//!
//! Ranks a local corpus against queries with embedding similarity, falling
//! back from an optional vector index to a brute-force scan, and matches
//! skill sets under a similarity threshold.

mod cli;
mod indexer;
mod query;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Initialize tracing with RAGMATCH_LOG env var (e.g., RAGMATCH_LOG=debug ragmatch stats)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_env("RAGMATCH_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let format = cli.format;
    let compact = cli.compact;

    match cli.command {
        Commands::Retrieve {
            query,
            top_k,
            no_expand,
        } => {
            query::retrieve::run(&query, top_k, no_expand, format, compact)?;
        }
        Commands::Match {
            user,
            job,
            threshold,
        } => {
            query::skills::run(user, job, threshold, format, compact)?;
        }
        Commands::ProfileMatch {
            name,
            experience,
            skills,
            job_description,
        } => {
            query::profile::run(&name, &experience, skills, &job_description, format, compact)?;
        }
        Commands::Ingest {
            file,
            force,
            replace,
        } => {
            indexer::ingest::run(&file, force, replace, format, compact)?;
        }
        Commands::Stats => {
            query::stats::run(format, compact)?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "ragmatch", &mut std::io::stdout());
        }
    }

    Ok(())
}
