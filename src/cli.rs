// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI argument parsing using clap

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// ragmatch - Semantic retrieval and skill matching
///
/// Ranks a local document corpus against natural-language queries and
/// matches a person's skills against a role's requirements by embedding
/// similarity.
#[derive(Parser, Debug)]
#[command(name = "ragmatch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Compact JSON output (no pretty formatting)
    #[arg(long, global = true)]
    pub compact: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Retrieve corpus passages relevant to a query
    Retrieve {
        /// Natural-language query
        query: String,

        /// Maximum number of passages to return
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Only search with the query as written
        #[arg(long)]
        no_expand: bool,
    },

    /// Match a user's skills against a job's required skills
    Match {
        /// User skills, comma-separated
        #[arg(long, value_delimiter = ',')]
        user: Vec<String>,

        /// Job skills, comma-separated
        #[arg(long, value_delimiter = ',')]
        job: Vec<String>,

        /// Minimum similarity for a match (default: 0.7)
        #[arg(short, long)]
        threshold: Option<f32>,
    },

    /// Score a whole profile against a job description
    #[command(name = "profile-match")]
    ProfileMatch {
        /// Candidate name
        #[arg(long, default_value = "")]
        name: String,

        /// Experience summary
        #[arg(long, default_value = "")]
        experience: String,

        /// Skills, comma-separated
        #[arg(long, value_delimiter = ',')]
        skills: Vec<String>,

        /// Job description text
        #[arg(long)]
        job_description: String,
    },

    /// Embed documents from a JSON file and add them to the corpus
    Ingest {
        /// JSON array of {title, text_chunk, doc_id?}
        file: PathBuf,

        /// Re-embed documents that are already present
        #[arg(short, long)]
        force: bool,

        /// Remove every stored document before ingesting
        #[arg(long)]
        replace: bool,
    },

    /// Show corpus statistics
    Stats,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Trim comma-separated values and drop empty ones
pub fn clean_list(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}
