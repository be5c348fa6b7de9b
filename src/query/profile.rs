// SPDX-License-Identifier: MIT OR Apache-2.0

//! Whole-profile similarity against a job description

use anyhow::{bail, Result};
use serde::Serialize;

use crate::cli::{clean_list, OutputFormat};
use crate::query::open_session;
use ragmatch::output::{colorize_score, print_json, use_colors};
use ragmatch::profile::build_profile_text;

#[derive(Debug, Serialize)]
struct ProfileOutput {
    similarity: f32,
}

/// Run the profile-match command
pub fn run(
    name: &str,
    experience: &str,
    skills: Vec<String>,
    job_description: &str,
    format: OutputFormat,
    compact: bool,
) -> Result<()> {
    let profile_text = build_profile_text(name, experience, &clean_list(skills));
    if profile_text.is_empty() {
        bail!("Profile is empty: pass at least one of --name, --experience or --skills");
    }
    if job_description.trim().is_empty() {
        bail!("Job description cannot be empty");
    }

    let session = open_session(false, false)?;
    let similarity = match session
        .engine
        .profile_similarity(&profile_text, job_description)?
    {
        Some(similarity) => similarity,
        None => bail!("Nothing to compare"),
    };

    match format {
        OutputFormat::Json => print_json(&ProfileOutput { similarity }, compact)?,
        OutputFormat::Text => {
            let threshold = session.engine.options().match_threshold;
            println!(
                "Profile similarity: {}",
                colorize_score(similarity, threshold, use_colors())
            );
        }
    }
    Ok(())
}
