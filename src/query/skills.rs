// SPDX-License-Identifier: MIT OR Apache-2.0

//! Match user skills against job skills

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

use crate::cli::{clean_list, OutputFormat};
use crate::query::open_session;
use ragmatch::matcher::MatchResult;
use ragmatch::output::{colorize_missing, colorize_score, colorize_title, print_json, use_colors};

#[derive(Debug, Serialize)]
struct MatchOutput<'a> {
    threshold: f32,
    coverage: Option<f32>,
    #[serde(flatten)]
    result: &'a MatchResult,
}

/// Run the match command
pub fn run(
    user: Vec<String>,
    job: Vec<String>,
    threshold: Option<f32>,
    format: OutputFormat,
    compact: bool,
) -> Result<()> {
    let user = clean_list(user);
    let job = clean_list(job);

    let session = open_session(false, false)?;
    let threshold = session.config.merge_match_threshold(threshold);
    let result = session.engine.match_skills(&user, &job, Some(threshold))?;

    match format {
        OutputFormat::Json => print_json(
            &MatchOutput {
                threshold,
                coverage: result.coverage(),
                result: &result,
            },
            compact,
        )?,
        OutputFormat::Text => {
            let use_color = use_colors();
            if result.matched.is_empty() {
                println!("{} No skills matched at threshold {:.2}", "✗".red(), threshold);
            } else {
                println!("{} Matched skills:", "✓".green());
                for m in &result.matched {
                    println!(
                        "  {} → {} [{}]",
                        colorize_title(&m.user_skill, use_color),
                        m.job_skill,
                        colorize_score(m.similarity, threshold, use_color)
                    );
                }
            }

            if !result.missing.is_empty() {
                println!("{} Missing skills:", "•".yellow());
                for skill in &result.missing {
                    println!("  {}", colorize_missing(skill, use_color));
                }
            }

            if let Some(coverage) = result.coverage() {
                println!("Coverage: {:.0}%", coverage * 100.0);
            }
        }
    }
    Ok(())
}
