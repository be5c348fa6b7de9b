// SPDX-License-Identifier: MIT OR Apache-2.0

//! Output and color utilities for consistent terminal formatting
//!
//! Provides shared color functions respecting NO_COLOR environment variable.

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

/// Check if colors should be used (respects NO_COLOR env var)
pub fn use_colors() -> bool {
    std::env::var("NO_COLOR").is_err()
}

/// Print a value as JSON on stdout
pub fn print_json<T: Serialize + ?Sized>(value: &T, compact: bool) -> Result<()> {
    let rendered = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{}", rendered);
    Ok(())
}

/// Colorize passage or skill title (bold)
pub fn colorize_title(text: &str, use_color: bool) -> String {
    if use_color {
        text.bold().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize a similarity score: green when it clears `threshold`, yellow otherwise
pub fn colorize_score(score: f32, threshold: f32, use_color: bool) -> String {
    let text = format!("{:.3}", score);
    if !use_color {
        text
    } else if score >= threshold {
        text.green().to_string()
    } else {
        text.yellow().to_string()
    }
}

/// Colorize missing items (red)
pub fn colorize_missing(text: &str, use_color: bool) -> String {
    if use_color {
        text.red().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize passage body (dimmed)
pub fn colorize_context(text: &str, use_color: bool) -> String {
    if use_color {
        text.dimmed().to_string()
    } else {
        text.to_string()
    }
}

/// Shorten text to `max_chars` characters on one line, appending "..." when cut
pub fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &flat[..idx]),
        None => flat,
    }
}
