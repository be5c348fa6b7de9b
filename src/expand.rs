// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query reformulation and multi-variant result merging.
//!
//! A query is expanded into a short, ordered list of textual variants using an
//! explicit rule table. Each variant is retrieved on its own and the per-variant
//! lists are merged with the title as the dedup key.

use regex::Regex;
use std::collections::HashSet;

use crate::ranking::{sort_by_similarity, RankedResult};

/// A single reformulation rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpansionRule {
    /// Replace whole-word occurrences of `from` with `to` (case-sensitive).
    Synonym { from: String, to: String },
    /// Remove whole-word occurrences of `word` (case-insensitive).
    Filler { word: String },
}

impl ExpansionRule {
    /// Built-in rules: Engineering/Engineer in both directions, then drop "career".
    pub fn defaults() -> Vec<ExpansionRule> {
        vec![
            ExpansionRule::Synonym {
                from: "Engineering".to_string(),
                to: "Engineer".to_string(),
            },
            ExpansionRule::Synonym {
                from: "Engineer".to_string(),
                to: "Engineering".to_string(),
            },
            ExpansionRule::Filler {
                word: "career".to_string(),
            },
        ]
    }
}

struct CompiledRule {
    pattern: Regex,
    replacement: String,
}

/// Deterministic query expander.
pub struct QueryExpander {
    rules: Vec<CompiledRule>,
}

impl QueryExpander {
    /// Compile a rule table. Rule order is variant priority order.
    pub fn new(rules: &[ExpansionRule]) -> Result<Self, regex::Error> {
        let rules = rules
            .iter()
            .filter_map(|rule| match rule {
                ExpansionRule::Synonym { from, to } if !from.trim().is_empty() => Some(
                    Regex::new(&format!(r"\b{}\b", regex::escape(from.trim()))).map(|pattern| {
                        CompiledRule {
                            pattern,
                            replacement: to.clone(),
                        }
                    }),
                ),
                ExpansionRule::Filler { word } if !word.trim().is_empty() => Some(
                    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(word.trim()))).map(
                        |pattern| CompiledRule {
                            pattern,
                            replacement: String::new(),
                        },
                    ),
                ),
                _ => None,
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { rules })
    }

    /// Expander with the built-in rule table.
    pub fn with_defaults() -> Self {
        Self::new(&ExpansionRule::defaults()).expect("built-in expansion rules are valid regexes")
    }

    /// Expander that only ever yields the original query.
    pub fn disabled() -> Self {
        Self { rules: Vec::new() }
    }

    /// Produce the ordered list of query variants.
    ///
    /// The trimmed original always comes first. Blank and repeated variants
    /// are dropped, so a blank query yields no variants at all.
    pub fn expand(&self, query: &str) -> Vec<String> {
        let original = collapse_whitespace(query);
        if original.is_empty() {
            return Vec::new();
        }

        let mut variants = vec![original.clone()];
        for rule in &self.rules {
            let rewritten = rule
                .pattern
                .replace_all(&original, rule.replacement.as_str());
            let variant = collapse_whitespace(&rewritten);
            if !variant.is_empty() && !variants.contains(&variant) {
                variants.push(variant);
            }
        }
        variants
    }
}

impl Default for QueryExpander {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Merge per-variant ranked lists.
///
/// Lists are visited in variant priority order and a result is kept only if
/// its title has not been accepted yet. The union is re-sorted by similarity
/// (stable) and truncated to `top_k`. Results without a title are dropped.
pub fn merge_ranked(variant_results: Vec<Vec<RankedResult>>, top_k: usize) -> Vec<RankedResult> {
    let mut seen_titles: HashSet<String> = HashSet::new();
    let mut merged = Vec::new();

    for results in variant_results {
        for result in results {
            if result.document.title.is_empty() {
                continue;
            }
            if seen_titles.insert(result.document.title.clone()) {
                merged.push(result);
            }
        }
    }

    sort_by_similarity(&mut merged);
    merged.truncate(top_k);
    merged
}
