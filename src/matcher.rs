// SPDX-License-Identifier: MIT OR Apache-2.0

//! Threshold matching between a user's skills and a job's requirements.
//!
//! Matching is directional: every user skill looks for its best job skill,
//! and a job skill may be claimed by any number of user skills.

use serde::Serialize;

use crate::embedding::cosine_similarity;

/// A skill name with its embedding. An empty embedding means "not embedded".
#[derive(Debug, Clone, PartialEq)]
pub struct Skill {
    pub name: String,
    pub embedding: Vec<f32>,
}

impl Skill {
    pub fn new(name: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            name: name.into(),
            embedding,
        }
    }
}

/// One user skill paired with the job skill it covers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkillMatch {
    pub user_skill: String,
    pub job_skill: String,
    pub similarity: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchResult {
    pub matched: Vec<SkillMatch>,
    /// Job skills no user skill reached, in job order
    pub missing: Vec<String>,
    /// User skills with at least one match, in user order
    pub matched_user_skills: Vec<String>,
}

impl MatchResult {
    /// The neutral result: nothing matched, every job skill missing.
    pub fn unmatched(job_skills: &[Skill]) -> Self {
        Self {
            matched: Vec::new(),
            missing: job_skills.iter().map(|s| s.name.clone()).collect(),
            matched_user_skills: Vec::new(),
        }
    }

    /// Fraction of job skills covered by at least one user skill.
    pub fn coverage(&self) -> Option<f32> {
        let mut covered: Vec<&str> = self.matched.iter().map(|m| m.job_skill.as_str()).collect();
        covered.sort_unstable();
        covered.dedup();
        let total = covered.len() + self.missing.len();
        if total == 0 {
            None
        } else {
            Some(covered.len() as f32 / total as f32)
        }
    }
}

/// Cosine similarity of every user skill (rows) against every job skill (columns).
pub fn similarity_matrix(user_skills: &[Skill], job_skills: &[Skill]) -> Vec<Vec<f32>> {
    user_skills
        .iter()
        .map(|user| {
            job_skills
                .iter()
                .map(|job| cosine_similarity(&user.embedding, &job.embedding))
                .collect()
        })
        .collect()
}

/// Classifies job skills as matched or missing.
///
/// A user skill matches the job skill with the highest similarity (the first
/// one on ties) when that similarity is at least `threshold`.
pub fn match_skills(user_skills: &[Skill], job_skills: &[Skill], threshold: f32) -> MatchResult {
    if user_skills.is_empty() || job_skills.is_empty() {
        return MatchResult::unmatched(job_skills);
    }
    if user_skills
        .iter()
        .chain(job_skills)
        .any(|skill| skill.embedding.is_empty())
    {
        return MatchResult::unmatched(job_skills);
    }

    let matrix = similarity_matrix(user_skills, job_skills);
    let mut claimed = vec![false; job_skills.len()];
    let mut result = MatchResult::default();

    for (user, row) in user_skills.iter().zip(&matrix) {
        let mut best = 0;
        for (idx, &sim) in row.iter().enumerate() {
            if sim > row[best] {
                best = idx;
            }
        }

        let similarity = row[best];
        if similarity >= threshold {
            claimed[best] = true;
            result.matched.push(SkillMatch {
                user_skill: user.name.clone(),
                job_skill: job_skills[best].name.clone(),
                similarity,
            });
            result.matched_user_skills.push(user.name.clone());
        }
    }

    result.missing = job_skills
        .iter()
        .zip(&claimed)
        .filter(|(_, &was_claimed)| !was_claimed)
        .map(|(skill, _)| skill.name.clone())
        .collect();
    result
}
