// SPDX-License-Identifier: MIT OR Apache-2.0

//! Profile text used for whole-profile similarity.

/// Joins the non-empty profile parts into one text, one part per line.
pub fn build_profile_text(name: &str, experience: &str, skills: &[String]) -> String {
    let mut parts = Vec::with_capacity(3);

    let name = name.trim();
    if !name.is_empty() {
        parts.push(format!("Name: {}", name));
    }

    let experience = experience.trim();
    if !experience.is_empty() {
        parts.push(format!("Experience: {}", experience));
    }

    let skills: Vec<&str> = skills
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if !skills.is_empty() {
        parts.push(format!("Skills: {}", skills.join(", ")));
    }

    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_profile() {
        let text = build_profile_text(
            "Ada",
            "10 years of compilers",
            &["Rust".to_string(), "OCaml".to_string()],
        );
        assert_eq!(
            text,
            "Name: Ada\nExperience: 10 years of compilers\nSkills: Rust, OCaml"
        );
    }

    #[test]
    fn empty_parts_are_omitted() {
        assert_eq!(build_profile_text("", "  ", &["Go".to_string()]), "Skills: Go");
        assert_eq!(build_profile_text("", "", &[]), "");
    }
}
