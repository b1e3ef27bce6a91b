//! Capability, case study and accelerator matching.
//!
//! Matching is presence-based substring containment on the lowercased
//! requirement text. Capabilities and accelerators fall back to the first
//! catalog entries so a prompt always has some grounding.

use serde::{Deserialize, Serialize};

use crate::constants::knowledge::{FALLBACK_ENTRIES, MAX_CASE_STUDIES, MAX_DIFFERENTIATORS};
use crate::types::truncate_with_ellipsis;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub technologies: Vec<String>,
    #[serde(default)]
    pub industries: Vec<String>,
    #[serde(default)]
    pub key_differentiators: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseStudy {
    pub title: String,
    pub client_industry: String,
    pub challenge: String,
    pub solution: String,
    #[serde(default)]
    pub technologies_used: Vec<String>,
    #[serde(default)]
    pub outcomes: Vec<String>,
    #[serde(default)]
    pub relevance_keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Accelerator {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub use_cases: Vec<String>,
    #[serde(default)]
    pub benefits: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct KnowledgeCatalog {
    pub company_name: String,
    pub overview: String,
    pub differentiators: Vec<String>,
    pub capabilities: Vec<Capability>,
    pub case_studies: Vec<CaseStudy>,
    pub accelerators: Vec<Accelerator>,
}

fn mentions(haystack: &str, needles: &[String]) -> bool {
    needles
        .iter()
        .any(|n| !n.is_empty() && haystack.contains(&n.to_lowercase()))
}

impl KnowledgeCatalog {
    pub fn relevant_capabilities(&self, requirement: &str) -> Vec<&Capability> {
        let text = requirement.to_lowercase();
        let matched: Vec<&Capability> = self
            .capabilities
            .iter()
            .filter(|c| {
                mentions(&text, &c.technologies)
                    || mentions(&text, &c.industries)
                    || mentions(&text, &c.key_differentiators)
            })
            .collect();
        if matched.is_empty() {
            self.capabilities.iter().take(FALLBACK_ENTRIES).collect()
        } else {
            matched
        }
    }

    /// +1 per keyword, +2 for the client industry, +1 per technology.
    /// Only positive scores, best first, at most two.
    pub fn relevant_case_studies(&self, requirement: &str) -> Vec<&CaseStudy> {
        let text = requirement.to_lowercase();
        let count = |items: &[String]| {
            items
                .iter()
                .filter(|i| !i.is_empty() && text.contains(&i.to_lowercase()))
                .count()
        };

        let mut scored: Vec<(usize, &CaseStudy)> = self
            .case_studies
            .iter()
            .map(|study| {
                let mut score = count(&study.relevance_keywords) + count(&study.technologies_used);
                if !study.client_industry.is_empty()
                    && text.contains(&study.client_industry.to_lowercase())
                {
                    score += 2;
                }
                (score, study)
            })
            .filter(|(score, _)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored
            .into_iter()
            .take(MAX_CASE_STUDIES)
            .map(|(_, s)| s)
            .collect()
    }

    pub fn relevant_accelerators(&self, requirement: &str) -> Vec<&Accelerator> {
        let text = requirement.to_lowercase();
        let matched: Vec<&Accelerator> = self
            .accelerators
            .iter()
            .filter(|a| text.contains(&a.name.to_lowercase()) || mentions(&text, &a.use_cases))
            .collect();
        if matched.is_empty() {
            self.accelerators.iter().take(FALLBACK_ENTRIES).collect()
        } else {
            matched
        }
    }

    /// Overview, matched entries and top differentiators, cut to `max_chars`
    /// with a trailing "..." when anything was dropped.
    pub fn format_for_prompt(&self, requirement: &str, max_chars: usize) -> String {
        let label = self.company_name.to_uppercase();
        let rule = "-".repeat(80);
        let mut parts: Vec<String> = vec![
            format!("{} COMPANY OVERVIEW:", label),
            "=".repeat(80),
            self.overview.trim().to_string(),
            String::new(),
        ];

        let capabilities = self.relevant_capabilities(requirement);
        if !capabilities.is_empty() {
            parts.push(format!("RELEVANT {} CAPABILITIES:", label));
            parts.push(rule.clone());
            for cap in capabilities {
                parts.push(format!("• {}", cap.name));
                parts.push(format!("  {}", cap.description));
                parts.push(format!("  Technologies: {}", cap.technologies.join(", ")));
                parts.push(format!("  Industries: {}", cap.industries.join(", ")));
                if !cap.key_differentiators.is_empty() {
                    let points: Vec<&str> = cap
                        .key_differentiators
                        .iter()
                        .take(3)
                        .map(String::as_str)
                        .collect();
                    parts.push(format!("  Key Points: {}", points.join(", ")));
                }
                parts.push(String::new());
            }
        }

        let studies = self.relevant_case_studies(requirement);
        if !studies.is_empty() {
            parts.push(format!("RELEVANT {} CASE STUDIES:", label));
            parts.push(rule.clone());
            for study in studies {
                parts.push(format!("• {} ({})", study.title, study.client_industry));
                parts.push(format!("  Challenge: {}", study.challenge));
                parts.push(format!("  Solution: {}", study.solution));
                parts.push(format!("  Technologies: {}", study.technologies_used.join(", ")));
                parts.push(format!("  Outcomes: {}", study.outcomes.join(", ")));
                parts.push(String::new());
            }
        }

        let accelerators = self.relevant_accelerators(requirement);
        if !accelerators.is_empty() {
            parts.push(format!("RELEVANT {} ACCELERATORS:", label));
            parts.push(rule.clone());
            for accel in accelerators {
                let benefits: Vec<&str> = accel.benefits.iter().take(2).map(String::as_str).collect();
                parts.push(format!("• {}", accel.name));
                parts.push(format!("  {}", accel.description));
                parts.push(format!("  Use Cases: {}", accel.use_cases.join(", ")));
                parts.push(format!("  Benefits: {}", benefits.join(", ")));
                parts.push(String::new());
            }
        }

        parts.push(format!("{} KEY DIFFERENTIATORS:", label));
        parts.push(rule);
        for diff in self.differentiators.iter().take(MAX_DIFFERENTIATORS) {
            parts.push(format!("• {}", diff));
        }
        parts.push(String::new());

        truncate_with_ellipsis(&parts.join("\n"), max_chars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::KnowledgeBase;

    fn catalog() -> KnowledgeCatalog {
        KnowledgeBase::builtin().unwrap().catalog
    }

    #[test]
    fn test_capability_match_and_fallback() {
        let catalog = catalog();
        let matched = catalog.relevant_capabilities("Hosting must run on Kubernetes.");
        assert!(matched.iter().any(|c| c.name == "Cloud Platform Engineering"));
        assert!(matched.iter().all(|c| c.name != "Case Management Platforms"));

        let fallback = catalog.relevant_capabilities("zzz");
        assert_eq!(fallback.len(), FALLBACK_ENTRIES);
        assert_eq!(fallback[0].name, catalog.capabilities[0].name);
    }

    #[test]
    fn test_case_study_scoring() {
        let catalog = catalog();
        // healthcare industry (+2) plus kafka and fhir technologies
        let studies = catalog.relevant_case_studies(
            "Healthcare referral integration using Kafka and FHIR",
        );
        assert_eq!(studies[0].title, "Patient Referral Integration");
        assert!(studies.len() <= MAX_CASE_STUDIES);

        assert!(catalog.relevant_case_studies("zzz").is_empty());
    }

    #[test]
    fn test_accelerator_match_by_use_case() {
        let catalog = catalog();
        let accels = catalog.relevant_accelerators("We need a landing zone");
        assert_eq!(accels.len(), 1);
        assert_eq!(accels[0].name, "nwLanding");
        assert_eq!(catalog.relevant_accelerators("zzz").len(), FALLBACK_ENTRIES);
    }

    #[test]
    fn test_format_is_bounded() {
        let catalog = catalog();
        let full = catalog.format_for_prompt("Kubernetes hosting", usize::MAX);
        assert!(full.starts_with("NORTHWIND DIGITAL COMPANY OVERVIEW:"));
        assert!(full.contains("KEY DIFFERENTIATORS:"));
        assert!(full.matches("\n• ").count() >= MAX_DIFFERENTIATORS);

        let short = catalog.format_for_prompt("Kubernetes hosting", 200);
        assert_eq!(short.chars().count(), 203);
        assert!(short.ends_with("..."));
    }
}
