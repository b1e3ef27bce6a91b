//! Facts about the bidding company that never need a clarification question.

use serde::{Deserialize, Serialize};

const PRICING_KEYWORDS: &[&str] = &["pricing", "cost", "price", "budget", "fee"];
const COMPANY_KEYWORDS: &[&str] = &["company", "firm", "organization", "vendor"];
const CERTIFICATION_KEYWORDS: &[&str] = &["certification", "certified", "cert"];

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanyProfile {
    pub name: String,
    pub website: String,
    pub established: String,
    pub entities: Vec<String>,
    pub primary_platforms: Vec<String>,
    pub secondary_platforms: Vec<String>,
    pub technologies: Vec<String>,
    pub certifications: Vec<String>,
    pub pricing_models: Vec<String>,
    pub pricing_approach: String,
    pub standard_processes: Vec<String>,
    pub methodologies: Vec<String>,
}

fn find<'a>(topic: &str, items: &'a [String]) -> Option<&'a String> {
    items
        .iter()
        .find(|item| !item.is_empty() && topic.contains(&item.to_lowercase()))
}

fn has_keyword(topic: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| topic.contains(k))
}

impl CompanyProfile {
    fn platforms(&self) -> impl Iterator<Item = &String> {
        self.primary_platforms
            .iter()
            .chain(self.secondary_platforms.iter())
    }

    /// True when `topic` touches something the profile already answers.
    pub fn has_info(&self, topic: &str) -> bool {
        let topic = topic.to_lowercase();
        let platforms: Vec<String> = self.platforms().cloned().collect();

        find(&topic, &platforms).is_some()
            || find(&topic, &self.technologies).is_some()
            || find(&topic, &self.certifications).is_some()
            || has_keyword(&topic, PRICING_KEYWORDS)
            || find(&topic, &self.standard_processes).is_some()
            || find(&topic, &self.methodologies).is_some()
            || has_keyword(&topic, COMPANY_KEYWORDS)
    }

    pub fn get_info(&self, topic: &str) -> Option<String> {
        let topic = topic.to_lowercase();

        if let Some(platform) = find(&topic, &self.primary_platforms) {
            return Some(format!("{}'s primary platform is {}.", self.name, platform));
        }
        if let Some(platform) = find(&topic, &self.secondary_platforms) {
            return Some(format!("{} also works with {}.", self.name, platform));
        }
        if let Some(tech) = find(&topic, &self.technologies) {
            return Some(format!("{} has expertise in {}.", self.name, tech));
        }
        if has_keyword(&topic, PRICING_KEYWORDS) {
            return Some(self.pricing_approach.clone());
        }
        if has_keyword(&topic, CERTIFICATION_KEYWORDS) || find(&topic, &self.certifications).is_some() {
            if self.certifications.is_empty() {
                return Some("Certification information is available upon request.".to_string());
            }
            return Some(format!(
                "{} holds the following certifications: {}.",
                self.name,
                self.certifications.join(", ")
            ));
        }
        if let Some(process) = find(&topic, &self.standard_processes) {
            return Some(format!("{} uses {} as a standard process.", self.name, process));
        }
        if let Some(method) = find(&topic, &self.methodologies) {
            return Some(format!("{} employs {} methodology.", self.name, method));
        }
        if has_keyword(&topic, COMPANY_KEYWORDS) {
            return Some(format!(
                "{} ({}) was established in {}.",
                self.name, self.website, self.established
            ));
        }
        None
    }

    pub fn known_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.platforms().cloned().collect();
        topics.extend(self.technologies.iter().cloned());
        topics.extend(self.certifications.iter().cloned());
        topics.extend(["pricing", "cost", "price"].map(String::from));
        topics.extend(self.standard_processes.iter().cloned());
        topics.extend(self.methodologies.iter().cloned());
        topics.extend(["company", "firm", "organization"].map(String::from));
        topics
    }

    pub fn format_for_prompt(&self) -> String {
        let mut parts = vec![
            "KNOWN COMPANY INFORMATION (Do NOT ask questions about these):".to_string(),
            "=".repeat(80),
            format!("Company: {} ({})", self.name, self.website),
            format!("Established: {}", self.established),
            String::new(),
        ];

        let mut section = |title: &str, items: &[String]| {
            if items.is_empty() {
                return;
            }
            parts.push(format!("{}:", title));
            parts.extend(items.iter().map(|i| format!("  - {}", i)));
            parts.push(String::new());
        };
        section("Primary Platforms", &self.primary_platforms);
        section("Secondary Platforms", &self.secondary_platforms);
        section("Technologies", &self.technologies);
        section("Certifications", &self.certifications);
        section("Standard Processes", &self.standard_processes);

        parts.push("Pricing Approach:".to_string());
        parts.push(format!("  {}", self.pricing_approach));
        parts.push(String::new());
        parts.join("\n")
    }
}
