use serde::{Deserialize, Serialize};

pub const FALLBACK_CATEGORY: &str = "Other";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub folder: String,
    pub keywords: Vec<String>,
}

impl CategoryRule {
    pub fn new(folder: &str, keywords: &[&str]) -> Self {
        Self {
            folder: folder.to_string(),
            keywords: keywords.iter().map(|kw| kw.to_lowercase()).collect(),
        }
    }

    fn matches(&self, lowered_name: &str) -> bool {
        self.keywords
            .iter()
            .any(|kw| !kw.is_empty() && lowered_name.contains(&kw.to_lowercase()))
    }
}

/// Ordered keyword rules that group files into subfolders. Order matters:
/// "combined maths" must be tried before "math".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRules {
    rules: Vec<CategoryRule>,
}

impl CategoryRules {
    pub fn new(rules: Vec<CategoryRule>) -> Self {
        Self { rules }
    }

    pub fn detect(&self, name: &str) -> &str {
        let lowered = name.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&lowered))
            .map(|rule| rule.folder.as_str())
            .unwrap_or(FALLBACK_CATEGORY)
    }
}

impl Default for CategoryRules {
    fn default() -> Self {
        Self::new(vec![
            CategoryRule::new("Biology", &["biology"]),
            CategoryRule::new("Physics", &["physics"]),
            CategoryRule::new("Chemistry", &["chemistry"]),
            CategoryRule::new("Combined Mathematics", &["combined math", "combined maths"]),
            CategoryRule::new("Mathematics", &["mathematics", "math"]),
            CategoryRule::new("ICT", &["ict", "information communication technology"]),
            CategoryRule::new("English", &["english"]),
            CategoryRule::new("Western Music", &["western music"]),
            CategoryRule::new("Agriculture", &["agriculture"]),
            CategoryRule::new("Tamil", &["tamil"]),
            CategoryRule::new("Sinhala", &["sinhala"]),
            CategoryRule::new("Health", &["health"]),
            CategoryRule::new("Geography", &["geography"]),
            CategoryRule::new("History", &["history"]),
            CategoryRule::new("Science", &["science"]),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_matching_rule_wins() {
        let rules = CategoryRules::default();
        assert_eq!(rules.detect("Combined Maths Paper I"), "Combined Mathematics");
        assert_eq!(rules.detect("Grade 12 Mathematics"), "Mathematics");
        assert_eq!(rules.detect("PHYSICS - Unit 3"), "Physics");
        assert_eq!(rules.detect("Political Science"), "Science");
    }

    #[test]
    fn unmatched_falls_back_to_other() {
        let rules = CategoryRules::default();
        assert_eq!(rules.detect("Dancing"), FALLBACK_CATEGORY);
    }

    #[test]
    fn custom_rules_replace_defaults() {
        let rules = CategoryRules::new(vec![CategoryRule::new("Lectures", &["Lecture"])]);
        assert_eq!(rules.detect("lecture 04"), "Lectures");
        assert_eq!(rules.detect("Biology"), FALLBACK_CATEGORY);
    }
}
