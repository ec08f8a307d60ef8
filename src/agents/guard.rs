//! Health-topic guard
//!
//! Cheap local check that a message is plausibly about health before any
//! backend call is made. Keyword matching uses a prebuilt Aho-Corasick
//! automaton so the check stays constant-cost as the vocabulary grows.

use aho_corasick::AhoCorasick;
use once_cell::sync::Lazy;
use regex::Regex;

/// Reply sent when a message is off topic.
pub const OFF_TOPIC_REFUSAL: &str = "I'm a medical advice chatbot specialized in healthcare and medical topics. I can only help you with health-related questions, symptoms, treatments, medical procedures, finding doctors or hospitals, and other medical concerns.\n\nPlease ask me something related to health or medicine, and I'll be happy to help you!";

const MEDICAL_KEYWORDS: &[&str] = &[
    "health",
    "medical",
    "doctor",
    "hospital",
    "clinic",
    "medicine",
    "medication",
    "symptom",
    "treatment",
    "diagnosis",
    "therapy",
    "pain",
    "illness",
    "disease",
    "condition",
    "surgery",
    "prescription",
    "nurse",
    "physician",
    "specialist",
    "emergency",
    "urgent",
    "fever",
    "headache",
    "cough",
    "injury",
    "wound",
    "infection",
    "virus",
    "bacteria",
    "cancer",
    "diabetes",
    "heart",
    "blood",
];

static MEDICAL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\bfeel(ing)?\s+(sick|ill|unwell|bad)\b",
        r"\bhurt(s|ing)?\b",
        r"\bache(s|d)?\b",
        r"\bwhat\s+(is|could\s+be)\s+(wrong|causing)\b",
        r"\bshould\s+i\s+see\s+(a|an)\b",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static KEYWORD_MATCHER: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(MEDICAL_KEYWORDS)
        .expect("fixed literal keyword set")
});

/// Keyword and pattern matcher for health-related text.
#[derive(Default)]
pub struct HealthTopicGuard;

impl HealthTopicGuard {
    pub fn new() -> Self {
        Self
    }

    /// Whether the text plausibly concerns health or medicine.
    pub fn is_health_related(&self, text: &str) -> bool {
        if KEYWORD_MATCHER.is_match(text) {
            return true;
        }
        let lower = text.to_lowercase();
        MEDICAL_PATTERNS.iter().any(|p| p.is_match(&lower))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_match() {
        let guard = HealthTopicGuard::new();
        assert!(guard.is_health_related("I need to find a doctor"));
        assert!(guard.is_health_related("what medication helps with fever"));
        assert!(guard.is_health_related("HEALTH question"));
    }

    #[test]
    fn test_pattern_match_without_keywords() {
        let guard = HealthTopicGuard::new();
        assert!(guard.is_health_related("my knee hurts when I run"));
        assert!(guard.is_health_related("I'm feeling sick today"));
        assert!(guard.is_health_related("what could be causing this"));
    }

    #[test]
    fn test_off_topic_rejected() {
        let guard = HealthTopicGuard::new();
        assert!(!guard.is_health_related("what's the capital of France"));
        assert!(!guard.is_health_related("write me a poem about autumn"));
        assert!(!guard.is_health_related("how do I fix my car engine"));
    }

    #[test]
    fn test_substring_keywords_count() {
        let guard = HealthTopicGuard::new();
        // "symptom" matches inside "symptoms"
        assert!(guard.is_health_related("describe your symptoms"));
    }
}
