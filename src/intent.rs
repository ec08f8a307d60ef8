//! Fast local intent classification
//!
//! Classifies a raw user message into one of a closed set of intents using
//! keyword and regex scoring, so routing never pays reasoning-backend
//! latency. Classification is synchronous, deterministic, and infallible:
//! input that matches nothing becomes [`Intent::Fallback`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// The classified purpose of a user message.
///
/// Closed enumeration; every variant has a bound agent in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Greetings, introductions, small talk
    Greeting,
    /// Questions about symptoms and their causes
    SymptomInquiry,
    /// Questions about treatments, medication, self-care
    TreatmentInquiry,
    /// Seeking hospitals, clinics, or medical facilities
    HospitalSearch,
    /// Which medical department or specialist to consult
    DepartmentInquiry,
    /// In-depth research questions (studies, trials, breakthroughs)
    DeepResearch,
    /// Balanced, evidence-only view of a contested topic
    FactCheck,
    /// Full health assessment / checkup style requests
    ComprehensiveAssessment,
    /// Anything that matched no rule with confidence
    Fallback,
}

impl Intent {
    /// Every member of the enumeration, used for registry completeness checks.
    pub const ALL: [Intent; 9] = [
        Intent::Greeting,
        Intent::SymptomInquiry,
        Intent::TreatmentInquiry,
        Intent::HospitalSearch,
        Intent::DepartmentInquiry,
        Intent::DeepResearch,
        Intent::FactCheck,
        Intent::ComprehensiveAssessment,
        Intent::Fallback,
    ];

    /// Stable wire/log name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Greeting => "greeting",
            Intent::SymptomInquiry => "symptom_inquiry",
            Intent::TreatmentInquiry => "treatment_inquiry",
            Intent::HospitalSearch => "hospital_search",
            Intent::DepartmentInquiry => "department_inquiry",
            Intent::DeepResearch => "deep_research",
            Intent::FactCheck => "fact_check",
            Intent::ComprehensiveAssessment => "comprehensive_assessment",
            Intent::Fallback => "fallback",
        }
    }

    /// Whether answers for this intent carry the medical-advice disclaimer
    /// regardless of position in the conversation.
    pub fn is_medical_advice(&self) -> bool {
        matches!(
            self,
            Intent::SymptomInquiry
                | Intent::TreatmentInquiry
                | Intent::DepartmentInquiry
                | Intent::ComprehensiveAssessment
                | Intent::Fallback
        )
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detection rule: keywords, regex patterns, and a fixed priority.
///
/// Higher-priority rules are listed first so score ties resolve toward the
/// more specific category.
struct IntentRule {
    intent: Intent,
    keywords: &'static [&'static str],
    patterns: Vec<Regex>,
    priority: u32,
}

impl IntentRule {
    fn new(
        intent: Intent,
        keywords: &'static [&'static str],
        patterns: &[&str],
        priority: u32,
    ) -> Self {
        // Malformed patterns are skipped rather than aborting classification.
        let patterns = patterns.iter().filter_map(|p| Regex::new(p).ok()).collect();
        Self {
            intent,
            keywords,
            patterns,
            priority,
        }
    }

    /// Score this rule against normalized input. Keyword hits are weighted by
    /// 10x priority, pattern hits by 20x.
    fn score(&self, normalized: &str) -> f64 {
        let mut score = 0.0;

        let keyword_matches = self
            .keywords
            .iter()
            .filter(|k| normalized.contains(*k))
            .count();
        if keyword_matches > 0 {
            score += keyword_matches as f64 / self.keywords.len() as f64
                * self.priority as f64
                * 10.0;
        }

        let pattern_matches = self
            .patterns
            .iter()
            .filter(|p| p.is_match(normalized))
            .count();
        if pattern_matches > 0 {
            score += pattern_matches as f64 / self.patterns.len() as f64
                * self.priority as f64
                * 20.0;
        }

        score
    }
}

/// Minimum winning score. Anything weaker classifies as [`Intent::Fallback`].
const CONFIDENCE_FLOOR: f64 = 10.0;

static RULES: Lazy<Vec<IntentRule>> = Lazy::new(|| {
    vec![
        IntentRule::new(
            Intent::Greeting,
            &[
                "hello",
                "hi ",
                "hey",
                "good morning",
                "good afternoon",
                "good evening",
                "greetings",
            ],
            &[
                r"^(hello|hi|hey|good\s+(morning|afternoon|evening)|greetings?)\b",
                r"^(start|begin|let's start)",
                r"^(how are you|what's up)",
            ],
            10,
        ),
        IntentRule::new(
            Intent::SymptomInquiry,
            &[
                "pain", "hurt", "ache", "symptom", "sick", "nausea", "fever", "headache", "cough",
                "sore", "tired", "fatigue", "dizzy", "rash", "swelling", "bleeding",
                "shortness of breath",
            ],
            &[
                r"\b(pain|hurts?|aches?|aching)\b",
                r"\bfeel(ing)?\s+(sick|unwell|bad|awful|terrible)\b",
                r"\bhave\s+(a\s+|an\s+)?(symptoms?|fever|headache|cough|rash)\b",
                r"\bexperiencing\b",
                r"\bwhat\s+(is|could\s+be)\s+(wrong|causing)\b",
                r"\bwhy\s+(do\s+i|am\s+i)\s+(feel|have)\b",
            ],
            8,
        ),
        IntentRule::new(
            Intent::TreatmentInquiry,
            &[
                "treatment",
                "medicine",
                "medication",
                "cure",
                "remedy",
                "therapy",
                "heal",
                "drug",
                "prescription",
                "dose",
                "dosage",
                "antibiotic",
                "pill",
                "tablet",
            ],
            &[
                r"\b(treatment|therapy|cure|remedy)\s+(for|of)\b",
                r"\bhow\s+to\s+(treat|cure|heal)\b",
                r"\b(medicine|medication|drug|prescription)\s+(for|to)\b",
                r"\bwhat\s+(medicine|medication|drug|treatment)\b",
                r"\b(dosage|dose|how\s+much)\b",
            ],
            7,
        ),
        IntentRule::new(
            Intent::HospitalSearch,
            &[
                "hospital",
                "clinic",
                "doctor",
                "physician",
                "medical center",
                "emergency room",
                "urgent care",
                "near me",
                "nearby",
                "location",
                "address",
            ],
            &[
                r"\b(hospital|clinic|medical\s+center)s?\s+(near|nearby|close)\b",
                r"\bfind\s+(a\s+|an\s+)?(hospital|clinic|doctor|physician)\b",
                r"\bwhere\s+(is|can\s+i\s+find)\b",
                r"\b(emergency\s+room|urgent\s+care)\b",
                r"\b(near\s+me|nearby|in\s+my\s+area)\b",
            ],
            6,
        ),
        IntentRule::new(
            Intent::DepartmentInquiry,
            &[
                "specialist",
                "department",
                "cardiology",
                "neurology",
                "dermatology",
                "orthopedic",
                "pediatric",
                "oncology",
                "psychiatry",
                "gynecology",
                "urology",
            ],
            &[
                r"\bwhat\s+(specialist|department)\b",
                r"\bwhich\s+(doctor|specialist|department)\b",
                r"\bshould\s+i\s+see\s+(a|an)\b",
                r"\b(cardiology|neurology|dermatology|orthopedics?|pediatrics?|oncology|psychiatry|gynecology|urology)\b",
            ],
            5,
        ),
        IntentRule::new(
            Intent::DeepResearch,
            &[
                "research",
                "study",
                "clinical trial",
                "breakthrough",
                "latest",
                "recent",
                "scientific",
                "publication",
            ],
            &[
                r"\b(latest|recent|new)\s+(research|study|studies|breakthroughs?|advances?)\b",
                r"\b(clinical\s+trials?|medical\s+stud(y|ies))\b",
                r"\bscientific\s+(evidence|publications?|papers?)\b",
                r"\bresearch\s+(shows|indicates|suggests)\b",
                r"\bwhat\s+(does|do)\s+(research|studies)\s+say\b",
            ],
            4,
        ),
        IntentRule::new(
            Intent::FactCheck,
            &[
                "facts",
                "evidence",
                "pros and cons",
                "advantages",
                "disadvantages",
                "unbiased",
                "objective",
                "compare",
                "comparison",
                "versus",
                " vs ",
            ],
            &[
                r"\bpros\s+and\s+cons\b",
                r"\badvantages?\s+and\s+disadvantages?\b",
                r"\b(unbiased|objective|neutral)\s+(view|information|facts)\b",
                r"\b(compare|comparison|versus|vs\.?)\b",
                r"\b(fact|facts|evidence)\s+(about|on)\b",
            ],
            3,
        ),
        IntentRule::new(
            Intent::ComprehensiveAssessment,
            &[
                "comprehensive",
                "thorough",
                "assessment",
                "evaluation",
                "checkup",
                "overall health",
                "general health",
            ],
            &[
                r"\b(complete|comprehensive|full|thorough)\s+(assessment|evaluation|checkup|analysis)\b",
                r"\b(overall|general)\s+health\b",
                r"\bhealth\s+(assessment|evaluation|analysis|check)\b",
                r"\bassess\s+my\s+(health|condition)\b",
            ],
            2,
        ),
    ]
});

/// Deterministic keyword/pattern intent classifier.
///
/// Stateless; `classify` is a pure function of its input and the static
/// rule table. Construction exists so callers hold it like any other
/// component and tests can name it.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntentClassifier;

impl IntentClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify raw user text. Never fails; weak or absent matches yield
    /// [`Intent::Fallback`].
    pub fn classify(&self, raw: &str) -> Intent {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return Intent::Fallback;
        }

        let mut best = Intent::Fallback;
        let mut best_score = 0.0_f64;
        for rule in RULES.iter() {
            let score = rule.score(&normalized);
            // Strict comparison: ties resolve to the earlier (higher
            // priority) rule, keeping classification order-stable.
            if score > best_score {
                best = rule.intent;
                best_score = score;
            }
        }

        if best_score >= CONFIDENCE_FLOOR {
            best
        } else {
            Intent::Fallback
        }
    }
}
