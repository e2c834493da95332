use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::RedactionError;
use crate::models::enums::RedactionCategory;

/// Serializable rule definition. Custom rule lists are built from these.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleSpec {
    pub name: String,
    pub pattern: String,
    /// Replacement template; `${1}` expands to the first capture group.
    pub replacement: String,
    pub category: RedactionCategory,
}

/// A compiled redaction rule.
#[derive(Debug, Clone)]
pub struct RedactionRule {
    pub name: String,
    pub pattern: Regex,
    pub replacement: String,
    pub category: RedactionCategory,
}

impl RedactionRule {
    pub fn compile(spec: &RuleSpec) -> Result<Self, RedactionError> {
        let pattern = Regex::new(&spec.pattern).map_err(|e| RedactionError::InvalidPattern {
            name: spec.name.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            name: spec.name.clone(),
            pattern,
            replacement: spec.replacement.clone(),
            category: spec.category,
        })
    }
}

const MONTHS: &str = "Jan(?:uary)?|Feb(?:ruary)?|Mar(?:ch)?|Apr(?:il)?|May|June?|July?|Aug(?:ust)?|Sep(?:t(?:ember)?)?|Oct(?:ober)?|Nov(?:ember)?|Dec(?:ember)?";

fn spec(name: &str, pattern: &str, replacement: &str, category: RedactionCategory) -> RuleSpec {
    RuleSpec {
        name: name.into(),
        pattern: pattern.into(),
        replacement: replacement.into(),
        category,
    }
}

/// Built-in rules in application order. Identifier rules run before the
/// generic digit patterns so an SSN never degrades into a phone number.
pub fn default_rule_specs() -> Vec<RuleSpec> {
    use RedactionCategory::*;
    vec![
        spec(
            "mrn",
            r"(?i)(\b(?:mrn|medical\s+record(?:\s+(?:number|no\.?))?|record\s*(?:#|number|no\.?))\s*[:#]?\s*)[A-Z]{0,4}-?\d{4,}[A-Z0-9-]*",
            "${1}[REDACTED_MRN]",
            MedicalIdentifier,
        ),
        spec("ssn", r"\b\d{3}-\d{2}-\d{4}\b", "[REDACTED_SSN]", Identifier),
        spec(
            "ssn_labeled",
            r"(?i)(\b(?:ssn|social\s+security(?:\s+(?:number|no\.?))?)\s*[:#]?\s*)\d{9}\b",
            "${1}[REDACTED_SSN]",
            Identifier,
        ),
        spec(
            "payment_card",
            r"\b(?:\d{4}[ -]?){3}\d{4}\b",
            "[REDACTED_CARD]",
            Identifier,
        ),
        spec(
            "email",
            r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
            "[REDACTED_EMAIL]",
            Contact,
        ),
        spec(
            "phone",
            r"(?:\+?1[\s.-]?)?(?:\(\d{3}\)\s?|\b\d{3}[\s.-])\d{3}[\s.-]\d{4}\b",
            "[REDACTED_PHONE]",
            Contact,
        ),
        spec(
            "street_address",
            r"\b\d{1,5}\s+(?:[A-Z][a-z]+\s+){1,3}(?:Street|St|Avenue|Ave|Road|Rd|Boulevard|Blvd|Lane|Ln|Drive|Dr|Court|Ct|Way|Place|Pl|Terrace|Circle)\b\.?",
            "[REDACTED_ADDRESS]",
            Contact,
        ),
        spec(
            "date",
            &format!(
                r"\b(?:\d{{1,2}}[/-]\d{{1,2}}[/-]\d{{2,4}}|\d{{4}}-\d{{2}}-\d{{2}}|(?:{MONTHS})\.?\s+\d{{1,2}}(?:st|nd|rd|th)?,?\s+\d{{4}}|\d{{1,2}}\s+(?:{MONTHS})\.?,?\s+\d{{4}})\b"
            ),
            "[REDACTED_DATE]",
            Date,
        ),
        spec(
            "titled_name",
            r"\b(?:Dr|Mr|Mrs|Ms|Miss|Prof|Doctor)\.?[ \t]+[A-Z][a-zA-Z'-]+(?:[ \t]+[A-Z][a-zA-Z'-]+)?",
            "[REDACTED_NAME]",
            Name,
        ),
        spec(
            "full_name",
            r"\b[A-Z][a-z]+(?:[ \t]+[A-Z][a-z]+){1,3}\b",
            "[REDACTED_NAME]",
            Name,
        ),
    ]
}

pub static DEFAULT_RULES: LazyLock<Vec<RedactionRule>> = LazyLock::new(|| {
    default_rule_specs()
        .iter()
        .map(|spec| RedactionRule::compile(spec).expect("valid built-in redaction pattern"))
        .collect()
});

/// Matches a redaction token already present in the input.
pub(crate) static EXISTING_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[REDACTED_[A-Z_]+\]").expect("valid regex"));

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\S+").expect("valid regex"));

const TITLES: &[&str] = &["dr", "mr", "mrs", "ms", "miss", "prof", "doctor"];

/// Capitalized words that are not part of a person's name: sentence
/// starters, clinical vocabulary and calendar words.
const NON_NAME_WORDS: &[&str] = &[
    "a", "about", "after", "also", "an", "and", "any", "as", "at", "before", "but", "by",
    "call", "contact", "denies", "during", "email", "for", "from", "he", "her", "his", "if",
    "in", "is", "it", "no", "not", "of", "on", "or", "per", "please", "reach", "reports",
    "reported", "she", "since", "states", "the", "they", "this", "to", "was", "when", "with",
    "without", "patient", "patients", "client", "history", "family", "medical", "past",
    "current", "chief", "complaint", "reason", "visit", "review", "systems", "assessment",
    "plan", "diagnosis", "summary", "allergy", "allergies", "medication", "medications",
    "symptom", "symptoms", "onset", "severity", "social", "surgical", "surgery", "lifestyle",
    "notes", "note", "follow", "up", "clinic", "hospital", "emergency", "department", "room",
    "unit", "care", "primary", "blood", "pressure", "heart", "rate", "failure", "disease",
    "attack", "chest", "pain", "shortness", "breath", "headache", "fever", "cough", "nausea",
    "vomiting", "dizziness", "fatigue", "diabetes", "type", "asthma", "hypertension", "cancer",
    "stroke", "kidney", "liver", "lung", "acute", "chronic", "severe", "mild", "moderate",
    "left", "right", "upper", "lower", "no", "known", "drug", "allergic", "reaction", "red",
    "flag", "flags", "safety", "concern", "concerns", "mother", "father", "sister", "brother",
    "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday", "january",
    "february", "march", "april", "june", "july", "august", "september", "october",
    "november", "december", "yes", "none", "unknown", "street", "avenue", "road",
];

fn is_title(word: &str) -> bool {
    let word = word.trim_end_matches('.').to_ascii_lowercase();
    TITLES.contains(&word.as_str())
}

fn is_non_name(word: &str) -> bool {
    let word = word
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_ascii_lowercase();
    NON_NAME_WORDS.contains(&word.as_str())
}

/// Narrow a name-rule match to the span that looks like a person's name.
///
/// Leading titles and non-name words are kept in place; trailing non-name
/// words are dropped. A titled match needs one remaining word, an untitled
/// one needs two. Returns byte offsets relative to `matched`.
pub(crate) fn person_name_span(matched: &str) -> Option<(usize, usize)> {
    let words: Vec<regex::Match<'_>> = WORD.find_iter(matched).collect();

    let mut first = 0;
    let mut titled = false;
    while first < words.len() {
        let word = words[first].as_str();
        if is_title(word) {
            titled = true;
        } else if !is_non_name(word) {
            break;
        }
        first += 1;
    }

    let mut last = words.len();
    while last > first && is_non_name(words[last - 1].as_str()) {
        last -= 1;
    }

    let name_words = &words[first..last];
    if name_words.iter().any(|w| is_non_name(w.as_str()) || is_title(w.as_str())) {
        return None;
    }
    let required = if titled { 1 } else { 2 };
    if name_words.len() < required {
        return None;
    }
    Some((name_words[0].start(), name_words[name_words.len() - 1].end()))
}
