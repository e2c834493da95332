use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Maximum clinician query length in characters.
pub const MAX_QUERY_CHARS: usize = 2_000;

/// What sanitization changed, for logging. Carries no query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryModification {
    InvisibleUnicodeRemoved,
    ControlCharacterRemoved,
    InjectionPatternFiltered,
    Truncated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SanitizedQuery {
    pub text: String,
    pub modifications: Vec<QueryModification>,
}

impl SanitizedQuery {
    pub fn was_modified(&self) -> bool {
        !self.modifications.is_empty()
    }
}

/// Clean a clinician query before it is placed in a prompt. Never fails.
pub fn sanitize_clinician_query(raw_query: &str, max_chars: usize) -> SanitizedQuery {
    let mut modifications = Vec::new();

    let text = remove_invisible_unicode(raw_query);
    if text != raw_query {
        modifications.push(QueryModification::InvisibleUnicodeRemoved);
    }

    let cleaned = remove_control_characters(&text);
    if cleaned != text {
        modifications.push(QueryModification::ControlCharacterRemoved);
    }

    let filtered = filter_injection_patterns(&cleaned);
    if filtered != cleaned {
        modifications.push(QueryModification::InjectionPatternFiltered);
    }

    let mut text = filtered.trim().to_string();
    if text.chars().count() > max_chars {
        text = truncate_at_word_boundary(&text, max_chars);
        modifications.push(QueryModification::Truncated);
    }

    if !modifications.is_empty() {
        tracing::debug!(?modifications, "Clinician query sanitized");
    }

    SanitizedQuery {
        text,
        modifications,
    }
}

fn remove_invisible_unicode(text: &str) -> String {
    text.chars()
        .filter(|c| {
            !matches!(
                *c,
                '\u{200B}'..='\u{200F}'
                | '\u{202A}'..='\u{202E}'
                | '\u{2060}'..='\u{2064}'
                | '\u{2066}'..='\u{2069}'
                | '\u{FEFF}'
                | '\u{00AD}'
                | '\u{034F}'
                | '\u{061C}'
                | '\u{180E}'
            )
        })
        .collect()
}

/// Keep newline and tab; drop every other control character.
fn remove_control_characters(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

fn filter_injection_patterns(text: &str) -> String {
    static INJECTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
        [
            r"(?i)ignore\s+(?:all\s+)?(?:previous|above|prior|the\s+above)\s+(?:instructions?|rules?|prompts?|context)",
            r"(?i)disregard\s+(?:the\s+)?(?:patient\s+)?(?:records?|sources?|context|instructions?)",
            r"(?i)forget\s+(?:everything|all|your)\s+(?:previous|prior)?",
            r"(?i)new\s+instructions?:",
            r"(?i)you\s+are\s+now\s+(?:a|an)\s+",
            r"(?i)\bsystem\s*:",
            r"(?i)\bassistant\s*:",
            r"<<SYS>>",
            r"\[INST\]",
            r"<\|im_start\|>",
            r"<\|im_end\|>",
            r"(?i)</?CLINICIAN_QUERY>",
            r"(?i)(?:DAN|do\s+anything\s+now)\s+mode",
            r"(?i)answer\s+without\s+(?:citations?|sources?)",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("valid regex"))
        .collect()
    });

    let mut result = text.to_string();
    for pattern in INJECTION_PATTERNS.iter() {
        result = pattern.replace_all(&result, "[FILTERED]").into_owned();
    }
    result
}

/// Cut to at most `max_chars` characters, backing off to the last whitespace.
fn truncate_at_word_boundary(text: &str, max_chars: usize) -> String {
    let Some((cut, _)) = text.char_indices().nth(max_chars) else {
        return text.to_string();
    };
    let truncated = &text[..cut];
    match truncated.rfind(char::is_whitespace) {
        Some(pos) if pos > 0 => truncated[..pos].to_string(),
        _ => truncated.to_string(),
    }
}

/// Delimit the clinician query inside the prompt.
pub fn wrap_query_for_prompt(sanitized_query: &str) -> String {
    format!("<CLINICIAN_QUERY>\n{sanitized_query}\n</CLINICIAN_QUERY>")
}
