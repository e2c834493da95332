use std::sync::{LazyLock, Mutex, PoisonError};

use serde::Serialize;
use serde_json::Value;

use super::cache::BoundedCache;
use super::rules::{person_name_span, RedactionRule, RuleSpec, DEFAULT_RULES, EXISTING_TOKEN};
use super::RedactionError;
use crate::models::enums::RedactionCategory;

pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Result of a single redaction pass with per-rule accounting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedactionOutcome {
    pub text: String,
    /// Names of rules that replaced at least one span, in rule order.
    pub rules_applied: Vec<String>,
    pub replacements: usize,
}

#[derive(Debug)]
struct Segment {
    text: String,
    protected: bool,
}

/// Ordered-rule redactor with a bounded memo cache.
pub struct Redactor {
    rules: Vec<RedactionRule>,
    cache: Mutex<BoundedCache<String, String>>,
    /// Only valid for the built-in rules; custom rules always run in full.
    fast_path: bool,
}

impl Redactor {
    /// Redactor with the built-in rule set.
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            rules: DEFAULT_RULES.clone(),
            cache: Mutex::new(BoundedCache::new(cache_capacity)),
            fast_path: true,
        }
    }

    /// Redactor with a caller-supplied rule list, applied in the given order.
    pub fn with_rules(specs: &[RuleSpec], cache_capacity: usize) -> Result<Self, RedactionError> {
        if specs.is_empty() {
            return Err(RedactionError::NoRules);
        }
        let rules = specs
            .iter()
            .map(RedactionRule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            rules,
            cache: Mutex::new(BoundedCache::new(cache_capacity)),
            fast_path: false,
        })
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name.as_str()).collect()
    }

    /// De-identify `text`. Never fails; repeated inputs are served from cache.
    pub fn redact(&self, text: &str) -> String {
        if self.fast_path && !likely_contains_sensitive_data(text) {
            return text.to_string();
        }

        {
            let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(hit) = cache.get(&text.to_string()) {
                return hit.clone();
            }
        }

        let outcome = self.apply_rules(text);
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.insert(text.to_string(), outcome.text.clone());
        outcome.text
    }

    /// Like [`Redactor::redact`] but reports which rules fired. Bypasses the cache.
    pub fn redact_with_stats(&self, text: &str) -> RedactionOutcome {
        if self.fast_path && !likely_contains_sensitive_data(text) {
            return RedactionOutcome {
                text: text.to_string(),
                rules_applied: Vec::new(),
                replacements: 0,
            };
        }
        self.apply_rules(text)
    }

    pub fn redact_batch<S: AsRef<str>>(&self, texts: &[S]) -> Vec<String> {
        texts.iter().map(|t| self.redact(t.as_ref())).collect()
    }

    /// Redact every string leaf of a JSON value. Keys, numbers, booleans and
    /// nulls pass through unchanged.
    pub fn redact_structured(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.redact(s)),
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.redact_structured(v)).collect())
            }
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.redact_structured(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    pub fn clear_cache(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn cache_len(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn apply_rules(&self, text: &str) -> RedactionOutcome {
        let mut segments = initial_segments(text);
        let mut rules_applied = Vec::new();
        let mut replacements = 0;

        for rule in &self.rules {
            let mut next = Vec::with_capacity(segments.len());
            let mut count = 0;
            for segment in segments {
                if segment.protected {
                    next.push(segment);
                } else {
                    count += apply_rule(rule, &segment.text, &mut next);
                }
            }
            segments = next;
            if count > 0 {
                rules_applied.push(rule.name.clone());
                replacements += count;
            }
        }

        if replacements > 0 {
            tracing::debug!(replacements, rules = rules_applied.len(), "Redaction applied");
        }

        RedactionOutcome {
            text: segments.into_iter().map(|s| s.text).collect(),
            rules_applied,
            replacements,
        }
    }
}

/// Split input so tokens from an earlier pass start out protected.
fn initial_segments(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut last = 0;
    for token in EXISTING_TOKEN.find_iter(text) {
        if token.start() > last {
            segments.push(Segment {
                text: text[last..token.start()].to_string(),
                protected: false,
            });
        }
        segments.push(Segment {
            text: token.as_str().to_string(),
            protected: true,
        });
        last = token.end();
    }
    if last < text.len() || segments.is_empty() {
        segments.push(Segment {
            text: text[last..].to_string(),
            protected: false,
        });
    }
    segments
}

fn next_boundary(text: &str, at: usize) -> usize {
    at + text[at..].chars().next().map_or(1, char::len_utf8)
}

/// Run one rule over an unprotected segment, pushing the pieces to `out`.
/// Returns the number of replacements made.
fn apply_rule(rule: &RedactionRule, text: &str, out: &mut Vec<Segment>) -> usize {
    let mut count = 0;
    let mut emitted = 0;
    let mut pos = 0;

    while pos < text.len() {
        let Some(caps) = rule.pattern.captures_at(text, pos) else {
            break;
        };
        let Some(whole) = caps.get(0) else {
            break;
        };
        if whole.start() == whole.end() {
            if whole.end() >= text.len() {
                break;
            }
            pos = next_boundary(text, whole.end());
            continue;
        }

        let (start, end, replacement) = if rule.category == RedactionCategory::Name {
            match person_name_span(whole.as_str()) {
                Some((s, e)) => (whole.start() + s, whole.start() + e, rule.replacement.clone()),
                None => {
                    // Retry from the next word so a rejected prefix does not
                    // hide a real name later in the same match.
                    let first_word = whole
                        .as_str()
                        .find(char::is_whitespace)
                        .unwrap_or(whole.len());
                    pos = (whole.start() + first_word).max(next_boundary(text, whole.start()));
                    continue;
                }
            }
        } else {
            let mut expanded = String::new();
            caps.expand(&rule.replacement, &mut expanded);
            (whole.start(), whole.end(), expanded)
        };

        if start > emitted {
            out.push(Segment {
                text: text[emitted..start].to_string(),
                protected: false,
            });
        }
        out.push(Segment {
            text: replacement,
            protected: true,
        });
        count += 1;
        emitted = end;
        pos = end;
    }

    if emitted < text.len() {
        out.push(Segment {
            text: text[emitted..].to_string(),
            protected: false,
        });
    }
    count
}

/// Cheap pre-check for the built-in rules. Every built-in pattern needs an
/// `@`, at least four digits, or mixed-case letters, so a string with none of
/// those cannot match and is returned untouched.
pub fn likely_contains_sensitive_data(text: &str) -> bool {
    if text.contains('@') {
        return true;
    }
    if text.chars().filter(char::is_ascii_digit).count() >= 4 {
        return true;
    }
    let has_upper = text.chars().any(char::is_uppercase);
    let has_lower = text.chars().any(char::is_lowercase);
    has_upper && has_lower
}

static GLOBAL: LazyLock<Redactor> = LazyLock::new(|| Redactor::new(DEFAULT_CACHE_CAPACITY));

/// Process-wide redactor with the built-in rules.
pub fn global() -> &'static Redactor {
    &GLOBAL
}

pub fn redact(text: &str) -> String {
    GLOBAL.redact(text)
}

pub fn redact_structured(value: &Value) -> Value {
    GLOBAL.redact_structured(value)
}

pub fn clear_cache() {
    GLOBAL.clear_cache();
}
