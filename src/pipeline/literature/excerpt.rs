use std::sync::LazyLock;

use regex::Regex;

static SENTENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^.!?]+(?:[.!?]+|$)").expect("valid regex"));

/// Phrases that mark treatment, dosing or safety content.
static ACTIONABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)\b(?:treat\w*|therap\w*|dos(?:e|es|ing|age)|\d+\s?(?:mg|mcg|g|ml)\b|",
        r"administ\w*|recommend\w*|guideline\w*|first-line|contraindicat\w*|",
        r"adverse|side effects?|safety|risk\w*|interaction\w*|efficac\w*|",
        r"mortality|outcome\w*)",
    ))
    .expect("valid regex")
});

/// Sentences of `text` that carry actionable content, in original order,
/// bounded to `max_chars`. Falls back to the leading sentences when nothing
/// matches.
pub fn actionable_excerpt(text: &str, max_chars: usize) -> String {
    let sentences: Vec<&str> = SENTENCE
        .find_iter(text)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .collect();

    let matching: Vec<&str> = sentences
        .iter()
        .copied()
        .filter(|s| ACTIONABLE.is_match(s))
        .collect();
    let chosen = if matching.is_empty() { sentences } else { matching };

    let mut out = String::new();
    for sentence in chosen {
        let needed = sentence.chars().count() + usize::from(!out.is_empty());
        if out.chars().count() + needed > max_chars {
            if out.is_empty() {
                out = truncate_chars(sentence, max_chars);
            }
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(sentence);
    }
    out
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars.saturating_sub(1)) {
        Some((cut, _)) if max_chars > 0 => format!("{}…", text[..cut].trim_end()),
        Some(_) => String::new(),
        None => text.to_string(),
    }
}
