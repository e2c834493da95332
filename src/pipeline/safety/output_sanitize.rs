//! Cleanup of raw completion output before grounding checks.

use std::sync::LazyLock;

use regex::Regex;

static THINK_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<think>.*?</think>").expect("valid regex"));
static UNUSED_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<unused\d+>").expect("valid regex"));

/// Strip reasoning blocks and tokenizer artifacts from completion output.
///
/// An unterminated `<think>` drops everything after it. A `<unusedN>thought`
/// prefix is treated as a reasoning block ending at the first blank line.
pub fn sanitize_model_output(raw: &str) -> String {
    let mut text = THINK_BLOCK_RE.replace_all(raw, "").into_owned();

    if let Some(open) = text.find("<think>") {
        text.truncate(open);
    }

    if let Some(idx) = text.find("<unused") {
        if let Some(offset) = text[idx..].find("thought\n") {
            let rest = &text[idx + offset + "thought\n".len()..];
            let body = rest.split_once("\n\n").map_or(rest, |(_, after)| after);
            text = format!("{}{}", &text[..idx], body);
        }
    }

    UNUSED_TOKEN_RE.replace_all(&text, "").trim().to_string()
}
