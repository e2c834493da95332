use std::sync::LazyLock;

use regex::Regex;

use crate::models::{Chunk, SourceRef};

/// `[3]`, `[S2]`, and lists such as `[1, 2]` or `[1, S1]`.
static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([Ss]?\d{1,3}(?:\s*,\s*[Ss]?\d{1,3})*)\]").expect("valid regex")
});
static FINAL_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d{1,3})\]").expect("valid regex"));

/// Answer text with citations rewritten to a single 1-based sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedCitations {
    pub text: String,
    /// `cited[k-1]` is the candidate index behind marker `[k]`. Candidates
    /// are the patient chunks followed by the literature chunks.
    pub cited: Vec<usize>,
}

/// Rewrite `[k]`/`[Sk]` markers so that `[k]` is the k-th distinct source in
/// order of first appearance. Markers pointing past the shown lists are
/// dropped together with the space before them.
pub fn normalize_citations(
    text: &str,
    patient_count: usize,
    literature_count: usize,
) -> NormalizedCitations {
    let mut cited: Vec<usize> = Vec::new();
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut dropped = 0usize;

    for caps in MARKER.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&text[last..whole.start()]);
        last = whole.end();

        let mut rendered = String::new();
        for item in caps[1].split(',').map(str::trim) {
            let (literature, digits) = match item.strip_prefix(['S', 's']) {
                Some(rest) => (true, rest),
                None => (false, item),
            };
            let Ok(n) = digits.parse::<usize>() else { continue };
            let target = if literature {
                (1..=literature_count).contains(&n).then(|| patient_count + n - 1)
            } else {
                (1..=patient_count).contains(&n).then(|| n - 1)
            };
            let Some(target) = target else {
                dropped += 1;
                continue;
            };
            let position = match cited.iter().position(|c| *c == target) {
                Some(p) => p,
                None => {
                    cited.push(target);
                    cited.len() - 1
                }
            };
            let marker = format!("[{}]", position + 1);
            if !rendered.contains(&marker) {
                rendered.push_str(&marker);
            }
        }

        if rendered.is_empty() {
            if out.ends_with(' ') {
                out.pop();
            }
        } else {
            out.push_str(&rendered);
        }
    }
    out.push_str(&text[last..]);

    if dropped > 0 {
        tracing::debug!(dropped, "Out-of-range citation markers removed");
    }

    NormalizedCitations { text: out, cited }
}

/// Build the citation list for `cited` candidate indices.
pub fn source_refs(cited: &[usize], candidates: &[&Chunk], excerpt_chars: usize) -> Vec<SourceRef> {
    cited
        .iter()
        .filter_map(|idx| candidates.get(*idx))
        .enumerate()
        .map(|(i, chunk)| SourceRef {
            index: i + 1,
            chunk_id: chunk.id,
            section: chunk.section.clone(),
            source_kind: chunk.source_kind,
            excerpt: excerpt(&chunk.text, excerpt_chars),
            url: chunk.source_url.clone(),
        })
        .collect()
}

/// True when every `[k]` in `text` has a matching `refs[k-1]`.
pub fn citations_resolve(text: &str, refs: &[SourceRef]) -> bool {
    FINAL_MARKER.captures_iter(text).all(|caps| match caps[1].parse::<usize>() {
        Ok(k) if k >= 1 => refs.get(k - 1).is_some_and(|r| r.index == k),
        _ => false,
    })
}

/// First `max_chars` characters, cut at a word boundary when one is close.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let Some((cut, _)) = text.char_indices().nth(max_chars) else {
        return text.to_string();
    };
    let head = &text[..cut];
    let head = match head.rfind(char::is_whitespace) {
        Some(pos) if pos >= cut / 2 => &head[..pos],
        _ => head,
    };
    format!("{}…", head.trim_end())
}
