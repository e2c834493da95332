use std::cmp::Ordering;
use std::sync::Arc;

use futures_util::future::join_all;

use super::entrez::EntrezSource;
use super::excerpt::actionable_excerpt;
use super::rate_limit::RateLimiter;
use super::{LiteratureError, LiteratureSource};
use crate::config::LiteratureConfig;
use crate::models::ExternalSnippet;
use crate::pipeline::rag::CaseContext;
use crate::pipeline::redaction;
use crate::pipeline::storage::embedder::tokenize;

const MAX_QUERY_TERMS: usize = 8;
const MAX_CONTEXT_TERMS: usize = 3;

const STOPWORDS: &[&str] = &[
    "a", "about", "an", "and", "any", "are", "as", "at", "be", "been", "by", "can", "could",
    "did", "do", "does", "for", "from", "has", "have", "he", "her", "his", "how", "in", "is",
    "it", "its", "me", "of", "on", "or", "patient", "patients", "she", "should", "tell", "than",
    "that", "the", "their", "there", "they", "this", "to", "was", "we", "were", "what", "when",
    "which", "who", "why", "will", "with", "would", "you",
];

struct SourceSlot {
    source: Arc<dyn LiteratureSource>,
    limiter: RateLimiter,
}

/// Fans a query out to every configured source and merges the results.
pub struct ExternalSearch {
    sources: Vec<SourceSlot>,
    max_results: usize,
    excerpt_chars: usize,
}

impl ExternalSearch {
    pub fn new(max_results: usize, excerpt_chars: usize) -> Self {
        Self {
            sources: Vec::new(),
            max_results,
            excerpt_chars,
        }
    }

    /// Add a source with its own requests-per-minute quota.
    pub fn with_source(
        mut self,
        source: Arc<dyn LiteratureSource>,
        requests_per_minute: u32,
    ) -> Self {
        self.sources.push(SourceSlot {
            source,
            limiter: RateLimiter::new(requests_per_minute),
        });
        self
    }

    pub fn from_config(config: &LiteratureConfig) -> Result<Self, LiteratureError> {
        let mut search = Self::new(config.max_results, config.excerpt_chars);
        for source_config in &config.sources {
            let rpm = source_config.requests_per_minute;
            let source = EntrezSource::new(source_config.clone(), config.timeout_secs)?;
            search = search.with_source(Arc::new(source), rpm);
        }
        Ok(search)
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.source.name()).collect()
    }

    /// Search every source concurrently. Failing or rate-limited sources
    /// contribute nothing; the call itself never fails.
    pub async fn search(&self, query: &str, context: &CaseContext) -> Vec<ExternalSnippet> {
        let term = literature_query(query, context);
        if term.is_empty() || self.sources.is_empty() {
            return vec![];
        }

        let per_source = join_all(self.sources.iter().map(|slot| {
            let term = term.as_str();
            async move {
                let name = slot.source.name();
                if !slot.limiter.try_acquire() {
                    tracing::info!(source = %name, "Literature source over quota, skipped");
                    return vec![];
                }
                match slot.source.search(term, self.max_results).await {
                    Ok(snippets) => snippets,
                    Err(e) => {
                        tracing::warn!(source = %name, error = %e, "Literature source failed");
                        vec![]
                    }
                }
            }
        }))
        .await;

        let mut merged: Vec<ExternalSnippet> = per_source.into_iter().flatten().collect();
        merged.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(Ordering::Equal));
        merged.truncate(self.max_results);
        for snippet in &mut merged {
            snippet.abstract_text = actionable_excerpt(&snippet.abstract_text, self.excerpt_chars);
        }

        tracing::info!(
            sources = self.sources.len(),
            snippets = merged.len(),
            "Literature search complete"
        );
        merged
    }
}

/// Redacted keyword query: significant query terms plus a few context terms.
/// Both parts cross the trust boundary, so each is redacted before it is
/// tokenized.
pub fn literature_query(query: &str, context: &CaseContext) -> String {
    let mut terms: Vec<String> = Vec::new();
    for token in significant_terms(query) {
        if terms.len() == MAX_QUERY_TERMS {
            break;
        }
        if !terms.contains(&token) {
            terms.push(token);
        }
    }

    let mut added = 0;
    for token in context.search_terms().iter().flat_map(|t| significant_terms(t)) {
        if added == MAX_CONTEXT_TERMS {
            break;
        }
        if !terms.contains(&token) {
            terms.push(token);
            added += 1;
        }
    }

    terms.join(" ")
}

/// Lowercased tokens of `text` after redaction, with redaction tokens,
/// stopwords, short tokens and bare numbers removed.
fn significant_terms(text: &str) -> Vec<String> {
    let redacted = redaction::redact(text);
    let stripped = redaction::rules::EXISTING_TOKEN.replace_all(&redacted, " ");
    tokenize(&stripped)
        .into_iter()
        .filter(|token| {
            token.len() >= 3
                && !STOPWORDS.contains(&token.as_str())
                && !token.chars().all(|c| c.is_ascii_digit())
        })
        .collect()
}
