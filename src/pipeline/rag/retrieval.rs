use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::models::{Chunk, ScoredChunk};
use crate::pipeline::storage::chunker::sections;
use crate::pipeline::storage::embedder::{cosine_similarity, tokenize};
use crate::pipeline::storage::types::{ChunkStore, EmbeddingModel};

pub const DEFAULT_RETRIEVAL_LIMIT: usize = 5;

/// One keyword rule. Fires when every `all_of` term and at least one
/// `any_of` term (if any are listed) occur in the query. A term ending in
/// `*` matches any token with that prefix; a term with a space matches as
/// a phrase.
pub struct KeywordRule {
    pub all_of: &'static [&'static str],
    pub any_of: &'static [&'static str],
    pub section: &'static str,
    pub boost: f32,
}

/// Boosts exceed the cosine range so a fired rule always outranks pure
/// vector similarity.
pub static KEYWORD_RULES: &[KeywordRule] = &[
    KeywordRule {
        all_of: &["family", "history"],
        any_of: &[],
        section: sections::FAMILY_HISTORY,
        boost: 2.0,
    },
    KeywordRule {
        all_of: &[],
        any_of: &[
            "father", "mother", "parent*", "sibling*", "sister", "brother", "hereditar*", "genetic",
            "runs in",
        ],
        section: sections::FAMILY_HISTORY,
        boost: 1.5,
    },
    KeywordRule {
        all_of: &[],
        any_of: &["allerg*", "penicillin", "anaphyla*", "intoleran*", "reaction*"],
        section: sections::ALLERGIES,
        boost: 1.5,
    },
    KeywordRule {
        all_of: &[],
        any_of: &[
            "medication*", "medicine*", "drug*", "dose*", "dosage", "taking", "prescri*", "pill*",
            "tablet*",
        ],
        section: sections::MEDICATIONS,
        boost: 1.5,
    },
    KeywordRule {
        all_of: &["medical", "history"],
        any_of: &[],
        section: sections::MEDICAL_HISTORY,
        boost: 1.5,
    },
    KeywordRule {
        all_of: &[],
        any_of: &[
            "condition*", "diagnos*", "chronic", "comorbid*", "surger*", "operation*",
            "past history",
        ],
        section: sections::MEDICAL_HISTORY,
        boost: 1.2,
    },
    KeywordRule {
        all_of: &[],
        any_of: &["smok*", "alcohol", "drink*", "exercise", "diet", "sleep*", "lifestyle"],
        section: sections::LIFESTYLE,
        boost: 1.2,
    },
    KeywordRule {
        all_of: &[],
        any_of: &[
            "red flag", "safety", "danger*", "suicid*", "self harm", "emergency", "urgent",
            "warning",
        ],
        section: sections::SAFETY_CONCERNS,
        boost: 1.2,
    },
    KeywordRule {
        all_of: &[],
        any_of: &[
            "symptom*", "pain", "ache*", "fever", "cough*", "nausea", "dizz*", "onset", "started",
            "severity", "worse*",
        ],
        section: sections::SYMPTOMS,
        boost: 1.0,
    },
    KeywordRule {
        all_of: &[],
        any_of: &["reason", "visit", "complaint", "presenting", "came in", "why"],
        section: sections::VISIT_REASON,
        boost: 1.0,
    },
    KeywordRule {
        all_of: &[],
        any_of: &["age", "old", "sex", "gender", "occupation", "job", "demographic*"],
        section: sections::DEMOGRAPHICS,
        boost: 1.0,
    },
    KeywordRule {
        all_of: &[],
        any_of: &["summary", "summar*", "overview"],
        section: sections::ENHANCED_SUMMARY,
        boost: 1.0,
    },
    KeywordRule {
        all_of: &[],
        any_of: &["said", "mention*", "told", "conversation", "transcript", "discuss*"],
        section: sections::TRANSCRIPT,
        boost: 1.0,
    },
];

struct QueryTerms {
    lowered: String,
    tokens: Vec<String>,
}

impl QueryTerms {
    fn new(query: &str) -> Self {
        Self {
            lowered: tokenize(query).join(" "),
            tokens: tokenize(query),
        }
    }

    fn has(&self, term: &str) -> bool {
        if term.contains(' ') {
            return self.lowered.contains(term);
        }
        match term.strip_suffix('*') {
            Some(prefix) => self.tokens.iter().any(|t| t.starts_with(prefix)),
            None => self.tokens.iter().any(|t| t == term),
        }
    }
}

impl KeywordRule {
    fn fires(&self, terms: &QueryTerms) -> bool {
        self.all_of.iter().all(|t| terms.has(t))
            && (self.any_of.is_empty() || self.any_of.iter().any(|t| terms.has(t)))
    }
}

/// Hybrid retriever: cosine similarity over the case's chunks merged with
/// keyword-rule section boosts.
pub struct Retriever {
    store: Arc<dyn ChunkStore>,
    encoder: Arc<dyn EmbeddingModel>,
}

impl Retriever {
    pub fn new(store: Arc<dyn ChunkStore>, encoder: Arc<dyn EmbeddingModel>) -> Self {
        Self { store, encoder }
    }

    /// Top `limit` chunks of `case_id` for `query`. Read-only.
    pub fn retrieve(&self, query: &str, case_id: &str, limit: usize) -> Vec<Chunk> {
        self.retrieve_scored(query, case_id, limit)
            .into_iter()
            .map(|scored| scored.chunk)
            .collect()
    }

    pub fn retrieve_scored(&self, query: &str, case_id: &str, limit: usize) -> Vec<ScoredChunk> {
        let candidates = self.store.get(case_id);
        if candidates.is_empty() || limit == 0 {
            return Vec::new();
        }

        let query_embedding = self.encoder.embed(query);
        let vector_scores = candidates
            .iter()
            .map(|c| (c.id, cosine_similarity(&query_embedding, &c.embedding)));
        let keyword_scores = keyword_scores(query, &candidates);

        let mut best: HashMap<Uuid, f32> = HashMap::with_capacity(candidates.len());
        for (id, score) in vector_scores.chain(keyword_scores) {
            let entry = best.entry(id).or_insert(f32::MIN);
            if score > *entry {
                *entry = score;
            }
        }

        let mut ranked: Vec<ScoredChunk> = candidates
            .iter()
            .filter_map(|c| {
                best.get(&c.id).map(|score| ScoredChunk {
                    chunk: c.clone(),
                    score: *score,
                })
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.chunk.sequence.cmp(&b.chunk.sequence))
        });
        ranked.truncate(limit);

        tracing::debug!(
            case_id,
            candidates = candidates.len(),
            returned = ranked.len(),
            "Chunks retrieved"
        );
        ranked
    }
}

/// Section boost per chunk for the rules the query fires.
pub fn keyword_scores(query: &str, chunks: &[Chunk]) -> Vec<(Uuid, f32)> {
    let terms = QueryTerms::new(query);
    let fired: Vec<&KeywordRule> = KEYWORD_RULES.iter().filter(|r| r.fires(&terms)).collect();
    if fired.is_empty() {
        return Vec::new();
    }

    chunks
        .iter()
        .filter_map(|chunk| {
            fired
                .iter()
                .filter(|rule| rule.section == chunk.section)
                .map(|rule| rule.boost)
                .reduce(f32::max)
                .map(|boost| (chunk.id, boost))
        })
        .collect()
}
