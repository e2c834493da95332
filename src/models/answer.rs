use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{AnswerStatus, SourceKind};

/// A literature result fetched for one query. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExternalSnippet {
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub url: String,
    pub source_name: String,
    pub confidence: f32,
    pub published_date: Option<String>,
}

/// One entry in an answer's citation list. `index` is 1-based and matches the
/// `[k]` markers in the answer text for the lifetime of that response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceRef {
    pub index: usize,
    pub chunk_id: Uuid,
    pub section: String,
    pub source_kind: SourceKind,
    pub excerpt: String,
    pub url: Option<String>,
}

/// Final answer returned to the clinic application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    pub text: String,
    pub cited_sources: Vec<SourceRef>,
    pub conversation_id: Uuid,
    pub confidence: f32,
    pub status: AnswerStatus,
    /// Terms in the answer that no supplied source mentions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flagged_terms: Vec<String>,
}
