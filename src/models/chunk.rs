use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::answer::ExternalSnippet;
use super::enums::SourceKind;

/// A retrievable unit of case-derived text with its embedding and provenance.
///
/// Immutable once created. A case's chunks are replaced as a whole set when
/// its patient data changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub id: Uuid,
    pub text: String,
    pub source_kind: SourceKind,
    /// Free-text section label, e.g. `family_history`.
    pub section: String,
    pub case_id: String,
    pub created_at: DateTime<Utc>,
    pub embedding: Vec<f32>,
    /// In `[0, 1]`.
    pub confidence: f32,
    /// Creation order within the case; earlier chunks win ranking ties.
    pub sequence: usize,
    /// Set only for external literature merged in at query time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

impl Chunk {
    pub fn new(
        case_id: &str,
        section: &str,
        source_kind: SourceKind,
        text: String,
        embedding: Vec<f32>,
        confidence: f32,
        sequence: usize,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            text,
            source_kind,
            section: section.to_string(),
            case_id: case_id.to_string(),
            created_at: Utc::now(),
            embedding,
            confidence: confidence.clamp(0.0, 1.0),
            sequence,
            source_url: None,
        }
    }

    /// Wrap a literature snippet so it can be ranked and cited next to
    /// patient chunks. It has no embedding and is never stored in the index.
    pub fn from_snippet(case_id: &str, snippet: &ExternalSnippet, sequence: usize) -> Self {
        let mut text = snippet.title.trim().to_string();
        if let Some(date) = snippet.published_date.as_deref() {
            text.push_str(&format!(" ({}, {date})", snippet.source_name));
        } else {
            text.push_str(&format!(" ({})", snippet.source_name));
        }
        if !snippet.abstract_text.trim().is_empty() {
            text.push_str(": ");
            text.push_str(snippet.abstract_text.trim());
        }
        let mut chunk = Self::new(
            case_id,
            "external_literature",
            SourceKind::External,
            text,
            Vec::new(),
            snippet.confidence,
            sequence,
        );
        chunk.source_url = Some(snippet.url.clone());
        chunk
    }
}

/// A chunk paired with its retrieval score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_clamped() {
        let chunk = Chunk::new("r1", "allergies", SourceKind::Intake, "x".into(), vec![], 1.7, 0);
        assert_eq!(chunk.confidence, 1.0);
        let chunk = Chunk::new("r1", "allergies", SourceKind::Intake, "x".into(), vec![], -0.2, 0);
        assert_eq!(chunk.confidence, 0.0);
    }

    #[test]
    fn snippet_chunk_keeps_url_and_provenance() {
        let snippet = ExternalSnippet {
            title: "Beta blockers after MI".into(),
            abstract_text: "Reduced mortality at one year.".into(),
            url: "https://pubmed.ncbi.nlm.nih.gov/42/".into(),
            source_name: "PubMed".into(),
            confidence: 0.8,
            published_date: Some("2019".into()),
        };
        let chunk = Chunk::from_snippet("r1", &snippet, 7);
        assert_eq!(chunk.source_kind, SourceKind::External);
        assert_eq!(chunk.source_url.as_deref(), Some("https://pubmed.ncbi.nlm.nih.gov/42/"));
        assert_eq!(
            chunk.text,
            "Beta blockers after MI (PubMed, 2019): Reduced mortality at one year."
        );
        assert_eq!(chunk.sequence, 7);
        assert!(chunk.embedding.is_empty());
    }

    #[test]
    fn new_chunks_get_distinct_ids() {
        let a = Chunk::new("r1", "s", SourceKind::Intake, "a".into(), vec![], 0.9, 0);
        let b = Chunk::new("r1", "s", SourceKind::Intake, "a".into(), vec![], 0.9, 1);
        assert_ne!(a.id, b.id);
    }
}
