//! Answer generation with grounding checks on both sides of the completion
//! call.
//!
//! Before the call, findings named in the query are looked up in the patient
//! sources; if none of them is documented the backend is never contacted.
//! After the call, the output is cleaned, citation markers are normalized,
//! and a fixed list of frequently invented clinical terms is checked against
//! the supplied sources.

use std::sync::Arc;

use uuid::Uuid;

use super::citation::{normalize_citations, source_refs};
use super::context::CaseContext;
use super::prompt::{build_prompt, within_budget, NOT_AVAILABLE_PHRASE, NO_CONTEXT_DISCLAIMER};
use super::types::{CompletionBackend, GenerationOptions};
use crate::models::{Answer, AnswerStatus, Chunk};
use crate::pipeline::safety::{sanitize_clinician_query, sanitize_model_output, MAX_QUERY_CHARS};

/// Shown when the completion backend fails for any reason.
pub const BACKEND_APOLOGY: &str = "Sorry, an answer could not be generated right now. \
Please try again shortly or review the patient record directly.";

/// Confidence of the short-circuit answer for undocumented findings.
pub const NOT_IN_RECORDS_CONFIDENCE: f32 = 0.1;

const UNVERIFIED_PENALTY: f32 = 0.15;
const DETAIL_BONUS: f32 = 0.05;
const EXCERPT_CHARS: usize = 200;

const CAUTION_PREFIX: &str =
    "Caution: the following terms do not appear in the supplied sources and could not be verified:";

/// Symptoms and findings a clinician may ask about by name.
const CLINICAL_FINDINGS: &[&str] = &[
    "chest pain",
    "abdominal pain",
    "back pain",
    "joint pain",
    "headache",
    "migraine",
    "fever",
    "chills",
    "cough",
    "shortness of breath",
    "wheezing",
    "palpitations",
    "syncope",
    "fainting",
    "seizure",
    "dizziness",
    "vertigo",
    "nausea",
    "vomiting",
    "diarrhea",
    "constipation",
    "rash",
    "itching",
    "swelling",
    "edema",
    "bleeding",
    "bruising",
    "numbness",
    "tingling",
    "weakness",
    "fatigue",
    "weight loss",
    "weight gain",
    "blurred vision",
    "sore throat",
    "confusion",
    "insomnia",
    "anxiety",
    "depression",
    "jaundice",
];

/// Clinical terms completion models tend to produce without support.
const HALLUCINATION_TERMS: &[&str] = &[
    "metformin",
    "insulin",
    "lisinopril",
    "amlodipine",
    "atorvastatin",
    "warfarin",
    "aspirin",
    "ibuprofen",
    "amoxicillin",
    "prednisone",
    "levothyroxine",
    "omeprazole",
    "diabetes",
    "hypertension",
    "myocardial infarction",
    "heart failure",
    "atrial fibrillation",
    "stroke",
    "cancer",
    "copd",
    "pneumonia",
    "sepsis",
    "kidney disease",
];

/// Produces grounded answers from retrieved chunks via a completion backend.
pub struct Generator {
    backend: Arc<dyn CompletionBackend>,
    options: GenerationOptions,
}

impl Generator {
    pub fn new(backend: Arc<dyn CompletionBackend>, options: GenerationOptions) -> Self {
        Self { backend, options }
    }

    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    /// Answer `query` from `chunks`. Patient chunks are cited as `[1]..`,
    /// external literature chunks as `[S1]..`. Never fails.
    pub async fn generate(&self, query: &str, chunks: &[Chunk], context: &CaseContext) -> Answer {
        // Step 1: Sanitize the clinician query
        let sanitized = sanitize_clinician_query(query, MAX_QUERY_CHARS);
        if sanitized.was_modified() {
            tracing::info!(
                modifications = sanitized.modifications.len(),
                "Clinician query sanitized"
            );
        }
        if sanitized.text.is_empty() {
            return fixed_answer(NOT_AVAILABLE_PHRASE.to_string(), 0.0, AnswerStatus::NoContext);
        }

        let (patient, literature): (Vec<&Chunk>, Vec<&Chunk>) = chunks
            .iter()
            .partition(|c| c.source_kind.is_patient_derived());

        // Step 2: Pre-validate named findings against patient sources
        let mut undocumented = Vec::new();
        if !patient.is_empty() {
            let named = named_findings(&sanitized.text);
            let haystack = grounding_text(&patient, context);
            undocumented = named
                .iter()
                .filter(|f| !haystack.contains(*f))
                .map(|f| f.to_string())
                .collect();

            if !named.is_empty() && undocumented.len() == named.len() {
                tracing::info!(
                    named = named.len(),
                    "Query findings absent from patient sources, completion skipped"
                );
                let text = format!(
                    "{NOT_AVAILABLE_PHRASE} The patient sources do not mention {}.",
                    undocumented.join(", ")
                );
                return fixed_answer(text, NOT_IN_RECORDS_CONFIDENCE, AnswerStatus::NotInRecords);
            }
        }

        // Step 3: Build the prompt within the context budget
        let patient = within_budget(&patient);
        let prompt = build_prompt(&sanitized.text, context, &patient, &literature, &undocumented);

        // Step 4: Call the completion backend
        let raw = match self.backend.complete(&prompt, &self.options).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "Completion backend failed");
                return backend_unavailable();
            }
        };

        // Step 5: Clean output and normalize citations
        let cleaned = sanitize_model_output(&raw);
        if cleaned.is_empty() {
            tracing::warn!("Completion backend returned no usable text");
            return backend_unavailable();
        }
        let normalized = normalize_citations(&cleaned, patient.len(), literature.len());
        let candidates: Vec<&Chunk> = patient.iter().chain(literature.iter()).copied().collect();
        let cited_sources = source_refs(&normalized.cited, &candidates, EXCERPT_CHARS);
        let mut text = normalized.text;

        // Step 6: Post-validate against frequently invented terms
        let flagged_terms = unverified_terms(&text, &sanitized.text, chunks);
        if !flagged_terms.is_empty() {
            text.push_str(&format!("\n\n{CAUTION_PREFIX} {}.", flagged_terms.join(", ")));
        }

        // Step 7: Disclaimer when nothing patient-specific was available
        if patient.is_empty() && !text.contains(NO_CONTEXT_DISCLAIMER) {
            text = format!("{NO_CONTEXT_DISCLAIMER}\n\n{text}");
        }

        // Step 8: Confidence and status
        let mut confidence = base_confidence(&patient, &text, !cited_sources.is_empty());
        if !flagged_terms.is_empty() {
            confidence -= UNVERIFIED_PENALTY;
        }
        let confidence = confidence.clamp(0.0, 1.0);

        let status = if patient.is_empty() {
            AnswerStatus::NoContext
        } else if !flagged_terms.is_empty() {
            AnswerStatus::UnverifiedTerms
        } else {
            AnswerStatus::Grounded
        };

        tracing::info!(
            sources = patient.len(),
            literature = literature.len(),
            cited = cited_sources.len(),
            flagged = flagged_terms.len(),
            confidence,
            status = status.as_str(),
            "Answer generated"
        );

        Answer {
            text,
            cited_sources,
            conversation_id: Uuid::new_v4(),
            confidence,
            status,
            flagged_terms,
        }
    }
}

fn fixed_answer(text: String, confidence: f32, status: AnswerStatus) -> Answer {
    Answer {
        text,
        cited_sources: vec![],
        conversation_id: Uuid::new_v4(),
        confidence,
        status,
        flagged_terms: vec![],
    }
}

fn backend_unavailable() -> Answer {
    fixed_answer(BACKEND_APOLOGY.to_string(), 0.0, AnswerStatus::BackendUnavailable)
}

/// Findings from [`CLINICAL_FINDINGS`] that the query names.
fn named_findings(query: &str) -> Vec<&'static str> {
    let lower = query.to_lowercase();
    CLINICAL_FINDINGS
        .iter()
        .copied()
        .filter(|f| contains_word(&lower, f))
        .collect()
}

/// Lowercased text of the supplied patient chunks, the case's full record
/// and its derived summary. A finding is documented if it occurs anywhere in
/// the record, not only in the chunks retrieved for this query.
fn grounding_text(patient: &[&Chunk], context: &CaseContext) -> String {
    let mut text = patient
        .iter()
        .map(|c| c.text.to_lowercase())
        .collect::<Vec<_>>()
        .join("\n");
    if !context.record_text.is_empty() {
        text.push('\n');
        text.push_str(&context.record_text);
    }
    if !context.is_empty() {
        text.push('\n');
        text.push_str(&context.summary().to_lowercase());
    }
    text
}

/// Terms in `answer` that neither the query nor any supplied chunk mentions.
fn unverified_terms(answer: &str, query: &str, chunks: &[Chunk]) -> Vec<String> {
    let answer = answer.to_lowercase();
    let query = query.to_lowercase();
    let sources: Vec<String> = chunks.iter().map(|c| c.text.to_lowercase()).collect();

    HALLUCINATION_TERMS
        .iter()
        .filter(|term| contains_word(&answer, term))
        .filter(|term| !contains_word(&query, term))
        .filter(|term| !sources.iter().any(|s| s.contains(**term)))
        .map(|term| term.to_string())
        .collect()
}

/// Mean patient chunk confidence plus detail bonuses.
fn base_confidence(patient: &[&Chunk], answer: &str, has_citations: bool) -> f32 {
    if patient.is_empty() {
        return 0.0;
    }
    let mean = patient.iter().map(|c| c.confidence).sum::<f32>() / patient.len() as f32;
    let len = answer.chars().count();
    let mut bonus = 0.0;
    if len > 200 {
        bonus += DETAIL_BONUS;
    }
    if len > 500 {
        bonus += DETAIL_BONUS;
    }
    if has_citations {
        bonus += DETAIL_BONUS;
    }
    mean + bonus
}

/// `needle` occurs in `haystack` with no letter or digit directly before it.
/// A trailing plural `s` is allowed.
fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let rest = &haystack[start + needle.len()..];
        let rest = rest.strip_prefix('s').unwrap_or(rest);
        let after_ok = rest.chars().next().map_or(true, |c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}
