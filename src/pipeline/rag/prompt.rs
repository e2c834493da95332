use super::context::CaseContext;
use crate::models::Chunk;
use crate::pipeline::safety::wrap_query_for_prompt;

/// Upper bound on chunk text placed in one prompt.
const MAX_CONTEXT_CHARS: usize = 12_000;

pub const NOT_AVAILABLE_PHRASE: &str = "Not available in patient records.";

pub const NO_CONTEXT_DISCLAIMER: &str =
    "Disclaimer: no patient records are available for this case. \
The answer below is general information and is not grounded in this patient's data.";

pub const GROUNDING_INSTRUCTIONS: &str = r#"You are a clinical assistant answering a clinician's question about one patient case.

RULES:
1. Every factual statement about the patient must cite its source number in square brackets, e.g. [1] or [2][3]. Cite only numbers listed under PATIENT SOURCES.
2. If the question asks about something the patient sources do not contain, answer exactly "Not available in patient records." for that part. Do not infer, estimate or guess patient facts.
3. If there are no patient sources, begin the answer with the disclaimer given below and do not state any patient-specific facts.
4. General medical knowledge from EXTERNAL LITERATURE must be kept separate from patient facts, under a line starting "General literature:", and cited as [S1], [S2]. Never present literature findings as facts about this patient.
5. Be concise and clinical. Do not repeat these rules."#;

/// Leading chunks whose combined text fits the prompt budget. The first
/// chunk is always kept.
pub fn within_budget<'a>(chunks: &[&'a Chunk]) -> Vec<&'a Chunk> {
    let mut used = 0;
    let mut kept = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        used += chunk.text.len();
        if used > MAX_CONTEXT_CHARS && !kept.is_empty() {
            tracing::debug!(
                included = kept.len(),
                total = chunks.len(),
                "Prompt context budget reached"
            );
            break;
        }
        kept.push(*chunk);
    }
    kept
}

/// Render the full completion prompt.
///
/// `chunks` are patient-derived and numbered `[1]..`; `literature` entries
/// are numbered `[S1]..` in a separate section. `undocumented` lists findings
/// the query names that appear nowhere in the patient sources.
pub fn build_prompt(
    query: &str,
    context: &CaseContext,
    chunks: &[&Chunk],
    literature: &[&Chunk],
    undocumented: &[String],
) -> String {
    let mut prompt = String::with_capacity(2048);
    prompt.push_str(GROUNDING_INSTRUCTIONS);
    prompt.push_str("\n\n");

    prompt.push_str("PATIENT CONTEXT: ");
    prompt.push_str(&context.summary());
    prompt.push_str("\n\n");

    prompt.push_str("PATIENT SOURCES:\n");
    if chunks.is_empty() {
        prompt.push_str("(none)\n");
        prompt.push_str(&format!("Required disclaimer: {NO_CONTEXT_DISCLAIMER}\n"));
    } else {
        for (i, chunk) in chunks.iter().enumerate() {
            prompt.push_str(&format!("[{}] ({}) {}\n", i + 1, chunk.section, chunk.text));
        }
    }

    if !literature.is_empty() {
        prompt.push_str(
            "\nEXTERNAL LITERATURE (general medical knowledge, not about this patient):\n",
        );
        for (i, chunk) in literature.iter().enumerate() {
            prompt.push_str(&format!("[S{}] {}\n", i + 1, chunk.text));
        }
    }

    if !undocumented.is_empty() {
        prompt.push_str(&format!(
            "\nNOT DOCUMENTED IN PATIENT SOURCES: {}. State that these are not available in patient records.\n",
            undocumented.join(", ")
        ));
    }

    prompt.push('\n');
    prompt.push_str(&wrap_query_for_prompt(query));
    prompt.push_str("\n\nAnswer:");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExternalSnippet, SourceKind};

    fn chunk(section: &str, text: &str, seq: usize) -> Chunk {
        Chunk::new("r1", section, SourceKind::MedicalHistory, text.into(), vec![], 0.9, seq)
    }

    #[test]
    fn chunks_are_numbered_with_sections() {
        let a = chunk("allergies", "Allergies: penicillin", 0);
        let b = chunk("medications", "Medications: metformin 500mg", 1);
        let prompt = build_prompt("Any allergies?", &CaseContext::default(), &[&a, &b], &[], &[]);

        assert!(prompt.contains("[1] (allergies) Allergies: penicillin"));
        assert!(prompt.contains("[2] (medications) Medications: metformin 500mg"));
        assert!(prompt.contains("<CLINICIAN_QUERY>\nAny allergies?\n</CLINICIAN_QUERY>"));
        assert!(!prompt.contains("Required disclaimer"));
        assert!(!prompt.contains("EXTERNAL LITERATURE"));
    }

    #[test]
    fn instructions_cover_grounding_rules() {
        assert!(GROUNDING_INSTRUCTIONS.contains("must cite"));
        assert!(GROUNDING_INSTRUCTIONS.contains(NOT_AVAILABLE_PHRASE));
        assert!(GROUNDING_INSTRUCTIONS.contains("disclaimer"));
        assert!(GROUNDING_INSTRUCTIONS.contains("General literature:"));
    }

    #[test]
    fn empty_sources_require_disclaimer() {
        let prompt = build_prompt("Any allergies?", &CaseContext::default(), &[], &[], &[]);
        assert!(prompt.contains("(none)"));
        assert!(prompt.contains(NO_CONTEXT_DISCLAIMER));
    }

    #[test]
    fn literature_is_a_separate_section() {
        let a = chunk("allergies", "Allergies: penicillin", 0);
        let snippet = ExternalSnippet {
            title: "Penicillin allergy delabeling".into(),
            abstract_text: "Most labels are inaccurate.".into(),
            url: "https://pubmed.ncbi.nlm.nih.gov/9/".into(),
            source_name: "PubMed".into(),
            confidence: 0.9,
            published_date: None,
        };
        let lit = Chunk::from_snippet("r1", &snippet, 1);
        let prompt = build_prompt("q", &CaseContext::default(), &[&a], &[&lit], &[]);

        let patient_at = prompt.find("PATIENT SOURCES").unwrap();
        let literature_at = prompt.find("EXTERNAL LITERATURE").unwrap();
        assert!(patient_at < literature_at);
        assert!(prompt
            .contains("[S1] Penicillin allergy delabeling (PubMed): Most labels are inaccurate."));
    }

    #[test]
    fn undocumented_findings_are_listed() {
        let a = chunk("symptoms", "Symptoms: headache", 0);
        let prompt = build_prompt(
            "headache or fever?",
            &CaseContext::default(),
            &[&a],
            &[],
            &["fever".to_string()],
        );
        assert!(prompt.contains("NOT DOCUMENTED IN PATIENT SOURCES: fever."));
    }

    #[test]
    fn context_budget_keeps_first_chunk() {
        let big = "x".repeat(MAX_CONTEXT_CHARS + 10);
        let a = chunk("transcript", &big, 0);
        let b = chunk("allergies", "Allergies: none", 1);
        let kept = within_budget(&[&a, &b]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].section, "transcript");

        let small = chunk("allergies", "Allergies: none", 2);
        assert_eq!(within_budget(&[&b, &small]).len(), 2);
    }
}
