use std::sync::Arc;

use serde_json::Value;

use super::embedder::TermFrequencyEncoder;
use super::types::EmbeddingModel;
use crate::models::enums::{IntakeStepKind, SourceKind};
use crate::models::{Chunk, PatientData};

/// Section labels assigned by the processor. Retrieval boosts key on these.
pub mod sections {
    pub const DEMOGRAPHICS: &str = "demographics";
    pub const VISIT_REASON: &str = "visit_reason";
    pub const SYMPTOMS: &str = "symptoms";
    pub const MEDICAL_HISTORY: &str = "medical_history";
    pub const MEDICATIONS: &str = "medications";
    pub const ALLERGIES: &str = "allergies";
    pub const FAMILY_HISTORY: &str = "family_history";
    pub const LIFESTYLE: &str = "lifestyle";
    pub const SAFETY_CONCERNS: &str = "safety_concerns";
    pub const ENHANCED_SUMMARY: &str = "enhanced_summary";
    pub const TRANSCRIPT: &str = "transcript";
}

/// Prefix marking a surgery entry inside the medical history chunk.
pub const SURGERY_PREFIX: &str = "surgery: ";

const INTAKE_CONFIDENCE: f32 = 0.9;
const HISTORY_CONFIDENCE: f32 = 0.95;
const SUMMARY_CONFIDENCE: f32 = 0.8;
const TRANSCRIPT_CONFIDENCE: f32 = 0.7;

/// Decomposes a patient record into one chunk per field group.
pub struct DocumentProcessor {
    encoder: Arc<dyn EmbeddingModel>,
    transcript_window: usize,
}

impl DocumentProcessor {
    pub fn new(encoder: Arc<dyn EmbeddingModel>) -> Self {
        Self {
            encoder,
            transcript_window: 6,
        }
    }

    pub fn with_transcript_window(mut self, lines: usize) -> Self {
        self.transcript_window = lines.max(1);
        self
    }

    pub fn encoder(&self) -> Arc<dyn EmbeddingModel> {
        Arc::clone(&self.encoder)
    }

    /// Read a raw JSON record leniently, then chunk it.
    pub fn process_json(&self, case_id: &str, record: &Value) -> Vec<Chunk> {
        self.process(case_id, &PatientData::from_json(record))
    }

    /// Chunk a patient record. Empty fields produce no chunk; the same input
    /// always yields the same texts, sections and embeddings in the same order.
    pub fn process(&self, case_id: &str, data: &PatientData) -> Vec<Chunk> {
        let mut drafts = Drafts::default();
        let intake = IntakeAnswers::collect(data);

        let mut demo = Vec::new();
        if let Some(age) = data.demographics.age {
            demo.push(format!("age {age}"));
        }
        if let Some(sex) = &data.demographics.sex {
            demo.push(format!("sex {sex}"));
        }
        if let Some(occupation) = &data.demographics.occupation {
            demo.push(format!("occupation {occupation}"));
        }
        drafts.intake(sections::DEMOGRAPHICS, "Demographics", &demo);

        let mut reasons: Vec<String> = data.visit_reason.iter().cloned().collect();
        reasons.extend(intake.reasons);
        drafts.intake(sections::VISIT_REASON, "Visit reason", &reasons);

        let mut symptoms = data.symptoms.clone();
        let onset = data.symptom_onset.iter().chain(intake.onset.iter());
        symptoms.extend(onset.map(|o| format!("onset: {o}")));
        let severity = data.symptom_severity.iter().chain(intake.severity.iter());
        symptoms.extend(severity.map(|s| format!("severity: {s}")));
        drafts.intake(sections::SYMPTOMS, "Symptoms", &symptoms);

        let mut history = data.conditions.clone();
        history.extend(intake.history);
        history.extend(data.surgeries.iter().map(|s| format!("{SURGERY_PREFIX}{s}")));
        drafts.history(sections::MEDICAL_HISTORY, "Medical history", &history);

        drafts.history(sections::MEDICATIONS, "Medications", &data.medications);

        let mut allergies = data.allergies.clone();
        allergies.extend(intake.allergies);
        drafts.history(sections::ALLERGIES, "Allergies", &allergies);

        drafts.history(sections::FAMILY_HISTORY, "Family history", &data.family_history);

        let life = &data.lifestyle;
        let lifestyle: Vec<String> = [
            ("smoking", &life.smoking),
            ("alcohol", &life.alcohol),
            ("exercise", &life.exercise),
            ("diet", &life.diet),
            ("sleep", &life.sleep),
            ("notes", &life.notes),
        ]
        .into_iter()
        .filter_map(|(label, value)| value.as_ref().map(|v| format!("{label}: {v}")))
        .collect();
        drafts.history(sections::LIFESTYLE, "Lifestyle", &lifestyle);

        let mut flags = data.red_flags.clone();
        flags.extend(intake.safety);
        drafts.intake(sections::SAFETY_CONCERNS, "Safety concerns", &flags);

        let summary = data.enhanced_summary.as_deref().map(str::trim);
        if let Some(summary) = summary.filter(|s| !s.is_empty()) {
            drafts.push(
                sections::ENHANCED_SUMMARY,
                SourceKind::EnhancedSummary,
                SUMMARY_CONFIDENCE,
                format!("Summary: {summary}"),
            );
        }

        let lines: Vec<&str> = data
            .transcript
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .collect();
        for window in lines.chunks(self.transcript_window) {
            drafts.push(
                sections::TRANSCRIPT,
                SourceKind::Transcript,
                TRANSCRIPT_CONFIDENCE,
                format!("Transcript:\n{}", window.join("\n")),
            );
        }
        let drafts = drafts.0;

        let texts: Vec<&str> = drafts.iter().map(|d| d.3.as_str()).collect();
        let embeddings = self.encoder.embed_batch(&texts);

        let chunks: Vec<Chunk> = drafts
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(sequence, ((section, kind, confidence, text), embedding))| {
                Chunk::new(case_id, section, kind, text, embedding, confidence, sequence)
            })
            .collect();

        tracing::debug!(case_id, chunks = chunks.len(), "Patient data chunked");
        chunks
    }
}

impl Default for DocumentProcessor {
    fn default() -> Self {
        Self::new(Arc::new(TermFrequencyEncoder::new()))
    }
}

/// Confirmed intake answers grouped by where they land in the record.
/// Greeting and identification answers are dropped.
#[derive(Default)]
struct IntakeAnswers {
    reasons: Vec<String>,
    onset: Vec<String>,
    severity: Vec<String>,
    history: Vec<String>,
    allergies: Vec<String>,
    safety: Vec<String>,
}

impl IntakeAnswers {
    fn collect(data: &PatientData) -> Self {
        let mut answers = Self::default();
        for step in data.intake.iter().filter(|s| s.confirmed) {
            let text = step.text.trim().to_string();
            if text.is_empty() {
                continue;
            }
            let target = match step.step {
                IntakeStepKind::Reason => &mut answers.reasons,
                IntakeStepKind::Onset => &mut answers.onset,
                IntakeStepKind::Severity => &mut answers.severity,
                IntakeStepKind::History => &mut answers.history,
                IntakeStepKind::Allergies => &mut answers.allergies,
                IntakeStepKind::Safety => &mut answers.safety,
                IntakeStepKind::Greeting | IntakeStepKind::Identification => continue,
            };
            target.push(text);
        }
        answers
    }
}

/// Chunk drafts in creation order: section, source kind, confidence, text.
#[derive(Default)]
struct Drafts(Vec<(&'static str, SourceKind, f32, String)>);

impl Drafts {
    fn push(&mut self, section: &'static str, kind: SourceKind, confidence: f32, text: String) {
        self.0.push((section, kind, confidence, text));
    }

    fn intake(&mut self, section: &'static str, label: &str, items: &[String]) {
        self.labeled(section, SourceKind::Intake, INTAKE_CONFIDENCE, label, items);
    }

    fn history(&mut self, section: &'static str, label: &str, items: &[String]) {
        self.labeled(section, SourceKind::MedicalHistory, HISTORY_CONFIDENCE, label, items);
    }

    /// `Label: a; b` over the non-empty items, case-insensitively deduplicated.
    /// Nothing is pushed when no item remains.
    fn labeled(
        &mut self,
        section: &'static str,
        kind: SourceKind,
        confidence: f32,
        label: &str,
        items: &[String],
    ) {
        let mut seen: Vec<String> = Vec::new();
        let mut kept: Vec<&str> = Vec::new();
        for item in items.iter().map(|i| i.trim()).filter(|i| !i.is_empty()) {
            let key = item.to_lowercase();
            if !seen.contains(&key) {
                seen.push(key);
                kept.push(item);
            }
        }
        if kept.is_empty() {
            return;
        }
        self.push(section, kind, confidence, format!("{label}: {}", kept.join("; ")));
    }
}
