//! Patient facts derived from a case's chunks at query time.

use serde::Serialize;

use crate::models::Chunk;
use crate::pipeline::storage::chunker::{sections, SURGERY_PREFIX};

/// Demographic and clinical facts for one case. Rebuilt for every query
/// from the current chunk set; never cached.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CaseContext {
    pub age: Option<u32>,
    pub sex: Option<String>,
    pub conditions: Vec<String>,
    pub medications: Vec<String>,
    pub allergies: Vec<String>,
    pub symptoms: Vec<String>,
    /// Lowercased text of every patient-derived chunk of the case, used to
    /// check whether a finding is documented anywhere in the record.
    #[serde(skip)]
    pub record_text: String,
}

impl CaseContext {
    pub fn from_chunks(chunks: &[Chunk]) -> Self {
        let mut ctx = Self::default();

        for chunk in chunks.iter().filter(|c| c.source_kind.is_patient_derived()) {
            if !ctx.record_text.is_empty() {
                ctx.record_text.push('\n');
            }
            ctx.record_text.push_str(&chunk.text.to_lowercase());

            let items = items_of(&chunk.text);
            match chunk.section.as_str() {
                sections::DEMOGRAPHICS => {
                    for item in items {
                        if let Some(age) = item.strip_prefix("age ") {
                            ctx.age = age.trim().parse().ok();
                        } else if let Some(sex) = item.strip_prefix("sex ") {
                            ctx.sex = Some(sex.trim().to_string());
                        }
                    }
                }
                sections::MEDICAL_HISTORY => ctx.conditions.extend(
                    items
                        .into_iter()
                        .filter(|i| !i.starts_with(SURGERY_PREFIX))
                        .map(str::to_string),
                ),
                sections::MEDICATIONS => {
                    ctx.medications.extend(items.into_iter().map(str::to_string))
                }
                sections::ALLERGIES => ctx.allergies.extend(items.into_iter().map(str::to_string)),
                sections::SYMPTOMS => ctx.symptoms.extend(
                    items
                        .into_iter()
                        .filter(|i| !i.starts_with("onset:") && !i.starts_with("severity:"))
                        .map(str::to_string),
                ),
                _ => {}
            }
        }

        ctx
    }

    /// True when no demographic or clinical fact was derived.
    pub fn is_empty(&self) -> bool {
        self.age.is_none()
            && self.sex.is_none()
            && self.conditions.is_empty()
            && self.medications.is_empty()
            && self.allergies.is_empty()
            && self.symptoms.is_empty()
    }

    /// Whether `needle` (lowercase) occurs anywhere in the case's patient
    /// chunks.
    pub fn record_mentions(&self, needle: &str) -> bool {
        self.record_text.contains(needle)
    }

    /// One-line summary for the prompt, e.g.
    /// `Age: 61 | Sex: male | Conditions: hypertension | Allergies: penicillin`.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if let Some(age) = self.age {
            parts.push(format!("Age: {age}"));
        }
        if let Some(sex) = &self.sex {
            parts.push(format!("Sex: {sex}"));
        }
        for (label, items) in [
            ("Conditions", &self.conditions),
            ("Medications", &self.medications),
            ("Allergies", &self.allergies),
            ("Reported symptoms", &self.symptoms),
        ] {
            if !items.is_empty() {
                parts.push(format!("{label}: {}", items.join(", ")));
            }
        }
        if parts.is_empty() {
            "No patient context available.".to_string()
        } else {
            parts.join(" | ")
        }
    }

    /// Terms that narrow a literature search to this patient's situation:
    /// condition names and the leading word of each medication entry. Case
    /// is preserved so the terms can still be redacted.
    pub fn search_terms(&self) -> Vec<String> {
        let mut terms: Vec<String> = self.conditions.clone();
        terms.extend(
            self.medications
                .iter()
                .filter_map(|m| m.split_whitespace().next())
                .map(str::to_string),
        );
        terms.dedup_by(|a, b| a.eq_ignore_ascii_case(b));
        terms
    }
}

/// Items of a `Label: a; b` chunk text.
fn items_of(text: &str) -> Vec<&str> {
    let body = text.split_once(": ").map_or(text, |(_, rest)| rest);
    body.split("; ")
        .map(str::trim)
        .filter(|i| !i.is_empty())
        .collect()
}
