use serde::{Deserialize, Serialize};

use super::types::{CompletionBackend, GenerationOptions};
use crate::models::{IntakeStep, IntakeStepKind};
use crate::pipeline::safety::sanitize_model_output;

pub const NOT_PROVIDED: &str = "Not provided";

/// Structured summary of a patient intake conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IntakeSummary {
    pub patient_info: String,
    pub main_complaint: String,
    pub symptom_onset: String,
    pub severity: String,
    pub relevant_history: Vec<String>,
    pub allergies: Vec<String>,
    pub red_flags: Vec<String>,
}

impl Default for IntakeSummary {
    fn default() -> Self {
        Self {
            patient_info: NOT_PROVIDED.into(),
            main_complaint: NOT_PROVIDED.into(),
            symptom_onset: NOT_PROVIDED.into(),
            severity: NOT_PROVIDED.into(),
            relevant_history: vec![],
            allergies: vec![],
            red_flags: vec![],
        }
    }
}

/// Summarize confirmed intake answers without any model call.
pub fn summarize_rule_based(steps: &[IntakeStep]) -> IntakeSummary {
    let first = |kind: IntakeStepKind| {
        confirmed(steps, kind)
            .next()
            .map(str::to_string)
            .unwrap_or_else(|| NOT_PROVIDED.to_string())
    };
    let all = |kind: IntakeStepKind| confirmed(steps, kind).map(str::to_string).collect();

    IntakeSummary {
        patient_info: first(IntakeStepKind::Identification),
        main_complaint: first(IntakeStepKind::Reason),
        symptom_onset: first(IntakeStepKind::Onset),
        severity: first(IntakeStepKind::Severity),
        relevant_history: all(IntakeStepKind::History),
        allergies: all(IntakeStepKind::Allergies),
        red_flags: all(IntakeStepKind::Safety),
    }
}

/// Ask the completion backend to structure the intake as JSON, falling back
/// to [`summarize_rule_based`] on any failure.
pub async fn summarize_with_backend(
    backend: &dyn CompletionBackend,
    steps: &[IntakeStep],
    options: &GenerationOptions,
) -> IntakeSummary {
    let lines: Vec<String> = steps
        .iter()
        .filter(|s| s.confirmed && !s.text.trim().is_empty())
        .map(|s| format!("{}: {}", s.step.as_str(), s.text.trim()))
        .collect();
    if lines.is_empty() {
        return IntakeSummary::default();
    }

    let prompt = summary_prompt(&lines);
    let raw = match backend.complete(&prompt, &options.deterministic()).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(error = %e, "Intake summary backend failed, using rule-based summary");
            return summarize_rule_based(steps);
        }
    };

    match parse_summary(&sanitize_model_output(&raw)) {
        Some(summary) => summary,
        None => {
            tracing::warn!("Intake summary response was not valid JSON, using rule-based summary");
            summarize_rule_based(steps)
        }
    }
}

fn confirmed(steps: &[IntakeStep], kind: IntakeStepKind) -> impl Iterator<Item = &str> {
    steps
        .iter()
        .filter(move |s| s.step == kind && s.confirmed)
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
}

fn summary_prompt(lines: &[String]) -> String {
    format!(
        r#"Extract structured information from this patient intake conversation:

{}

Return a JSON object with exactly these fields:
{{
  "patient_info": "identifying details as stated",
  "main_complaint": "primary reason for visit",
  "symptom_onset": "when symptoms started",
  "severity": "mild|moderate|severe|unknown",
  "relevant_history": ["relevant medical history"],
  "allergies": ["allergies mentioned"],
  "red_flags": ["urgent symptoms that need immediate attention"]
}}

Only return valid JSON, no other text."#,
        lines.join("\n")
    )
}

/// Parse the outermost `{...}` object in `text`.
fn parse_summary(text: &str) -> Option<IntakeSummary> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::rag::MockCompletion;

    fn step(kind: IntakeStepKind, text: &str, confirmed: bool) -> IntakeStep {
        IntakeStep {
            step: kind,
            text: text.into(),
            confirmed,
            language: None,
        }
    }

    fn intake() -> Vec<IntakeStep> {
        vec![
            step(IntakeStepKind::Greeting, "hello", true),
            step(IntakeStepKind::Identification, "Jane Doe, 1980-02-02", true),
            step(IntakeStepKind::Reason, "persistent cough", true),
            step(IntakeStepKind::Onset, "two weeks ago", true),
            step(IntakeStepKind::Severity, "moderate", false),
            step(IntakeStepKind::History, "asthma", true),
            step(IntakeStepKind::History, "appendectomy", true),
            step(IntakeStepKind::Allergies, "penicillin", true),
            step(IntakeStepKind::Safety, "coughing blood", true),
        ]
    }

    #[test]
    fn rule_based_uses_confirmed_steps_only() {
        let summary = summarize_rule_based(&intake());
        assert_eq!(summary.main_complaint, "persistent cough");
        assert_eq!(summary.symptom_onset, "two weeks ago");
        assert_eq!(summary.severity, NOT_PROVIDED);
        assert_eq!(summary.relevant_history, vec!["asthma", "appendectomy"]);
        assert_eq!(summary.allergies, vec!["penicillin"]);
        assert_eq!(summary.red_flags, vec!["coughing blood"]);
    }

    #[test]
    fn empty_intake_is_not_provided() {
        let summary = summarize_rule_based(&[]);
        assert_eq!(summary, IntakeSummary::default());
        assert_eq!(summary.patient_info, NOT_PROVIDED);
    }

    #[tokio::test]
    async fn backend_json_is_parsed() {
        let mock = MockCompletion::new(
            r#"Here you go: {"main_complaint": "cough", "severity": "moderate", "allergies": ["penicillin"]}"#,
        );
        let summary = summarize_with_backend(&mock, &intake(), &GenerationOptions::default()).await;

        assert_eq!(summary.main_complaint, "cough");
        assert_eq!(summary.severity, "moderate");
        assert_eq!(summary.allergies, vec!["penicillin"]);
        assert_eq!(summary.symptom_onset, NOT_PROVIDED);

        let prompt = mock.last_prompt().unwrap();
        assert!(prompt.contains("reason: persistent cough"));
        assert!(!prompt.contains("severity: moderate"));
    }

    #[tokio::test]
    async fn invalid_json_falls_back_to_rules() {
        let mock = MockCompletion::new("I cannot produce JSON today.");
        let summary = summarize_with_backend(&mock, &intake(), &GenerationOptions::default()).await;
        assert_eq!(summary, summarize_rule_based(&intake()));
    }

    #[tokio::test]
    async fn backend_failure_falls_back_to_rules() {
        let mock = MockCompletion::failing();
        let summary = summarize_with_backend(&mock, &intake(), &GenerationOptions::default()).await;
        assert_eq!(mock.calls(), 1);
        assert_eq!(summary.main_complaint, "persistent cough");
    }

    #[tokio::test]
    async fn unconfirmed_only_intake_skips_backend() {
        let mock = MockCompletion::new("{}");
        let steps = vec![step(IntakeStepKind::Reason, "cough", false)];
        let summary = summarize_with_backend(&mock, &steps, &GenerationOptions::default()).await;
        assert_eq!(mock.calls(), 0);
        assert_eq!(summary.main_complaint, NOT_PROVIDED);
    }
}
