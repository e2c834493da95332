//! Patient data as it arrives from the surrounding clinic application.
//!
//! Records come in as already-authorized JSON whose shape varies between
//! intake forms and medical-history records. `PatientData::from_json` reads
//! what it can and skips anything missing or of the wrong type.

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::enums::IntakeStepKind;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Demographics {
    pub age: Option<u32>,
    pub sex: Option<String>,
    pub occupation: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Lifestyle {
    pub smoking: Option<String>,
    pub alcohol: Option<String>,
    pub exercise: Option<String>,
    pub diet: Option<String>,
    pub sleep: Option<String>,
    pub notes: Option<String>,
}

/// One answered step of the patient intake conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntakeStep {
    pub step: IntakeStepKind,
    pub text: String,
    pub confirmed: bool,
    #[serde(default)]
    pub language: Option<String>,
}

/// Structured patient record for one case.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PatientData {
    pub demographics: Demographics,
    pub visit_reason: Option<String>,
    pub symptoms: Vec<String>,
    pub symptom_onset: Option<String>,
    pub symptom_severity: Option<String>,
    pub conditions: Vec<String>,
    pub surgeries: Vec<String>,
    pub medications: Vec<String>,
    pub allergies: Vec<String>,
    pub family_history: Vec<String>,
    pub lifestyle: Lifestyle,
    pub red_flags: Vec<String>,
    pub enhanced_summary: Option<String>,
    pub transcript: Vec<String>,
    pub intake: Vec<IntakeStep>,
}

impl Lifestyle {
    pub fn is_empty(&self) -> bool {
        self.smoking.is_none()
            && self.alcohol.is_none()
            && self.exercise.is_none()
            && self.diet.is_none()
            && self.sleep.is_none()
            && self.notes.is_none()
    }
}

impl PatientData {
    /// Leniently read a patient record from JSON.
    ///
    /// Accepts camelCase and snake_case keys, a nested `medicalHistory`
    /// object or flat top-level fields, and strings or arrays for list
    /// fields. Non-object input yields an empty record.
    pub fn from_json(value: &Value) -> Self {
        let Some(root) = value.as_object() else {
            return Self::default();
        };
        let history = object_at(root, &["medicalHistory", "medical_history", "history"]);
        let demo = object_at(root, &["demographics", "patient"]);
        let life = object_at(root, &["lifestyle"]).or_else(|| {
            history.and_then(|h| object_at(h, &["lifestyle"]))
        });

        let lookup = |keys: &[&str]| lookup(root, history, keys);

        let demographics = Demographics {
            age: demo
                .and_then(|d| find(d, &["age"]))
                .or_else(|| find(root, &["age"]))
                .and_then(age_of)
                .or_else(|| {
                    const DOB_KEYS: &[&str] = &["dateOfBirth", "date_of_birth", "dob", "birthDate"];
                    demo.and_then(|d| find(d, DOB_KEYS))
                        .or_else(|| find(root, DOB_KEYS))
                        .and_then(Value::as_str)
                        .and_then(|dob| age_from_birth_date(dob, Utc::now().date_naive()))
                }),
            sex: demo
                .and_then(|d| find(d, &["sex", "gender"]))
                .or_else(|| find(root, &["sex", "gender"]))
                .and_then(text_of),
            occupation: demo
                .and_then(|d| find(d, &["occupation"]))
                .or_else(|| find(root, &["occupation"]))
                .and_then(text_of),
        };

        let mut lifestyle = Lifestyle::default();
        match life {
            Some(l) => {
                lifestyle.smoking = find(l, &["smoking", "tobacco"]).and_then(text_of);
                lifestyle.alcohol = find(l, &["alcohol", "drinking"]).and_then(text_of);
                lifestyle.exercise = find(l, &["exercise", "activity"]).and_then(text_of);
                lifestyle.diet = find(l, &["diet"]).and_then(text_of);
                lifestyle.sleep = find(l, &["sleep"]).and_then(text_of);
                lifestyle.notes = find(l, &["notes", "other"]).and_then(text_of);
            }
            None => {
                lifestyle.notes = lookup(&["lifestyle"]).and_then(text_of);
            }
        }

        Self {
            demographics,
            visit_reason: lookup(&[
                "visitReason",
                "visit_reason",
                "reasonForVisit",
                "chiefComplaint",
                "chief_complaint",
                "reason",
            ])
            .and_then(text_of),
            symptoms: lookup(&["symptoms", "symptomHistory", "symptom_history"])
                .map(list_of)
                .unwrap_or_default(),
            symptom_onset: lookup(&["symptomOnset", "symptom_onset", "onset"]).and_then(text_of),
            symptom_severity: lookup(&["symptomSeverity", "symptom_severity", "severity"])
                .and_then(text_of),
            conditions: lookup(&[
                "conditions",
                "pastConditions",
                "past_conditions",
                "pastMedicalHistory",
                "past_medical_history",
            ])
            .map(list_of)
            .unwrap_or_default(),
            surgeries: lookup(&["surgeries", "pastSurgeries", "past_surgeries", "procedures"])
                .map(list_of)
                .unwrap_or_default(),
            medications: lookup(&["medications", "currentMedications", "current_medications"])
                .map(list_of)
                .unwrap_or_default(),
            allergies: lookup(&["allergies"]).map(list_of).unwrap_or_default(),
            family_history: lookup(&["familyHistory", "family_history"])
                .map(list_of)
                .unwrap_or_default(),
            lifestyle,
            red_flags: lookup(&["redFlags", "red_flags", "safetyConcerns", "safety_concerns"])
                .map(list_of)
                .unwrap_or_default(),
            enhanced_summary: lookup(&["enhancedSummary", "enhanced_summary", "summary"])
                .and_then(text_of),
            transcript: lookup(&["transcript", "transcriptLines", "transcript_lines"])
                .map(lines_of)
                .unwrap_or_default(),
            intake: lookup(&["intake", "intakeAnswers", "intake_answers", "steps"])
                .map(intake_of)
                .unwrap_or_default(),
        }
    }
}

/// Look a key up at top level first, then inside the history object.
fn lookup<'a>(
    root: &'a Map<String, Value>,
    history: Option<&'a Map<String, Value>>,
    keys: &[&str],
) -> Option<&'a Value> {
    find(root, keys).or_else(|| history.and_then(|h| find(h, keys)))
}

fn find<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .find(|v| !v.is_null())
}

fn object_at<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Map<String, Value>> {
    find(map, keys).and_then(Value::as_object)
}

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Keys that name the thing an object entry describes; rendered first.
const NAME_KEYS: &[&str] = &["name", "medication", "drug", "allergen", "condition", "substance"];

/// Render an object's scalar values, name-like keys first, e.g. a medication
/// entry `{"dose": "500mg", "name": "metformin"}` becomes `metformin 500mg`.
fn object_text(map: &Map<String, Value>) -> Option<String> {
    let named = NAME_KEYS.iter().filter_map(|k| map.get(*k));
    let rest = map
        .iter()
        .filter(|(k, _)| !NAME_KEYS.contains(&k.as_str()))
        .map(|(_, v)| v);
    let parts: Vec<String> = named.chain(rest).filter_map(scalar_text).collect();
    (!parts.is_empty()).then(|| parts.join(" "))
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => {
            let parts = list_of_items(items);
            (!parts.is_empty()).then(|| parts.join("; "))
        }
        Value::Object(map) => object_text(map),
        other => scalar_text(other),
    }
}

fn list_of_items(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| match item {
            Value::Object(map) => object_text(map),
            other => scalar_text(other),
        })
        .collect()
}

fn list_of(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => list_of_items(items),
        Value::String(s) => s
            .split([';', '\n'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Value::Object(map) => object_text(map).into_iter().collect(),
        other => scalar_text(other).into_iter().collect(),
    }
}

fn lines_of(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => s
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect(),
        other => list_of(other),
    }
}

fn age_of(value: &Value) -> Option<u32> {
    let age = match value {
        Value::Number(n) => n.as_u64().and_then(|a| u32::try_from(a).ok()),
        Value::String(s) => {
            let digits: String = s.trim().chars().take_while(char::is_ascii_digit).collect();
            digits.parse().ok()
        }
        _ => None,
    };
    age.filter(|age| *age <= 130)
}

/// Whole years between an ISO `YYYY-MM-DD` birth date and `today`. Only the
/// age is kept; the birth date itself is never stored on the record.
fn age_from_birth_date(dob: &str, today: NaiveDate) -> Option<u32> {
    let born = NaiveDate::parse_from_str(dob.trim(), "%Y-%m-%d").ok()?;
    if born > today {
        return None;
    }
    let mut years = today.year() - born.year();
    if (today.month(), today.day()) < (born.month(), born.day()) {
        years -= 1;
    }
    u32::try_from(years).ok().filter(|age| *age <= 130)
}

fn intake_of(value: &Value) -> Vec<IntakeStep> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| serde_json::from_value::<IntakeStep>(item.clone()).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_nested_medical_history() {
        let data = PatientData::from_json(&json!({
            "demographics": {"age": 45, "gender": "female"},
            "visitReason": "Persistent cough",
            "medicalHistory": {
                "conditions": ["asthma", "hypertension"],
                "medications": [{"name": "lisinopril", "dose": "10mg"}],
                "allergies": "penicillin; latex",
                "familyHistory": "Father had type 2 diabetes"
            }
        }));

        assert_eq!(data.demographics.age, Some(45));
        assert_eq!(data.demographics.sex.as_deref(), Some("female"));
        assert_eq!(data.visit_reason.as_deref(), Some("Persistent cough"));
        assert_eq!(data.conditions, vec!["asthma", "hypertension"]);
        assert_eq!(data.medications, vec!["lisinopril 10mg"]);
        assert_eq!(data.allergies, vec!["penicillin", "latex"]);
        assert_eq!(data.family_history, vec!["Father had type 2 diabetes"]);
    }

    #[test]
    fn reads_flat_snake_case_fields() {
        let data = PatientData::from_json(&json!({
            "age": "62 years",
            "visit_reason": "Chest tightness",
            "symptoms": ["chest tightness", "fatigue"],
            "symptom_onset": "3 days ago",
            "transcript": "DOCTOR: How are you?\n\nPATIENT: Tired."
        }));

        assert_eq!(data.demographics.age, Some(62));
        assert_eq!(data.symptoms.len(), 2);
        assert_eq!(data.symptom_onset.as_deref(), Some("3 days ago"));
        assert_eq!(data.transcript, vec!["DOCTOR: How are you?", "PATIENT: Tired."]);
    }

    #[test]
    fn wrong_types_are_skipped_not_fatal() {
        let data = PatientData::from_json(&json!({
            "age": {"years": "unknown"},
            "allergies": null,
            "medications": [null, 42, {"nested": {"deep": true}}],
            "intake": "not a list"
        }));

        assert_eq!(data.demographics.age, None);
        assert!(data.allergies.is_empty());
        assert_eq!(data.medications, vec!["42"]);
        assert!(data.intake.is_empty());
    }

    #[test]
    fn non_object_input_yields_empty_record() {
        assert_eq!(PatientData::from_json(&json!("just text")), PatientData::default());
        assert_eq!(PatientData::from_json(&json!([1, 2, 3])), PatientData::default());
    }

    #[test]
    fn intake_steps_parse_and_skip_invalid_entries() {
        let data = PatientData::from_json(&json!({
            "intake": [
                {"step": "reason", "text": "Sore throat", "confirmed": true},
                {"step": "billing", "text": "n/a", "confirmed": true},
                {"step": "allergies", "text": "None known", "confirmed": false, "language": "en"}
            ]
        }));

        assert_eq!(data.intake.len(), 2);
        assert_eq!(data.intake[0].step, IntakeStepKind::Reason);
        assert!(!data.intake[1].confirmed);
    }

    #[test]
    fn age_is_derived_from_birth_date() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        assert_eq!(age_from_birth_date("1980-06-15", today), Some(44));
        assert_eq!(age_from_birth_date("1980-06-16", today), Some(43));
        assert_eq!(age_from_birth_date("2030-01-01", today), None);
        assert_eq!(age_from_birth_date("15/06/1980", today), None);
    }

    #[test]
    fn explicit_age_wins_over_birth_date() {
        let data = PatientData::from_json(&json!({"age": 50, "dateOfBirth": "1900-01-01"}));
        assert_eq!(data.demographics.age, Some(50));

        let data = PatientData::from_json(&json!({"demographics": {"dob": "1920-01-01"}}));
        assert!(data.demographics.age.is_some_and(|age| age >= 100));
    }

    #[test]
    fn implausible_age_is_dropped() {
        let data = PatientData::from_json(&json!({"age": 400}));
        assert_eq!(data.demographics.age, None);
    }

    #[test]
    fn lifestyle_string_becomes_notes() {
        let data = PatientData::from_json(&json!({"lifestyle": "Non-smoker, walks daily"}));
        assert_eq!(data.lifestyle.notes.as_deref(), Some("Non-smoker, walks daily"));
        assert!(!data.lifestyle.is_empty());
    }
}
