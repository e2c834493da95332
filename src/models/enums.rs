use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Invalid {field} value: {value}")]
pub struct InvalidEnum {
    pub field: String,
    pub value: String,
}

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = InvalidEnum;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(SourceKind {
    Intake => "intake",
    MedicalHistory => "medical_history",
    EnhancedSummary => "enhanced_summary",
    Transcript => "transcript",
    External => "external",
});

str_enum!(IntakeStepKind {
    Greeting => "greeting",
    Identification => "identification",
    Reason => "reason",
    Onset => "onset",
    Severity => "severity",
    History => "history",
    Allergies => "allergies",
    Safety => "safety",
});

str_enum!(RedactionCategory {
    Name => "name",
    Contact => "contact",
    Identifier => "identifier",
    Date => "date",
    MedicalIdentifier => "medical_identifier",
});

str_enum!(AnswerStatus {
    Grounded => "grounded",
    NotInRecords => "not_in_records",
    UnverifiedTerms => "unverified_terms",
    NoContext => "no_context",
    BackendUnavailable => "backend_unavailable",
});

impl SourceKind {
    /// Patient-derived sources count toward grounding; literature does not.
    pub fn is_patient_derived(&self) -> bool {
        !matches!(self, Self::External)
    }
}
