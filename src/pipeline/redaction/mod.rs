//! De-identification of text crossing the trust boundary.
//!
//! An ordered rule list runs over the input; text replaced by an earlier
//! rule is protected from every later rule in the same pass.

pub mod cache;
pub mod redactor;
pub mod rules;

use thiserror::Error;

pub use redactor::{clear_cache, global, redact, redact_structured, RedactionOutcome, Redactor};
pub use rules::{RedactionRule, RuleSpec};

#[derive(Error, Debug)]
pub enum RedactionError {
    #[error("Invalid pattern for rule {name}: {reason}")]
    InvalidPattern { name: String, reason: String },

    #[error("Rule list is empty")]
    NoRules,
}
