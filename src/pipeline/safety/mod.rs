//! Text hygiene at the completion boundary: clinician queries going in,
//! model output coming out.

pub mod output_sanitize;
pub mod sanitize;

pub use output_sanitize::sanitize_model_output;
pub use sanitize::{
    sanitize_clinician_query, wrap_query_for_prompt, SanitizedQuery, MAX_QUERY_CHARS,
};
