pub mod types;
pub mod retrieval;
pub mod context;
pub mod prompt;
pub mod citation;
pub mod ollama;
pub mod generator;
pub mod summary;
pub mod orchestrator;

use thiserror::Error;

pub use context::CaseContext;
pub use generator::Generator;
pub use ollama::{MockCompletion, OllamaClient};
pub use orchestrator::RagOrchestrator;
pub use retrieval::Retriever;
pub use summary::IntakeSummary;
pub use types::{CompletionBackend, GenerationOptions};

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Completion backend unreachable at {0}")]
    BackendConnection(String),

    #[error("Completion backend returned {status}: {body}")]
    BackendStatus { status: u16, body: String },

    #[error("Completion request timed out after {0}s")]
    Timeout(u64),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("Literature search setup failed: {0}")]
    LiteratureSetup(#[from] crate::pipeline::literature::LiteratureError),
}
