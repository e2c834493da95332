//! Grounded clinical question answering over per-case patient records, with
//! PHI redaction on everything that leaves the pipeline.

pub mod config;
pub mod models;
pub mod pipeline;

mod phi_audit;

use tracing_subscriber::EnvFilter;

pub use config::PipelineConfig;
pub use models::{Answer, Chunk, ExternalSnippet, PatientData, SourceRef};
pub use pipeline::rag::RagOrchestrator;
pub use pipeline::redaction::{redact, redact_structured, Redactor};

/// Install a fmt subscriber reading `RUST_LOG`, falling back to
/// [`config::default_log_filter`]. Later calls are no-ops.
pub fn init_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
    }
}
