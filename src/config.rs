//! Process configuration for the clinical question-answering pipeline.
//!
//! Values are read once at startup from the environment. Every key is
//! optional; anything unset falls back to the defaults below.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "clinic-rag";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Upper bound for sampling temperature at every completion call site.
pub const MAX_TEMPERATURE: f32 = 0.3;

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "clinic_rag=info,warn"
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Completion backend settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionConfig {
    /// Base URL; requests go to `{base_url}/generate`.
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

/// One trusted literature source (Entrez-style two-step API).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiteratureSourceConfig {
    pub name: String,
    pub search_url: String,
    pub fetch_url: String,
    pub database: String,
    /// Never serialized; passed as a query parameter only.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub requests_per_minute: u32,
}

/// External literature search settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiteratureConfig {
    pub timeout_secs: u64,
    pub max_results: usize,
    pub excerpt_chars: usize,
    pub sources: Vec<LiteratureSourceConfig>,
}

/// Full pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    pub completion: CompletionConfig,
    pub literature: LiteratureConfig,
    pub retrieval_limit: usize,
    pub redaction_cache_capacity: usize,
}

// ═══════════════════════════════════════════════════════════
// Defaults
// ═══════════════════════════════════════════════════════════

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/api".into(),
            model: "llama3.2".into(),
            timeout_secs: 20,
            temperature: 0.2,
            top_p: 0.9,
            max_tokens: 800,
        }
    }
}

impl LiteratureSourceConfig {
    /// NCBI PubMed via E-utilities. Keyless access is limited to 3 req/s by
    /// NCBI; we stay far below that per process.
    pub fn pubmed(api_key: Option<String>) -> Self {
        let requests_per_minute = if api_key.is_some() { 10 } else { 3 };
        Self {
            name: "PubMed".into(),
            search_url: "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi".into(),
            fetch_url: "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi".into(),
            database: "pubmed".into(),
            api_key,
            requests_per_minute,
        }
    }
}

impl Default for LiteratureConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            max_results: 5,
            excerpt_chars: 600,
            sources: vec![LiteratureSourceConfig::pubmed(None)],
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            completion: CompletionConfig::default(),
            literature: LiteratureConfig::default(),
            retrieval_limit: 5,
            redaction_cache_capacity: 1000,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Environment
// ═══════════════════════════════════════════════════════════

impl PipelineConfig {
    /// Build configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup (testable without
    /// touching the process environment).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("CLINIC_RAG_COMPLETION_URL").or_else(|| {
            get("OLLAMA_BASE_URL").map(|base| format!("{}/api", base.trim_end_matches('/')))
        }) {
            config.completion.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = get("CLINIC_RAG_COMPLETION_MODEL").or_else(|| get("OLLAMA_MODEL")) {
            config.completion.model = model;
        }
        if let Some(v) = get("CLINIC_RAG_COMPLETION_TIMEOUT_SECS") {
            config.completion.timeout_secs = parse("CLINIC_RAG_COMPLETION_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("CLINIC_RAG_TEMPERATURE") {
            let t = parse_finite("CLINIC_RAG_TEMPERATURE", &v)?;
            config.completion.temperature = t.clamp(0.0, MAX_TEMPERATURE);
        }
        if let Some(v) = get("CLINIC_RAG_TOP_P") {
            config.completion.top_p = parse_finite("CLINIC_RAG_TOP_P", &v)?.clamp(0.0, 1.0);
        }
        if let Some(v) = get("CLINIC_RAG_MAX_TOKENS") {
            config.completion.max_tokens = parse("CLINIC_RAG_MAX_TOKENS", &v)?;
        }

        if let Some(v) = get("CLINIC_RAG_LITERATURE_TIMEOUT_SECS") {
            config.literature.timeout_secs = parse("CLINIC_RAG_LITERATURE_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("CLINIC_RAG_LITERATURE_MAX_RESULTS") {
            config.literature.max_results = parse("CLINIC_RAG_LITERATURE_MAX_RESULTS", &v)?;
        }
        if let Some(v) = get("CLINIC_RAG_EXCERPT_CHARS") {
            config.literature.excerpt_chars = parse("CLINIC_RAG_EXCERPT_CHARS", &v)?;
        }
        let mut pubmed = LiteratureSourceConfig::pubmed(get("CLINIC_RAG_PUBMED_API_KEY"));
        if let Some(v) = get("CLINIC_RAG_PUBMED_RPM") {
            pubmed.requests_per_minute = parse("CLINIC_RAG_PUBMED_RPM", &v)?;
        }
        config.literature.sources = vec![pubmed];

        if let Some(v) = get("CLINIC_RAG_RETRIEVAL_LIMIT") {
            config.retrieval_limit = parse("CLINIC_RAG_RETRIEVAL_LIMIT", &v)?;
        }
        if let Some(v) = get("CLINIC_RAG_REDACTION_CACHE") {
            config.redaction_cache_capacity = parse("CLINIC_RAG_REDACTION_CACHE", &v)?;
        }

        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Sampling parameters must be real numbers; `NaN` and infinities parse as
/// `f32` but cannot be clamped or serialized.
fn parse_finite(key: &str, value: &str) -> Result<f32, ConfigError> {
    let parsed: f32 = parse(key, value)?;
    if !parsed.is_finite() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        });
    }
    Ok(parsed)
}
