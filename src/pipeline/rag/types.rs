use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::RagError;
use crate::config::{CompletionConfig, MAX_TEMPERATURE};

/// Sampling options sent with every completion request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl GenerationOptions {
    /// Temperature is clamped to `[0, MAX_TEMPERATURE]` at construction.
    /// Non-finite temperature or top_p fall back to 0 and 1.
    pub fn new(temperature: f32, top_p: f32, max_tokens: u32) -> Self {
        let temperature = if temperature.is_finite() { temperature } else { 0.0 };
        let top_p = if top_p.is_finite() { top_p } else { 1.0 };
        Self {
            temperature: temperature.clamp(0.0, MAX_TEMPERATURE),
            top_p: top_p.clamp(0.0, 1.0),
            max_tokens,
        }
    }

    /// Same options with temperature forced to zero, for structured output.
    pub fn deterministic(self) -> Self {
        Self {
            temperature: 0.0,
            ..self
        }
    }
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self::from(&CompletionConfig::default())
    }
}

impl From<&CompletionConfig> for GenerationOptions {
    fn from(config: &CompletionConfig) -> Self {
        Self::new(config.temperature, config.top_p, config.max_tokens)
    }
}

/// Black-box text completion service.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, prompt: &str, options: &GenerationOptions) -> Result<String, RagError>;
}
