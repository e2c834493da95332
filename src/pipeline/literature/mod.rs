//! External medical literature search.
//!
//! Best effort by contract: a source that fails or is over its quota
//! contributes nothing to the merged result list, and the caller never sees
//! an error.

pub mod entrez;
pub mod excerpt;
pub mod rate_limit;
pub mod search;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::ExternalSnippet;

pub use entrez::EntrezSource;
pub use rate_limit::RateLimiter;
pub use search::ExternalSearch;

#[derive(Error, Debug)]
pub enum LiteratureError {
    #[error("Literature HTTP error: {0}")]
    Http(String),

    #[error("Literature source returned {status}")]
    Status { status: u16 },

    #[error("Literature response parsing error: {0}")]
    Parse(String),
}

/// A trusted literature provider.
#[async_trait]
pub trait LiteratureSource: Send + Sync {
    fn name(&self) -> &str;

    /// Up to `max_results` snippets, best match first.
    async fn search(&self, query: &str, max_results: usize)
        -> Result<Vec<ExternalSnippet>, LiteratureError>;
}
