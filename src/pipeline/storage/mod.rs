pub mod types;
pub mod chunker;
pub mod embedder;
pub mod vectordb;

use thiserror::Error;

pub use chunker::DocumentProcessor;
pub use embedder::TermFrequencyEncoder;
pub use types::{ChunkStore, EmbeddingModel};
pub use vectordb::InMemoryChunkIndex;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum StorageError {
    #[error("Chunk belongs to case {found}, expected {expected}")]
    CaseMismatch { expected: String, found: String },

    #[error("Empty case id")]
    EmptyCaseId,
}
