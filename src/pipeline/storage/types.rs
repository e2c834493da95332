use std::sync::Arc;

use super::StorageError;
use crate::models::Chunk;

/// Deterministic text encoder. The same text must always produce a
/// bit-identical vector of length `dimension()`.
pub trait EmbeddingModel: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f32>;

    fn embed_batch(&self, texts: &[&str]) -> Vec<Vec<f32>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize;
}

/// Allow `Box<dyn EmbeddingModel>` to be used as `&impl EmbeddingModel`.
impl EmbeddingModel for Box<dyn EmbeddingModel> {
    fn embed(&self, text: &str) -> Vec<f32> {
        (**self).embed(text)
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }
}

/// Case-partitioned chunk storage.
///
/// Writes replace a case's whole chunk set. Reads hand out a snapshot, so a
/// query that started before a replace keeps seeing the set it started with.
pub trait ChunkStore: Send + Sync {
    /// Chunks for `case_id` in creation order; empty when the case is unknown.
    fn get(&self, case_id: &str) -> Arc<[Chunk]>;

    /// Drop every chunk of `case_id` and store `chunks` in its place.
    fn replace_all(&self, case_id: &str, chunks: Vec<Chunk>) -> Result<usize, StorageError>;

    /// Forget a case; returns the number of chunks dropped.
    fn remove(&self, case_id: &str) -> usize;

    fn case_ids(&self) -> Vec<String>;
}
