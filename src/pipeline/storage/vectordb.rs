use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::types::ChunkStore;
use super::StorageError;
use crate::models::Chunk;

/// Process-local chunk index partitioned by case id.
///
/// No persistence: a restart loses every case and the surrounding
/// application re-ingests on first use.
pub struct InMemoryChunkIndex {
    cases: RwLock<HashMap<String, Arc<[Chunk]>>>,
}

impl InMemoryChunkIndex {
    pub fn new() -> Self {
        Self {
            cases: RwLock::new(HashMap::new()),
        }
    }

    pub fn count(&self) -> usize {
        self.cases
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|chunks| chunks.len())
            .sum()
    }

    pub fn count_for_case(&self, case_id: &str) -> usize {
        self.get(case_id).len()
    }
}

impl Default for InMemoryChunkIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkStore for InMemoryChunkIndex {
    fn get(&self, case_id: &str) -> Arc<[Chunk]> {
        self.cases
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(case_id)
            .cloned()
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }

    fn replace_all(&self, case_id: &str, mut chunks: Vec<Chunk>) -> Result<usize, StorageError> {
        if case_id.trim().is_empty() {
            return Err(StorageError::EmptyCaseId);
        }
        if let Some(stray) = chunks.iter().find(|c| c.case_id != case_id) {
            return Err(StorageError::CaseMismatch {
                expected: case_id.to_string(),
                found: stray.case_id.clone(),
            });
        }

        chunks.sort_by_key(|c| c.sequence);
        let count = chunks.len();
        let mut cases = self.cases.write().unwrap_or_else(PoisonError::into_inner);
        if chunks.is_empty() {
            cases.remove(case_id);
        } else {
            cases.insert(case_id.to_string(), Arc::from(chunks));
        }
        Ok(count)
    }

    fn remove(&self, case_id: &str) -> usize {
        self.cases
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(case_id)
            .map_or(0, |chunks| chunks.len())
    }

    fn case_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .cases
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}
