//! Brute-force in-memory backend.
//!
//! Holds records in a `HashMap` behind a `parking_lot::RwLock` and scores
//! queries by scanning every vector. Suitable for tests and small embedded
//! corpora; the durable backend is [`super::SqliteVectorStore`].

use std::collections::HashMap;
use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{EmbeddingRecord, StoredChunk, VectorBackend};
use crate::embeddings::cosine_similarity;
use crate::types::RagError;

#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    records: RwLock<HashMap<String, EmbeddingRecord>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorBackend for InMemoryVectorStore {
    async fn ping(&self) -> Result<(), RagError> {
        Ok(())
    }

    async fn upsert_if_absent(&self, record: EmbeddingRecord) -> Result<bool, RagError> {
        let mut records = self.records.write();
        if records.contains_key(&record.chunk.fingerprint) {
            return Ok(false);
        }
        records.insert(record.chunk.fingerprint.clone(), record);
        Ok(true)
    }

    async fn existing_fingerprints(&self) -> Result<HashSet<String>, RagError> {
        Ok(self.records.read().keys().cloned().collect())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<(StoredChunk, f32)>, RagError> {
        let records = self.records.read();
        let mut scored: Vec<(StoredChunk, f32)> = records
            .values()
            .map(|record| {
                let score = cosine_similarity(query_embedding, &record.embedding);
                (record.chunk.clone(), score)
            })
            .collect();
        // Fingerprint tie-break keeps equal-score results in a stable order.
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.fingerprint.cmp(&b.0.fingerprint))
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn count(&self) -> Result<usize, RagError> {
        Ok(self.records.read().len())
    }
}
