//! Chunking and ingestion configuration.
//!
//! [`ChunkPolicy`] is the versioned splitting policy: the same document body
//! under the same policy always yields the same chunk sequence, so changing
//! either field starts a new corpus generation. [`IngestionConfig`] bundles
//! the policy with worker-pool and retry knobs for a run.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::RagError;

/// Window size and overlap for [`crate::chunking::split`], in characters.
///
/// Invariant: `chunk_size > overlap`. Constructed through [`ChunkPolicy::new`]
/// so an invalid pair is rejected up front instead of surfacing as a hung or
/// degenerate split later.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPolicy {
    chunk_size: usize,
    overlap: usize,
}

impl ChunkPolicy {
    /// Matches the policy the original knowledge base was embedded under.
    pub const DEFAULT_CHUNK_SIZE: usize = 800;
    pub const DEFAULT_OVERLAP: usize = 80;

    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, RagError> {
        if chunk_size == 0 {
            return Err(RagError::InvalidPolicy("chunk_size must be > 0".into()));
        }
        if overlap >= chunk_size {
            return Err(RagError::InvalidPolicy(format!(
                "overlap {overlap} must be smaller than chunk_size {chunk_size}"
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Character stride between consecutive hard-cut windows.
    pub fn stride(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self {
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
            overlap: Self::DEFAULT_OVERLAP,
        }
    }
}

/// Knobs for a single ingestion run.
#[derive(Clone, Debug)]
pub struct IngestionConfig {
    pub policy: ChunkPolicy,
    /// Bound on concurrently processed documents.
    pub workers: usize,
    /// Chunks per embedding call; batching is the main throughput lever.
    pub embed_batch_size: usize,
    /// Retries for transient embedder/storage failures before a
    /// document-level skip.
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries.
    pub retry_backoff: Duration,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            policy: ChunkPolicy::default(),
            workers: 4,
            embed_batch_size: 16,
            max_retries: 2,
            retry_backoff: Duration::from_millis(250),
        }
    }
}

impl IngestionConfig {
    #[must_use]
    pub fn with_policy(mut self, policy: ChunkPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    #[must_use]
    pub fn with_embed_batch_size(mut self, size: usize) -> Self {
        self.embed_batch_size = size.max(1);
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    #[must_use]
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }
}

/// Resolves the sqlite database path from `KBSMITH_DB`, falling back to a
/// local default.
pub fn resolve_db_path(provided: Option<String>) -> String {
    if let Some(path) = provided {
        return path;
    }
    dotenvy::dotenv().ok();
    std::env::var("KBSMITH_DB").unwrap_or_else(|_| "kbsmith.db".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_rejects_overlap_not_smaller_than_chunk_size() {
        assert!(ChunkPolicy::new(100, 100).is_err());
        assert!(ChunkPolicy::new(100, 150).is_err());
        assert!(ChunkPolicy::new(0, 0).is_err());
        assert!(ChunkPolicy::new(100, 0).is_ok());
    }

    #[test]
    fn default_policy_matches_corpus_generation() {
        let policy = ChunkPolicy::default();
        assert_eq!(policy.chunk_size(), 800);
        assert_eq!(policy.overlap(), 80);
        assert_eq!(policy.stride(), 720);
    }

    #[test]
    fn config_builders_clamp_to_sane_minimums() {
        let config = IngestionConfig::default()
            .with_workers(0)
            .with_embed_batch_size(0);
        assert_eq!(config.workers, 1);
        assert_eq!(config.embed_batch_size, 1);
    }
}
