//! Vector store backends.
//!
//! This module defines the [`VectorBackend`] trait that the ingestion
//! coordinator and retriever are written against, so pipeline code is not
//! tied to a specific database.
//!
//! ```text
//!                   ┌──────────────────┐
//!                   │  VectorBackend   │
//!                   │ (async, keyed by │
//!                   │   fingerprint)   │
//!                   └────────┬─────────┘
//!                            │
//!               ┌────────────┴────────────┐
//!               ▼                         ▼
//!       ┌───────────────┐        ┌────────────────┐
//!       │    SQLite     │        │   In-memory    │
//!       │  sqlite-vec   │        │ (tests, small  │
//!       │   (durable)   │        │    corpora)    │
//!       └───────────────┘        └────────────────┘
//! ```
//!
//! # Keying and deduplication
//!
//! Records are keyed by content [`Fingerprint`](crate::fingerprint::Fingerprint);
//! [`VectorBackend::upsert_if_absent`] is the single mechanism that enforces
//! the deduplication invariant. An insert for an existing key mutates
//! nothing and reports `false` (first-writer-wins — content for a given
//! fingerprint is by definition identical, so only the source attribution
//! could differ, and the first writer's wins).
//!
//! # Similarity metric
//!
//! Pinned to cosine similarity, reported as `1 - cosine distance` in
//! `[-1, 1]`, identical across backends. Mixing metrics between backends
//! would silently change ranking, so any future backend must report the
//! same quantity.

pub mod memory;
pub mod sqlite;

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::RagError;

pub use memory::InMemoryVectorStore;
pub use sqlite::SqliteVectorStore;

/// A persisted chunk as handed back by queries: the raw text plus enough
/// attribution to trace it to its origin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    /// Content hash; the storage primary key.
    pub fingerprint: String,
    /// Identifier of the document this text was first seen in.
    pub doc_id: String,
    pub title: String,
    /// Path or URI the document was extracted from.
    pub source: String,
    /// Position of the chunk within its first-seen document.
    pub chunk_index: usize,
    pub content: String,
}

/// A chunk plus its embedding, ready for [`VectorBackend::upsert_if_absent`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub chunk: StoredChunk,
    pub embedding: Vec<f32>,
}

/// Keyed vector storage with idempotent writes and top-k similarity search.
///
/// Implementations serialize concurrent `upsert_if_absent` calls for the
/// same fingerprint; no cross-fingerprint coordination is required. `count`
/// reflects every successful insert immediately, so progress reporting can
/// reconcile it against `upsert_if_absent` outcomes at any point mid-run.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Cheap availability probe. Failure at the start of an ingestion run is
    /// fatal for the run ([`RagError::StorageUnavailable`]).
    async fn ping(&self) -> Result<(), RagError>;

    /// Inserts the record unless its fingerprint already exists. Returns
    /// `true` when a new record was stored, `false` for the no-op case.
    async fn upsert_if_absent(&self, record: EmbeddingRecord) -> Result<bool, RagError>;

    /// The store's current key set, used to seed the per-run dedup handle.
    async fn existing_fingerprints(&self) -> Result<HashSet<String>, RagError>;

    /// At most `k` records ordered by non-increasing cosine similarity.
    async fn search(
        &self,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<(StoredChunk, f32)>, RagError>;

    /// Total stored records.
    async fn count(&self) -> Result<usize, RagError>;
}
