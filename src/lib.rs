//! ```text
//! Extracted documents ──► ingestion::corpus ──► IngestionCoordinator
//!                                                     │
//!                     chunking::split ◄───────────────┤
//!                     fingerprint::Fingerprint ◄──────┤
//!                     embeddings (batched) ◄──────────┤
//!                                                     ▼
//!                              stores::VectorBackend (keyed by fingerprint)
//!                                                     ▲
//! User query ──► retrieval::Retriever ────────────────┘
//!                       │
//!                       └──► server (POST /search-kb, GET /health)
//! ```
//!
//! kbsmith ingests a corpus of extracted documents into a content-addressed
//! vector store and serves top-k similarity retrieval over it. Chunking is
//! deterministic under a fixed policy, storage writes are idempotent per
//! content fingerprint, and retrieval degrades to an explicit empty result
//! rather than failing through the HTTP boundary.

pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod fingerprint;
pub mod ingestion;
pub mod retrieval;
#[cfg(feature = "server")]
pub mod server;
pub mod stores;
pub mod types;

pub use chunking::{ChunkSpan, split};
pub use config::{ChunkPolicy, IngestionConfig};
pub use embeddings::{EmbeddingProvider, HashEmbeddingProvider, HttpEmbeddingProvider};
pub use fingerprint::{ExistingFingerprints, Fingerprint};
pub use ingestion::{Document, IngestionCoordinator, IngestionReport};
pub use retrieval::{Retriever, ScoredPassage, SearchOutcome};
pub use stores::{
    EmbeddingRecord, InMemoryVectorStore, SqliteVectorStore, StoredChunk, VectorBackend,
};
pub use types::RagError;
