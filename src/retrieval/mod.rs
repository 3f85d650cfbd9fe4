//! Query-time retrieval.
//!
//! [`Retriever`] embeds a query string (a single-item batch against the
//! same [`EmbeddingProvider`] ingestion uses) and delegates to the store's
//! top-k search. It is read-only, stateless apart from a short-lived query
//! embedding memo, and safe to call concurrently with ingestion.
//!
//! Two call shapes:
//!
//! * [`Retriever::retrieve`] returns `Result` for callers that want to
//!   handle failures themselves.
//! * [`Retriever::search`] never fails: embedder or storage errors come
//!   back as an empty passage list with the error captured as an explicit
//!   signal, so downstream agents degrade to "no context found" instead of
//!   crashing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

use crate::embeddings::EmbeddingProvider;
use crate::stores::VectorBackend;
use crate::types::RagError;

/// A retrieved chunk with its attribution and similarity score.
#[derive(Clone, Debug, Serialize)]
pub struct ScoredPassage {
    pub content: String,
    pub source: String,
    pub title: String,
    pub score: f32,
}

/// Failure-free retrieval result: empty passages plus the error signal when
/// something went wrong.
#[derive(Clone, Debug, Serialize)]
pub struct SearchOutcome {
    pub passages: Vec<ScoredPassage>,
    pub error: Option<String>,
}

/// Memo of recent query embeddings keyed by the exact query string.
///
/// Retrieval is called far more often than ingestion and repeated queries
/// are common; re-embedding an identical string within a short window is
/// pure waste. Entries expire after the TTL and the map is bounded.
struct QueryMemo {
    entries: Mutex<HashMap<String, (Instant, Vec<f32>)>>,
    ttl: Duration,
    capacity: usize,
}

impl QueryMemo {
    fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            capacity,
        }
    }

    fn get(&self, query: &str) -> Option<Vec<f32>> {
        let entries = self.entries.lock();
        entries
            .get(query)
            .filter(|(at, _)| at.elapsed() < self.ttl)
            .map(|(_, vector)| vector.clone())
    }

    fn put(&self, query: String, vector: Vec<f32>) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            entries.retain(|_, (at, _)| at.elapsed() < self.ttl);
            if entries.len() >= self.capacity {
                entries.clear();
            }
        }
        entries.insert(query, (Instant::now(), vector));
    }
}

pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorBackend>,
    memo: QueryMemo,
}

impl Retriever {
    /// Passage count used when callers do not specify `k`; matches the
    /// original knowledge-base service.
    pub const DEFAULT_K: usize = 8;

    const MEMO_TTL: Duration = Duration::from_secs(60);
    const MEMO_CAPACITY: usize = 128;

    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorBackend>) -> Self {
        Self {
            embedder,
            store,
            memo: QueryMemo::new(Self::MEMO_TTL, Self::MEMO_CAPACITY),
        }
    }

    /// Top-`k` passages for `query`, ordered by non-increasing similarity.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredPassage>, RagError> {
        let embedding = match self.memo.get(query) {
            Some(vector) => vector,
            None => {
                let batch = [query.to_string()];
                let mut vectors = self
                    .embedder
                    .embed_batch(&batch)
                    .await
                    .map_err(|err| RagError::Retrieval(err.to_string()))?;
                let vector = vectors
                    .pop()
                    .ok_or_else(|| RagError::Retrieval("embedder returned no vector".into()))?;
                self.memo.put(query.to_string(), vector.clone());
                vector
            }
        };

        let hits = self
            .store
            .search(&embedding, k)
            .await
            .map_err(|err| RagError::Retrieval(err.to_string()))?;

        Ok(hits
            .into_iter()
            .map(|(chunk, score)| ScoredPassage {
                content: chunk.content,
                source: chunk.source,
                title: chunk.title,
                score,
            })
            .collect())
    }

    /// Like [`retrieve`](Self::retrieve), but failures degrade to an empty
    /// result carrying the error signal instead of propagating.
    pub async fn search(&self, query: &str, k: usize) -> SearchOutcome {
        match self.retrieve(query, k).await {
            Ok(passages) => SearchOutcome {
                passages,
                error: None,
            },
            Err(err) => {
                warn!(%err, "retrieval degraded to empty result");
                SearchOutcome {
                    passages: Vec::new(),
                    error: Some(err.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::embeddings::HashEmbeddingProvider;
    use crate::stores::{EmbeddingRecord, InMemoryVectorStore, StoredChunk, VectorBackend};

    struct CountingEmbedder {
        inner: HashEmbeddingProvider,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.inner.embed_batch(texts).await
        }

        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl EmbeddingProvider for BrokenEmbedder {
        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            Err(RagError::Embedding("model server down".into()))
        }

        fn dimensions(&self) -> usize {
            4
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    async fn seeded_store(embedder: &HashEmbeddingProvider, texts: &[&str]) -> InMemoryVectorStore {
        let store = InMemoryVectorStore::new();
        for (idx, text) in texts.iter().enumerate() {
            let owned = vec![text.to_string()];
            let embedding = embedder.embed_batch(&owned).await.unwrap().pop().unwrap();
            store
                .upsert_if_absent(EmbeddingRecord {
                    chunk: StoredChunk {
                        fingerprint: format!("fp-{idx}"),
                        doc_id: format!("doc-{idx}"),
                        title: format!("Doc {idx}"),
                        source: format!("docs/{idx}.md"),
                        chunk_index: 0,
                        content: text.to_string(),
                    },
                    embedding,
                })
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn retrieve_caps_results_at_k() {
        let embedder = HashEmbeddingProvider::new();
        let store = seeded_store(&embedder, &["alpha one", "alpha two", "alpha three"]).await;
        let retriever = Retriever::new(Arc::new(embedder), Arc::new(store));

        let passages = retriever.retrieve("alpha", 2).await.unwrap();
        assert_eq!(passages.len(), 2);
        assert!(passages[0].score >= passages[1].score);
    }

    #[tokio::test]
    async fn search_degrades_to_empty_with_error_signal() {
        let store = InMemoryVectorStore::new();
        let retriever = Retriever::new(Arc::new(BrokenEmbedder), Arc::new(store));

        let outcome = retriever.search("anything", 5).await;
        assert!(outcome.passages.is_empty());
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn repeated_queries_reuse_the_memoized_embedding() {
        let counting = Arc::new(CountingEmbedder {
            inner: HashEmbeddingProvider::new(),
            calls: AtomicUsize::new(0),
        });
        let store = InMemoryVectorStore::new();
        let retriever = Retriever::new(counting.clone(), Arc::new(store));

        retriever.retrieve("database outage", 3).await.unwrap();
        retriever.retrieve("database outage", 3).await.unwrap();
        assert_eq!(counting.calls.load(Ordering::Relaxed), 1);
    }
}
