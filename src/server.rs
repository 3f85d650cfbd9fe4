//! HTTP surface for the retriever.
//!
//! Exposes the knowledge-base search service consumed by the downstream
//! agents: `POST /search-kb {query} -> {passages: [...]}` plus a
//! `GET /health` liveness probe. Retrieval failures degrade to an empty
//! passage list with the error carried alongside — the route never answers
//! with a 5xx for a bad retrieval, because agents are expected to proceed
//! with "no context found".
//!
//! The chat gateway and per-mode agents stay external processes; this
//! module only models their wire vocabulary ([`AgentMode`],
//! [`ErrorEnvelope`]) so the dispatch surface is a closed set of variants
//! instead of a stringly-typed lookup.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::retrieval::Retriever;

/// The closed set of specialist agents behind the external router.
///
/// Serialized lowercase on the wire (`sop`, `rca`, `ticket`). An
/// unsupported mode fails to parse instead of falling through a dictionary
/// lookup at dispatch time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    /// Standard-operating-procedure generation.
    Sop,
    /// Root-cause analysis.
    Rca,
    /// Ticket resolution.
    Ticket,
}

impl AgentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentMode::Sop => "sop",
            AgentMode::Rca => "rca",
            AgentMode::Ticket => "ticket",
        }
    }
}

impl FromStr for AgentMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "sop" => Ok(AgentMode::Sop),
            "rca" => Ok(AgentMode::Rca),
            "ticket" => Ok(AgentMode::Ticket),
            other => Err(format!("unsupported agent mode '{other}'")),
        }
    }
}

/// Error envelope the external dispatch layer passes back on failure.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    /// Optional result cap; defaults to [`Retriever::DEFAULT_K`].
    pub k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub passages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
}

/// Builds the search router over a shared retriever.
pub fn router(retriever: Arc<Retriever>) -> Router {
    Router::new()
        .route("/search-kb", post(search_kb))
        .route("/health", get(health))
        .with_state(retriever)
}

async fn search_kb(
    State(retriever): State<Arc<Retriever>>,
    Json(request): Json<SearchRequest>,
) -> Json<SearchResponse> {
    let k = request.k.unwrap_or(Retriever::DEFAULT_K);
    let outcome = retriever.search(&request.query, k).await;
    Json(SearchResponse {
        passages: outcome
            .passages
            .into_iter()
            .map(|passage| passage.content)
            .collect(),
        error: outcome.error,
    })
}

async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::embeddings::{EmbeddingProvider, HashEmbeddingProvider};
    use crate::stores::{EmbeddingRecord, InMemoryVectorStore, StoredChunk, VectorBackend};
    use crate::types::RagError;

    struct BrokenEmbedder;

    #[async_trait]
    impl EmbeddingProvider for BrokenEmbedder {
        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            Err(RagError::Embedding("down".into()))
        }

        fn dimensions(&self) -> usize {
            4
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    #[tokio::test]
    async fn search_kb_returns_passage_texts() {
        let embedder = HashEmbeddingProvider::new();
        let store = InMemoryVectorStore::new();
        let batch = vec!["database failover runbook".to_string()];
        let embedding = embedder.embed_batch(&batch).await.unwrap().pop().unwrap();
        store
            .upsert_if_absent(EmbeddingRecord {
                chunk: StoredChunk {
                    fingerprint: "fp".into(),
                    doc_id: "doc".into(),
                    title: "Runbook".into(),
                    source: "docs/runbook.md".into(),
                    chunk_index: 0,
                    content: "database failover runbook".into(),
                },
                embedding,
            })
            .await
            .unwrap();

        let retriever = Arc::new(Retriever::new(Arc::new(embedder), Arc::new(store)));
        let response = search_kb(
            State(retriever),
            Json(SearchRequest {
                query: "database failover".into(),
                k: None,
            }),
        )
        .await;

        assert_eq!(response.0.passages, vec!["database failover runbook"]);
        assert!(response.0.error.is_none());
    }

    #[tokio::test]
    async fn search_kb_degrades_instead_of_erroring() {
        let retriever = Arc::new(Retriever::new(
            Arc::new(BrokenEmbedder),
            Arc::new(InMemoryVectorStore::new()),
        ));
        let response = search_kb(
            State(retriever),
            Json(SearchRequest {
                query: "anything".into(),
                k: Some(3),
            }),
        )
        .await;

        assert!(response.0.passages.is_empty());
        assert!(response.0.error.is_some());
    }

    #[tokio::test]
    async fn health_answers_ok() {
        assert_eq!(health().await.0.status, "ok");
    }

    #[test]
    fn agent_mode_round_trips_lowercase() {
        for (mode, text) in [
            (AgentMode::Sop, "sop"),
            (AgentMode::Rca, "rca"),
            (AgentMode::Ticket, "ticket"),
        ] {
            assert_eq!(mode.as_str(), text);
            assert_eq!(AgentMode::from_str(text).unwrap(), mode);
            assert_eq!(serde_json::to_string(&mode).unwrap(), format!("\"{text}\""));
        }
        assert!(AgentMode::from_str("summarize").is_err());
    }
}
