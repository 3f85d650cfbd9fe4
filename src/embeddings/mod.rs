//! Pluggable embedding providers.
//!
//! The ingestion coordinator and retriever both speak [`EmbeddingProvider`]:
//! a batch of texts in, one fixed-dimension vector per text out, in input
//! order. Embedding is the expensive step of the pipeline, so callers batch
//! rather than embed chunk-by-chunk, and providers must tolerate concurrent
//! calls from multiple ingestion workers.
//!
//! Failure semantics are whole-batch: a provider either returns a vector for
//! every input or an error for the entire call, and the caller retries with
//! backoff. Partial-failure reporting is deliberately not part of the
//! contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::types::RagError;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds `texts`, returning one vector per input in the same order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;

    /// Vector width, constant across every call for the provider's lifetime.
    fn dimensions(&self) -> usize;

    /// Short provider label for logs and telemetry.
    fn name(&self) -> &str;
}

/// Deterministic hashed bag-of-words embedder.
///
/// Each lowercase alphanumeric token is hashed into one of `dimensions`
/// buckets and the resulting count vector is L2-normalized. Texts sharing
/// vocabulary land near each other under cosine similarity, which makes
/// ranking behavior observable in tests without a model server. Pure and
/// stateless: the same text always produces the same vector.
#[derive(Clone, Debug)]
pub struct HashEmbeddingProvider {
    dimensions: usize,
}

impl HashEmbeddingProvider {
    pub const DEFAULT_DIMENSIONS: usize = 256;

    pub fn new() -> Self {
        Self {
            dimensions: Self::DEFAULT_DIMENSIONS,
        }
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut vector = vec![0.0f32; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let bucket = (hasher.finish() % self.dimensions as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "hash-bow"
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Embedding provider backed by an HTTP model server.
///
/// Sends `POST {endpoint}` with `{"input": [...]}` (plus `"model"` when
/// configured) and expects `{"embeddings": [[f32, ...], ...]}` — the shape
/// served by common sentence-transformer inference frontends. The response
/// is validated for count and dimension before being handed to callers, so
/// a misconfigured server surfaces as [`RagError::Embedding`] rather than as
/// corrupted records downstream.
#[derive(Clone, Debug)]
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    endpoint: Url,
    model: Option<String>,
    dimensions: usize,
}

impl HttpEmbeddingProvider {
    pub fn new(client: reqwest::Client, endpoint: Url, dimensions: usize) -> Self {
        Self {
            client,
            endpoint,
            model: None,
            dimensions,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbedRequest {
            input: texts,
            model: self.model.as_deref(),
        };
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|err| RagError::Embedding(err.to_string()))?
            .error_for_status()
            .map_err(|err| RagError::Embedding(err.to_string()))?;

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|err| RagError::Embedding(err.to_string()))?;

        if parsed.embeddings.len() != texts.len() {
            return Err(RagError::Embedding(format!(
                "expected {} embeddings, server returned {}",
                texts.len(),
                parsed.embeddings.len()
            )));
        }
        for vector in &parsed.embeddings {
            if vector.len() != self.dimensions {
                return Err(RagError::Embedding(format!(
                    "expected dimension {}, server returned {}",
                    self.dimensions,
                    vector.len()
                )));
            }
        }

        Ok(parsed.embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Cosine similarity between two vectors of equal length.
///
/// Zero-norm inputs score 0 rather than NaN. This is the crate's pinned
/// similarity metric; both vector store backends report the same quantity.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
