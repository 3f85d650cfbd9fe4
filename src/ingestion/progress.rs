//! Ingestion progress accounting.
//!
//! Progress is the ratio of `expected` (sum of chunk counts across the
//! corpus) to `stored` (the vector store's record count). Neither side is
//! persisted: `expected` is recomputed from the corpus and policy on
//! demand, `stored` is read live from the store, so the numbers can be
//! reconciled at any point during or after a run. `stored` only grows while
//! a run is in flight, and deduplication means it may legitimately settle
//! below `expected` for corpora with repeated text.

use serde::Serialize;

use crate::chunking::split;
use crate::config::ChunkPolicy;
use crate::ingestion::corpus::Document;
use crate::stores::VectorBackend;
use crate::types::RagError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    /// Chunk count the corpus should produce under the active policy.
    pub expected: usize,
    /// Records currently in the vector store.
    pub stored: usize,
}

impl ProgressSnapshot {
    /// Completion percentage, clamped to 100 (dedup can leave `stored`
    /// short of `expected` forever, never above it for a single corpus).
    pub fn percent(&self) -> f64 {
        if self.expected == 0 {
            return 0.0;
        }
        ((self.stored as f64 / self.expected as f64) * 100.0).min(100.0)
    }
}

/// Chunk count the corpus yields under `policy`, without touching storage.
///
/// The policy must match the one the corpus was (or will be) ingested
/// under, otherwise the denominator describes a different corpus
/// generation.
pub fn expected_chunks(documents: &[Document], policy: &ChunkPolicy) -> usize {
    documents
        .iter()
        .map(|doc| split(&doc.body, policy).len())
        .sum()
}

/// Reads a snapshot of `expected` versus the store's live count.
pub async fn snapshot(
    store: &dyn VectorBackend,
    expected: usize,
) -> Result<ProgressSnapshot, RagError> {
    let stored = store.count().await?;
    Ok(ProgressSnapshot { expected, stored })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, body: String) -> Document {
        Document {
            id: id.to_string(),
            title: id.to_string(),
            body,
            source: format!("docs/{id}.md"),
        }
    }

    #[test]
    fn expected_counts_sum_across_documents() {
        let policy = ChunkPolicy::new(800, 80).unwrap();
        let corpus = vec![
            doc("short", "tiny".to_string()),
            doc("long", "x".repeat(1500)),
            doc("empty", String::new()),
        ];
        // 1 chunk + 2 chunks + 0 chunks.
        assert_eq!(expected_chunks(&corpus, &policy), 3);
    }

    #[test]
    fn percent_is_clamped_and_zero_safe() {
        assert_eq!(
            ProgressSnapshot {
                expected: 0,
                stored: 0
            }
            .percent(),
            0.0
        );
        let half = ProgressSnapshot {
            expected: 10,
            stored: 5,
        };
        assert!((half.percent() - 50.0).abs() < f64::EPSILON);
        let over = ProgressSnapshot {
            expected: 10,
            stored: 12,
        };
        assert_eq!(over.percent(), 100.0);
    }
}
