//! End-to-end corpus ingestion.
//!
//! The coordinator drives chunking, fingerprinting, embedding, and storage
//! for a whole corpus, processing documents independently across a bounded
//! worker pool. Documents are the unit of parallelism (not chunks): each
//! document's chunk list keeps its order from splitter to storage, and a
//! failing document is contained at its own boundary while the rest of the
//! run continues.
//!
//! Deduplication strategy, pinned: fingerprints are pre-filtered against
//! the store's key set *before* embedding, so duplicate-heavy corpora do
//! not pay embedding compute for text that is already stored. The
//! [`VectorBackend::upsert_if_absent`] call underneath still enforces
//! correctness even when the pre-filter is stale. Claims made by the
//! pre-filter are released when their chunks fail to reach storage, so
//! re-runs and concurrent duplicates can complete them.
//!
//! Cancellation checkpoints sit between documents: a cancelled run may
//! leave a document partially stored, and a later run completes the
//! missing chunks without duplicating the stored ones, because writes are
//! keyed by content.
//!
//! A coordinator instance drives one run at a time; its live `expected`
//! counter is reset per run.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::chunking::{ChunkSpan, split};
use crate::config::IngestionConfig;
use crate::embeddings::EmbeddingProvider;
use crate::fingerprint::{ExistingFingerprints, Fingerprint};
use crate::ingestion::corpus::{Document, load_corpus};
use crate::ingestion::progress::ProgressSnapshot;
use crate::stores::{EmbeddingRecord, StoredChunk, VectorBackend};
use crate::types::RagError;

/// Shared flag for interrupting a run between documents.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-document result of a run.
#[derive(Clone, Debug, Serialize)]
pub struct DocumentOutcome {
    pub doc_id: String,
    pub source: String,
    /// Chunks the document split into.
    pub chunk_count: usize,
    /// Records newly written for this document.
    pub added: usize,
    /// Chunks skipped because their fingerprint was already present.
    pub skipped: usize,
    /// Set when the document was abandoned mid-way; already-stored chunks
    /// stay valid and a re-run completes the remainder.
    pub error: Option<String>,
}

impl DocumentOutcome {
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Aggregate result of a run.
#[derive(Clone, Debug, Serialize)]
pub struct IngestionReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Sum of chunk counts across processed documents.
    pub expected_chunks: usize,
    pub added: usize,
    pub skipped: usize,
    pub failed_documents: usize,
    /// Documents never started because the run was cancelled.
    pub cancelled_documents: usize,
    /// Store record count after the run.
    pub store_count: usize,
    pub documents: Vec<DocumentOutcome>,
}

/// Orchestrates Chunker → Fingerprint → Embedder → Vector Store for a
/// corpus of documents.
pub struct IngestionCoordinator {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorBackend>,
    config: IngestionConfig,
    cancel: CancelHandle,
    expected: Arc<AtomicUsize>,
}

impl IngestionCoordinator {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorBackend>,
        config: IngestionConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            config,
            cancel: CancelHandle::default(),
            expected: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Handle for interrupting the run from another task.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Live `expected` versus the store's current count; valid mid-run.
    pub async fn progress(&self) -> Result<ProgressSnapshot, RagError> {
        let stored = self.store.count().await?;
        Ok(ProgressSnapshot {
            expected: self.expected.load(Ordering::Relaxed),
            stored,
        })
    }

    /// Loads a corpus directory and ingests it; files the loader had to
    /// skip appear in the report as failed documents.
    pub async fn run_dir(&self, dir: impl AsRef<Path>) -> Result<IngestionReport, RagError> {
        let load = load_corpus(dir).await?;
        let mut report = self.run(load.documents).await?;
        for skipped in load.skipped {
            report.failed_documents += 1;
            report.documents.push(DocumentOutcome {
                doc_id: skipped.path.display().to_string(),
                source: skipped.path.display().to_string(),
                chunk_count: 0,
                added: 0,
                skipped: 0,
                error: Some(skipped.reason),
            });
        }
        Ok(report)
    }

    /// Ingests `corpus`, returning the aggregate report.
    ///
    /// Fails fast with [`RagError::StorageUnavailable`] when the store does
    /// not answer the initial probe; after that point every failure is
    /// contained at its document's boundary.
    pub async fn run(&self, corpus: Vec<Document>) -> Result<IngestionReport, RagError> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4().to_string();

        self.store
            .ping()
            .await
            .map_err(|err| RagError::StorageUnavailable(err.to_string()))?;

        // Refreshed from the store every run; doubles as the within-run
        // claim set shared by all workers.
        let keys = self.store.existing_fingerprints().await?;
        let existing = Arc::new(ExistingFingerprints::from_keys(
            keys.into_iter().map(Fingerprint::from_stored),
        ));
        self.expected.store(0, Ordering::Relaxed);

        info!(
            run_id = %run_id,
            documents = corpus.len(),
            known_fingerprints = existing.len(),
            workers = self.config.workers,
            "starting ingestion run"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.workers));
        let mut tasks: JoinSet<Option<DocumentOutcome>> = JoinSet::new();
        for document in corpus {
            let semaphore = Arc::clone(&semaphore);
            let embedder = Arc::clone(&self.embedder);
            let store = Arc::clone(&self.store);
            let existing = Arc::clone(&existing);
            let expected = Arc::clone(&self.expected);
            let config = self.config.clone();
            let cancel = self.cancel.clone();

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return None;
                };
                if cancel.is_cancelled() {
                    return None;
                }
                Some(ingest_document(document, config, embedder, store, existing, expected).await)
            });
        }

        let mut documents = Vec::new();
        let mut cancelled_documents = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(outcome)) => documents.push(outcome),
                Ok(None) => cancelled_documents += 1,
                Err(err) => error!(%err, "ingestion worker panicked"),
            }
        }
        documents.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));

        let store_count = with_retries(&self.config, "final store count", || {
            let store = Arc::clone(&self.store);
            async move { store.count().await }
        })
        .await?;

        let report = IngestionReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            expected_chunks: self.expected.load(Ordering::Relaxed),
            added: documents.iter().map(|d| d.added).sum(),
            skipped: documents.iter().map(|d| d.skipped).sum(),
            failed_documents: documents.iter().filter(|d| d.failed()).count(),
            cancelled_documents,
            store_count,
            documents,
        };

        info!(
            run_id = %report.run_id,
            added = report.added,
            skipped = report.skipped,
            failed = report.failed_documents,
            cancelled = report.cancelled_documents,
            store_count = report.store_count,
            "ingestion run finished"
        );
        Ok(report)
    }
}

async fn ingest_document(
    document: Document,
    config: IngestionConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorBackend>,
    existing: Arc<ExistingFingerprints>,
    expected: Arc<AtomicUsize>,
) -> DocumentOutcome {
    let spans = split(&document.body, &config.policy);
    expected.fetch_add(spans.len(), Ordering::Relaxed);

    let mut outcome = DocumentOutcome {
        doc_id: document.id.clone(),
        source: document.source.clone(),
        chunk_count: spans.len(),
        added: 0,
        skipped: 0,
        error: None,
    };

    // Pre-filter: claim fresh fingerprints, count the rest as skipped
    // without spending embedding compute on them.
    let mut pending: Vec<(ChunkSpan, Fingerprint)> = Vec::new();
    for span in spans {
        let fp = Fingerprint::of_text(&span.text);
        if existing.claim(&fp) {
            pending.push((span, fp));
        } else {
            outcome.skipped += 1;
        }
    }

    let mut failed: Option<RagError> = None;
    let mut idx = 0;
    'batches: while idx < pending.len() {
        let end = (idx + config.embed_batch_size).min(pending.len());
        let batch = &pending[idx..end];
        let texts: Vec<String> = batch.iter().map(|(span, _)| span.text.clone()).collect();

        let vectors = match with_retries(&config, "embed batch", || {
            let embedder = Arc::clone(&embedder);
            let texts = texts.clone();
            async move { embedder.embed_batch(&texts).await }
        })
        .await
        {
            Ok(vectors) if vectors.len() == texts.len() => vectors,
            Ok(vectors) => {
                release_from(&existing, &pending[idx..]);
                failed = Some(RagError::Embedding(format!(
                    "expected {} vectors, provider returned {}",
                    texts.len(),
                    vectors.len()
                )));
                break;
            }
            Err(err) => {
                release_from(&existing, &pending[idx..]);
                failed = Some(err);
                break;
            }
        };

        for (offset, ((span, fp), embedding)) in batch.iter().zip(vectors).enumerate() {
            let record = EmbeddingRecord {
                chunk: StoredChunk {
                    fingerprint: fp.as_str().to_string(),
                    doc_id: document.id.clone(),
                    title: document.title.clone(),
                    source: document.source.clone(),
                    chunk_index: span.order_index,
                    content: span.text.clone(),
                },
                embedding,
            };

            let stored = with_retries(&config, "upsert chunk", || {
                let store = Arc::clone(&store);
                let record = record.clone();
                async move { store.upsert_if_absent(record).await }
            })
            .await;

            match stored {
                Ok(true) => outcome.added += 1,
                // Lost a race against a writer outside this run; the
                // record exists, which is all that matters.
                Ok(false) => outcome.skipped += 1,
                Err(err) => {
                    release_from(&existing, &pending[idx + offset..]);
                    failed = Some(err);
                    break 'batches;
                }
            }
        }
        idx = end;
    }

    match &failed {
        None => info!(
            doc_id = %outcome.doc_id,
            chunks = outcome.chunk_count,
            added = outcome.added,
            skipped = outcome.skipped,
            "ingested document"
        ),
        Some(err) => {
            error!(doc_id = %outcome.doc_id, error = %err, "skipping document after repeated failures");
            outcome.error = Some(err.to_string());
        }
    }
    outcome
}

fn release_from(existing: &ExistingFingerprints, remainder: &[(ChunkSpan, Fingerprint)]) {
    for (_, fp) in remainder {
        existing.release(fp);
    }
}

/// Runs `op`, retrying transient failures with exponential backoff up to
/// `config.max_retries` before handing the error to the caller.
async fn with_retries<T, F, Fut>(
    config: &IngestionConfig,
    what: &str,
    mut op: F,
) -> Result<T, RagError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RagError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < config.max_retries => {
                let delay = config.retry_backoff * 2u32.saturating_pow(attempt);
                warn!(error = %err, attempt, operation = what, "retrying after backoff");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
