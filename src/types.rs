//! Crate-wide error taxonomy.
//!
//! Every fallible operation in kbsmith funnels into [`RagError`]. The
//! variants map onto containment boundaries rather than onto modules:
//!
//! - [`RagError::InvalidDocument`] and [`RagError::Embedding`] are contained
//!   at the document boundary by the ingestion coordinator (skip and
//!   continue).
//! - [`RagError::StorageUnavailable`] is fatal at the start of an ingestion
//!   run; mid-run storage errors surface as [`RagError::Storage`] and are
//!   retried before escalating to a document-level skip.
//! - [`RagError::InvalidPolicy`] is a configuration error and always
//!   propagates to the top level.
//! - [`RagError::Retrieval`] is converted into an explicit empty result by
//!   [`crate::retrieval::Retriever::search`] so it never crosses the HTTP
//!   boundary as a raised error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    /// A document could not be read or parsed into the expected schema.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// Chunking policy violates `chunk_size > overlap >= 0`.
    #[error("invalid chunk policy: {0}")]
    InvalidPolicy(String),

    /// The embedding provider failed for a whole batch.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The vector store could not be reached at all.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A storage operation failed after the store was reachable.
    #[error("storage error: {0}")]
    Storage(String),

    /// A retrieval call failed end to end.
    #[error("retrieval failed: {0}")]
    Retrieval(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("http error: {0}")]
    Http(String),
}

impl From<std::io::Error> for RagError {
    fn from(err: std::io::Error) -> Self {
        RagError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for RagError {
    fn from(err: reqwest::Error) -> Self {
        RagError::Http(err.to_string())
    }
}

impl RagError {
    /// `true` when the error is worth retrying with backoff rather than
    /// escalating immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RagError::Embedding(_) | RagError::Storage(_) | RagError::Http(_)
        )
    }
}
