//! Turning extracted documents into deduplicated, embedded chunks.
//!
//! The pieces, in pipeline order:
//!
//! * [`corpus`] — loading `{id, title, body, source}` JSON files from disk.
//! * [`coordinator`] — the parallel Chunker → Fingerprint → Embedder →
//!   Vector Store driver with document-level failure containment.
//! * [`progress`] — expected-versus-stored accounting, usable mid-run.

pub mod coordinator;
pub mod corpus;
pub mod progress;

pub use coordinator::{CancelHandle, DocumentOutcome, IngestionCoordinator, IngestionReport};
pub use corpus::{CorpusLoad, Document, SkippedFile, load_corpus};
pub use progress::{ProgressSnapshot, expected_chunks};
