//! Content-addressed chunk identity.
//!
//! A [`Fingerprint`] is the first 128 bits of SHA-256 over the exact UTF-8
//! bytes of a chunk's text, hex-encoded. No normalization is applied before
//! hashing: byte-identical text is the only thing that collapses, which
//! keeps matching predictable. The fingerprint doubles as the storage
//! primary key, so identical paragraphs appearing in different documents
//! produce a single stored record and re-ingestion of unchanged content is
//! a no-op.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hex-encoded 128-bit content hash of a chunk's text.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Number of hex characters in a fingerprint (128 bits).
    pub const HEX_LEN: usize = 32;

    pub fn of_text(text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let digest = hasher.finalize();
        Fingerprint(hex::encode(&digest[..Self::HEX_LEN / 2]))
    }

    /// Wraps a value read back from storage.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Fingerprint(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.0
    }
}

/// The store's key set at the start of a run, doubling as the within-run
/// claim set.
///
/// This is an explicit handle passed into the ingestion coordinator and
/// refreshed from the vector store per run, never a process-global cache, so
/// a restart can't serve stale membership. Workers claim fingerprints before
/// embedding; a claim that fails to reach storage is released so a
/// concurrent duplicate or a later re-run can complete it.
#[derive(Debug, Default)]
pub struct ExistingFingerprints {
    seen: parking_lot::Mutex<HashSet<Fingerprint>>,
}

impl ExistingFingerprints {
    pub fn from_keys(keys: impl IntoIterator<Item = Fingerprint>) -> Self {
        Self {
            seen: parking_lot::Mutex::new(keys.into_iter().collect()),
        }
    }

    /// Attempts to claim `fp`, returning `true` when the caller is first.
    pub fn claim(&self, fp: &Fingerprint) -> bool {
        self.seen.lock().insert(fp.clone())
    }

    /// Releases a claim after a failed embed/store attempt.
    pub fn release(&self, fp: &Fingerprint) {
        self.seen.lock().remove(fp);
    }

    pub fn contains(&self, fp: &Fingerprint) -> bool {
        self.seen.lock().contains(fp)
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }
}
