//! Durable backend on SQLite with the `sqlite-vec` extension.
//!
//! Layout: a `chunks` table keyed by fingerprint carrying text and source
//! attribution, and a `chunk_embeddings` table holding the `vec_f32` blobs.
//! `INSERT OR IGNORE` inside a transaction gives `upsert_if_absent` its
//! atomicity; `vec_distance_cosine` drives search. The on-disk file survives
//! process restarts, which is the only layout property callers may rely on.

use std::collections::HashSet;
use std::mem::transmute;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::Once;

use async_trait::async_trait;
use tokio_rusqlite::{Connection, ffi};

use super::{EmbeddingRecord, StoredChunk, VectorBackend};
use crate::types::RagError;

#[derive(Clone)]
pub struct SqliteVectorStore {
    conn: Connection,
}

impl SqliteVectorStore {
    /// Opens (creating if needed) the store at `path`.
    ///
    /// Registers the sqlite-vec extension process-wide on first use and
    /// verifies it loaded by querying `vec_version()`. Failures here mean
    /// the store is unusable, so they map to [`RagError::StorageUnavailable`]
    /// rather than the mid-run [`RagError::Storage`].
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, RagError> {
        Self::register_sqlite_vec()?;
        let conn = Connection::open(path)
            .await
            .map_err(|err| RagError::StorageUnavailable(err.to_string()))?;

        conn.call(|conn| -> tokio_rusqlite::Result<()> {
            conn.query_row("SELECT vec_version()", [], |row| row.get::<_, String>(0))
                .map_err(tokio_rusqlite::Error::Error)?;

            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS chunks (
                     fingerprint TEXT PRIMARY KEY,
                     doc_id      TEXT NOT NULL,
                     title       TEXT NOT NULL,
                     source      TEXT NOT NULL,
                     chunk_index INTEGER NOT NULL,
                     content     TEXT NOT NULL
                 );
                 CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source);
                 CREATE TABLE IF NOT EXISTS chunk_embeddings (
                     fingerprint TEXT PRIMARY KEY,
                     embedding   BLOB NOT NULL
                 );",
            )
            .map_err(tokio_rusqlite::Error::Error)?;
            Ok(())
        })
        .await
        .map_err(|err| RagError::StorageUnavailable(err.to_string()))?;

        Ok(Self { conn })
    }

    fn register_sqlite_vec() -> Result<(), RagError> {
        use std::sync::Mutex;

        static INIT: Once = Once::new();
        static INIT_RESULT: Mutex<Option<Result<(), String>>> = Mutex::new(None);

        INIT.call_once(|| {
            let result = unsafe {
                type SqliteExtensionInit = unsafe extern "C" fn(
                    *mut ffi::sqlite3,
                    *mut *mut c_char,
                    *const ffi::sqlite3_api_routines,
                ) -> i32;

                let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
                let init_fn: SqliteExtensionInit =
                    transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
                let rc = ffi::sqlite3_auto_extension(Some(init_fn));
                if rc != 0 {
                    Err(format!(
                        "failed to register sqlite-vec extension (code {rc})"
                    ))
                } else {
                    Ok(())
                }
            };
            *INIT_RESULT.lock().expect("init result mutex poisoned") = Some(result);
        });

        INIT_RESULT
            .lock()
            .expect("init result mutex poisoned")
            .clone()
            .expect("init was called but result not set")
            .map_err(RagError::StorageUnavailable)
    }

    /// Direct connection handle for queries outside the trait surface.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[async_trait]
impl VectorBackend for SqliteVectorStore {
    async fn ping(&self) -> Result<(), RagError> {
        self.conn
            .call(|conn| -> tokio_rusqlite::Result<()> {
                conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                    .map_err(tokio_rusqlite::Error::Error)?;
                Ok(())
            })
            .await
            .map_err(|err| RagError::StorageUnavailable(err.to_string()))
    }

    async fn upsert_if_absent(&self, record: EmbeddingRecord) -> Result<bool, RagError> {
        let embedding_json = serde_json::to_string(&record.embedding)
            .map_err(|err| RagError::Storage(err.to_string()))?;
        let chunk = record.chunk;

        self.conn
            .call(move |conn| -> tokio_rusqlite::Result<bool> {
                let tx = conn
                    .transaction()
                    .map_err(tokio_rusqlite::Error::Error)?;

                let inserted = tx
                    .execute(
                        "INSERT OR IGNORE INTO chunks \
                         (fingerprint, doc_id, title, source, chunk_index, content) \
                         VALUES (?, ?, ?, ?, ?, ?)",
                        (
                            &chunk.fingerprint,
                            &chunk.doc_id,
                            &chunk.title,
                            &chunk.source,
                            chunk.chunk_index as i64,
                            &chunk.content,
                        ),
                    )
                    .map_err(tokio_rusqlite::Error::Error)?;

                if inserted == 1 {
                    tx.execute(
                        "INSERT OR IGNORE INTO chunk_embeddings (fingerprint, embedding) \
                         VALUES (?, vec_f32(?))",
                        (&chunk.fingerprint, &embedding_json),
                    )
                    .map_err(tokio_rusqlite::Error::Error)?;
                }

                tx.commit().map_err(tokio_rusqlite::Error::Error)?;
                Ok(inserted == 1)
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))
    }

    async fn existing_fingerprints(&self) -> Result<HashSet<String>, RagError> {
        self.conn
            .call(|conn| -> tokio_rusqlite::Result<HashSet<String>> {
                let mut stmt = conn
                    .prepare("SELECT fingerprint FROM chunks")
                    .map_err(tokio_rusqlite::Error::Error)?;
                let rows = stmt
                    .query_map([], |row| row.get::<_, String>(0))
                    .map_err(tokio_rusqlite::Error::Error)?;

                let mut keys = HashSet::new();
                for row in rows {
                    keys.insert(row.map_err(tokio_rusqlite::Error::Error)?);
                }
                Ok(keys)
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<(StoredChunk, f32)>, RagError> {
        let embedding_json = serde_json::to_string(query_embedding)
            .map_err(|err| RagError::Storage(err.to_string()))?;

        self.conn
            .call(move |conn| -> tokio_rusqlite::Result<Vec<(StoredChunk, f32)>> {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT c.fingerprint, c.doc_id, c.title, c.source, c.chunk_index, \
                         c.content, vec_distance_cosine(e.embedding, vec_f32(?)) AS distance \
                         FROM chunks c \
                         JOIN chunk_embeddings e ON c.fingerprint = e.fingerprint \
                         ORDER BY distance ASC \
                         LIMIT {k}"
                    ))
                    .map_err(tokio_rusqlite::Error::Error)?;

                let rows = stmt
                    .query_map([&embedding_json], |row| {
                        let chunk = StoredChunk {
                            fingerprint: row.get(0)?,
                            doc_id: row.get(1)?,
                            title: row.get(2)?,
                            source: row.get(3)?,
                            chunk_index: row.get::<_, i64>(4)? as usize,
                            content: row.get(5)?,
                        };
                        let distance: f32 = row.get(6)?;
                        Ok((chunk, 1.0 - distance))
                    })
                    .map_err(tokio_rusqlite::Error::Error)?;

                let mut results = Vec::new();
                for row in rows {
                    results.push(row.map_err(tokio_rusqlite::Error::Error)?);
                }
                Ok(results)
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))
    }

    async fn count(&self) -> Result<usize, RagError> {
        self.conn
            .call(|conn| -> tokio_rusqlite::Result<usize> {
                let count: i64 = conn
                    .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
                    .map_err(tokio_rusqlite::Error::Error)?;
                Ok(count as usize)
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))
    }
}
