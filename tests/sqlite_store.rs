//! Durable backend tests: sqlite-vec registration, idempotent upsert,
//! cosine-ordered search, and survival across reopen.

use tempfile::tempdir;

use kbsmith::stores::{EmbeddingRecord, SqliteVectorStore, StoredChunk, VectorBackend};

fn record(fingerprint: &str, content: &str, embedding: Vec<f32>) -> EmbeddingRecord {
    EmbeddingRecord {
        chunk: StoredChunk {
            fingerprint: fingerprint.to_string(),
            doc_id: "doc-1".to_string(),
            title: "Doc".to_string(),
            source: "docs/doc.docx".to_string(),
            chunk_index: 0,
            content: content.to_string(),
        },
        embedding,
    }
}

#[tokio::test]
async fn upsert_is_idempotent_and_counts_reconcile() {
    let dir = tempdir().unwrap();
    let store = SqliteVectorStore::open(dir.path().join("kb.db")).await.unwrap();
    store.ping().await.unwrap();

    assert!(
        store
            .upsert_if_absent(record("fp-a", "alpha", vec![1.0, 0.0]))
            .await
            .unwrap()
    );
    assert!(
        !store
            .upsert_if_absent(record("fp-a", "alpha", vec![1.0, 0.0]))
            .await
            .unwrap()
    );
    assert!(
        store
            .upsert_if_absent(record("fp-b", "beta", vec![0.0, 1.0]))
            .await
            .unwrap()
    );
    assert_eq!(store.count().await.unwrap(), 2);

    let keys = store.existing_fingerprints().await.unwrap();
    assert!(keys.contains("fp-a"));
    assert!(keys.contains("fp-b"));
    assert_eq!(keys.len(), 2);
}

#[tokio::test]
async fn search_orders_by_cosine_similarity_and_caps_at_k() {
    let dir = tempdir().unwrap();
    let store = SqliteVectorStore::open(dir.path().join("kb.db")).await.unwrap();

    store
        .upsert_if_absent(record("fp-east", "east", vec![1.0, 0.0]))
        .await
        .unwrap();
    store
        .upsert_if_absent(record("fp-north", "north", vec![0.0, 1.0]))
        .await
        .unwrap();
    store
        .upsert_if_absent(record("fp-ne", "northeast", vec![0.7, 0.7]))
        .await
        .unwrap();

    let results = store.search(&[1.0, 0.0], 2).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].0.content, "east");
    assert_eq!(results[1].0.content, "northeast");
    assert!(results[0].1 >= results[1].1);
    assert!((results[0].1 - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn records_survive_reopening_the_database() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("kb.db");

    {
        let store = SqliteVectorStore::open(&path).await.unwrap();
        store
            .upsert_if_absent(record("fp-a", "durable chunk", vec![0.5, 0.5]))
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    let reopened = SqliteVectorStore::open(&path).await.unwrap();
    assert_eq!(reopened.count().await.unwrap(), 1);
    assert!(
        reopened
            .existing_fingerprints()
            .await
            .unwrap()
            .contains("fp-a")
    );

    let results = reopened.search(&[0.5, 0.5], 1).await.unwrap();
    assert_eq!(results[0].0.content, "durable chunk");
    assert_eq!(results[0].0.chunk_index, 0);
}
