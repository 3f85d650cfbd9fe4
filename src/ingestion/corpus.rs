//! Loading extracted documents from disk.
//!
//! The extraction collaborator (office-document parsing, captioning) writes
//! one JSON file per document with the schema `{id, title, body, source}`.
//! This loader only depends on that schema, not on how the files were
//! produced. Malformed or unreadable files are skipped and reported rather
//! than failing the load: one bad export must never block the corpus.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::warn;

use crate::types::RagError;

/// An extracted document, immutable once produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub body: String,
    /// Path or URI of the original file the body was extracted from.
    pub source: String,
}

/// A file the loader could not turn into a [`Document`].
#[derive(Clone, Debug, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Result of scanning a corpus directory.
#[derive(Debug, Default)]
pub struct CorpusLoad {
    pub documents: Vec<Document>,
    pub skipped: Vec<SkippedFile>,
}

/// Reads every `*.json` file under `dir` into [`Document`]s.
///
/// Files are visited in name order so corpus iteration is deterministic.
/// A missing or unreadable directory is a hard error; individual bad files
/// are collected into [`CorpusLoad::skipped`].
pub async fn load_corpus(dir: impl AsRef<Path>) -> Result<CorpusLoad, RagError> {
    let dir = dir.as_ref();
    let mut entries = fs::read_dir(dir).await?;

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut load = CorpusLoad::default();
    for path in paths {
        match read_document(&path).await {
            Ok(document) => load.documents.push(document),
            Err(reason) => {
                warn!(path = %path.display(), %reason, "skipping unreadable document");
                load.skipped.push(SkippedFile { path, reason });
            }
        }
    }
    Ok(load)
}

async fn read_document(path: &Path) -> Result<Document, String> {
    let raw = fs::read_to_string(path)
        .await
        .map_err(|err| err.to_string())?;
    let document: Document = serde_json::from_str(&raw).map_err(|err| err.to_string())?;
    if document.id.is_empty() {
        return Err("document id is empty".to_string());
    }
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn doc_json(id: &str, body: &str) -> String {
        serde_json::json!({
            "id": id,
            "title": format!("Title {id}"),
            "body": body,
            "source": format!("docs/{id}.docx"),
        })
        .to_string()
    }

    #[tokio::test]
    async fn loads_documents_in_name_order() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.json"), doc_json("b", "second"))
            .await
            .unwrap();
        fs::write(dir.path().join("a.json"), doc_json("a", "first"))
            .await
            .unwrap();
        fs::write(dir.path().join("notes.txt"), "not a corpus file")
            .await
            .unwrap();

        let load = load_corpus(dir.path()).await.unwrap();
        assert_eq!(load.documents.len(), 2);
        assert_eq!(load.documents[0].id, "a");
        assert_eq!(load.documents[1].id, "b");
        assert!(load.skipped.is_empty());
    }

    #[tokio::test]
    async fn malformed_files_are_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("good.json"), doc_json("good", "body"))
            .await
            .unwrap();
        fs::write(dir.path().join("broken.json"), "{not valid json")
            .await
            .unwrap();
        fs::write(
            dir.path().join("empty_id.json"),
            doc_json("", "body with no id"),
        )
        .await
        .unwrap();

        let load = load_corpus(dir.path()).await.unwrap();
        assert_eq!(load.documents.len(), 1);
        assert_eq!(load.documents[0].id, "good");
        assert_eq!(load.skipped.len(), 2);
    }

    #[tokio::test]
    async fn missing_directory_is_a_hard_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            load_corpus(&missing).await,
            Err(RagError::Io(_))
        ));
    }
}
