//! Knowledge-base search service.
//!
//! Serves `POST /search-kb` and `GET /health` over the configured vector
//! store. Environment (via `.env` or the process environment):
//!
//!   KBSMITH_DB         sqlite database path (default: kbsmith.db)
//!   KBSMITH_EMBED_URL  embedding server endpoint; without it the
//!                      deterministic hash embedder is used
//!   KBSMITH_EMBED_DIM  embedding dimension for the HTTP provider
//!   KBSMITH_BIND       listen address (default: 127.0.0.1:9172)

use std::env;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, fmt};
use url::Url;

use kbsmith::embeddings::{EmbeddingProvider, HashEmbeddingProvider, HttpEmbeddingProvider};
use kbsmith::retrieval::Retriever;
use kbsmith::server::router;
use kbsmith::stores::SqliteVectorStore;
use kbsmith::types::RagError;

#[tokio::main]
async fn main() -> Result<(), RagError> {
    init_tracing();
    dotenvy::dotenv().ok();

    let db_path = kbsmith::config::resolve_db_path(None);
    let bind = env::var("KBSMITH_BIND").unwrap_or_else(|_| "127.0.0.1:9172".to_string());

    let embedder: Arc<dyn EmbeddingProvider> = match env::var("KBSMITH_EMBED_URL") {
        Ok(raw) => {
            let endpoint =
                Url::parse(&raw).map_err(|err| RagError::Http(format!("KBSMITH_EMBED_URL: {err}")))?;
            let dimensions = env::var("KBSMITH_EMBED_DIM")
                .ok()
                .and_then(|value| value.parse::<usize>().ok())
                .unwrap_or(768);
            let client = reqwest::Client::builder().use_rustls_tls().build()?;
            Arc::new(HttpEmbeddingProvider::new(client, endpoint, dimensions))
        }
        Err(_) => Arc::new(HashEmbeddingProvider::new()),
    };

    let store = Arc::new(SqliteVectorStore::open(&db_path).await?);
    let retriever = Arc::new(Retriever::new(embedder, store));

    let listener = TcpListener::bind(&bind).await?;
    tracing::info!(%bind, db = %db_path, "search service listening");

    axum::serve(listener, router(retriever))
        .await
        .map_err(|err| RagError::Io(err.to_string()))?;
    Ok(())
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let subscriber = fmt()
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
