//! Retrieval and remembering on top of the embedder and the memory store.
//!
//! Both operations are async for the caller but do their CPU- and
//! SQLite-bound work on the blocking pool, the same way every store access in
//! this crate is driven from async code.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;

use crate::config::{Config, RetrievalConfig};
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::memory::store::MemoryStore;
use crate::memory::types::{token_count, MemoryEntry, SearchHit};

#[derive(Clone)]
pub struct ContextManager {
    store: Arc<MemoryStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    retrieval: RetrievalConfig,
}

impl ContextManager {
    pub fn new(
        store: Arc<MemoryStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        retrieval: RetrievalConfig,
    ) -> Result<Self> {
        if retrieval.top_k == 0 {
            return Err(Error::config("retrieval.top_k must be a positive integer"));
        }
        if embedder.dimensions() != store.dimension() {
            return Err(Error::config(format!(
                "embedder `{}` produces {} dims but store expects {}",
                embedder.name(),
                embedder.dimensions(),
                store.dimension()
            )));
        }
        Ok(Self {
            store,
            embedder,
            retrieval,
        })
    }

    /// Build the embedder and open the configured collection, creating it if needed.
    pub fn from_config(config: &Config) -> Result<Self> {
        let embedder: Arc<dyn EmbeddingProvider> =
            Arc::from(embedding::create_provider(&config.embeddings)?);
        let store = MemoryStore::open(
            config.resolved_db_path(),
            &config.table,
            embedder.dimensions(),
            config.storage.metric,
        )?;
        store.ensure_collection(Some(embedder.model()))?;
        Self::new(Arc::new(store), embedder, config.retrieval)
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    pub fn into_store(self) -> Arc<MemoryStore> {
        self.store
    }

    /// Entries most similar to `prompt`, nearest first, at most `top_k`.
    ///
    /// Only `prompt` is encoded, not the surrounding conversation.
    pub async fn retrieve(&self, prompt: &str) -> Result<Vec<MemoryEntry>> {
        Ok(self
            .retrieve_scored(prompt)
            .await?
            .into_iter()
            .map(|hit| hit.entry)
            .collect())
    }

    /// Like [`ContextManager::retrieve`] but keeps each entry's distance.
    pub async fn retrieve_scored(&self, prompt: &str) -> Result<Vec<SearchHit>> {
        let vector = self.encode_one(prompt.to_string()).await?;

        let store = Arc::clone(&self.store);
        let k = self.retrieval.top_k;
        let hits = tokio::task::spawn_blocking(move || store.search(&vector, k))
            .await
            .map_err(|e| Error::StoreQuery(format!("search task failed: {e}")))??;

        tracing::debug!(returned = hits.len(), top_k = k, "retrieved context");
        Ok(hits)
    }

    /// Embed and append one exchange. Returns the stored entry.
    pub async fn remember(
        &self,
        prompt: &str,
        response: &str,
        tags: &[String],
    ) -> Result<MemoryEntry> {
        let embedding = self
            .encode_one(MemoryEntry::encoding_input(prompt, response))
            .await?;

        let entry = MemoryEntry {
            id: uuid::Uuid::now_v7().to_string(),
            timestamp: Utc::now(),
            prompt: prompt.to_string(),
            response: response.to_string(),
            tags: tags.iter().cloned().collect::<BTreeSet<_>>(),
            token_count: token_count(prompt, response),
            embedding,
        };

        let store = Arc::clone(&self.store);
        let entry = tokio::task::spawn_blocking(move || store.add(&entry).map(|()| entry))
            .await
            .map_err(|e| Error::StoreWrite(format!("write task failed: {e}")))??;

        tracing::info!(
            id = %entry.id,
            tokens = entry.token_count,
            "remembered exchange"
        );
        Ok(entry)
    }

    /// Encode one text on the blocking pool (embedding is CPU- or network-bound).
    async fn encode_one(&self, text: String) -> Result<Vec<f32>> {
        let embedder = Arc::clone(&self.embedder);
        let name = embedder.name().to_string();
        tokio::task::spawn_blocking(move || {
            embedding::encode(embedder.as_ref(), &[text.as_str()])?
                .pop()
                .ok_or_else(|| Error::embedding(embedder.name(), "provider returned no vector"))
        })
        .await
        .map_err(|e| Error::embedding(name, format!("embedding task failed: {e}")))?
    }
}
