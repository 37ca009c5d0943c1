//! Persistent vector collection with similarity search.
//!
//! Chunks are embedded through an [`Embedder`] and appended to a collection
//! file inside the configured directory. Queries are ranked by cosine
//! similarity against every stored vector.

use crate::chunker::DocumentChunk;
use crate::config::MAX_EMBEDDING_BATCH;
use crate::error::{RagError, Result};
use crate::llm::Embedder;
use crate::persistence::{
    DEFAULT_COLLECTION_FILENAME, collection_exists, collection_size, load_collection,
    save_collection,
};
use crate::rag::Retriever;
use async_trait::async_trait;
use bincode::{Decode, Encode};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// A stored chunk with its embedding.
#[derive(Debug, Clone, Encode, Decode)]
pub struct VectorRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub chunk: DocumentChunk,
}

/// Everything persisted for one collection.
#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct Collection {
    /// Model the stored vectors were produced with.
    pub embedding_model: String,
    pub records: Vec<VectorRecord>,
}

impl Collection {
    pub fn new(embedding_model: impl Into<String>) -> Self {
        Self {
            embedding_model: embedding_model.into(),
            records: Vec::new(),
        }
    }
}

/// A search hit.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    /// Cosine similarity in [-1, 1].
    pub score: f32,
}

/// Summary of the on-disk collection.
#[derive(Debug, Clone)]
pub struct CollectionStats {
    pub path: PathBuf,
    pub records: usize,
    pub embedding_model: String,
    pub size_bytes: Option<u64>,
}

/// Options for [`VectorStore::as_retriever`].
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Number of chunks returned per query.
    pub top_k: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { top_k: 3 }
    }
}

/// Handle to a persistent collection. Clones share the bound collection.
#[derive(Clone)]
pub struct VectorStore {
    collection_dir: PathBuf,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    collection: Arc<RwLock<Option<Collection>>>,
}

impl VectorStore {
    /// Create a handle for the collection in `collection_dir`.
    ///
    /// Nothing is read until the first add or search.
    pub fn new(collection_dir: impl Into<PathBuf>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            collection_dir: collection_dir.into(),
            embedder,
            batch_size: MAX_EMBEDDING_BATCH,
            collection: Arc::new(RwLock::new(None)),
        }
    }

    /// Set the number of texts per embedding request (capped at [`MAX_EMBEDDING_BATCH`]).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_EMBEDDING_BATCH);
        self
    }

    pub fn collection_path(&self) -> PathBuf {
        self.collection_dir.join(DEFAULT_COLLECTION_FILENAME)
    }

    /// Whether the in-memory handle is bound to a collection.
    pub async fn is_bound(&self) -> bool {
        self.collection.read().await.is_some()
    }

    fn read_from_disk(&self) -> Result<Collection> {
        let path = self.collection_path();
        if !collection_exists(&path) {
            debug!(path = %path.display(), "no collection on disk yet");
            return Ok(Collection::new(self.embedder.model_name()));
        }

        let collection = load_collection(&path)?;
        if !collection.records.is_empty() && collection.embedding_model != self.embedder.model_name()
        {
            warn!(
                stored = %collection.embedding_model,
                current = %self.embedder.model_name(),
                "collection was built with a different embedding model"
            );
        }
        debug!(records = collection.records.len(), "opened collection");
        Ok(collection)
    }

    /// Open the on-disk collection unless a handle is already bound.
    async fn ensure_loaded(&self) -> Result<()> {
        let mut guard = self.collection.write().await;
        if guard.is_none() {
            *guard = Some(self.read_from_disk()?);
        }
        Ok(())
    }

    /// Embed and append chunks, then persist the collection.
    ///
    /// Whitespace-only chunks are skipped. Returns the number of chunks added.
    pub async fn add(&self, chunks: Vec<DocumentChunk>) -> Result<usize> {
        let valid: Vec<DocumentChunk> = chunks.into_iter().filter(|c| !c.is_blank()).collect();
        if valid.is_empty() {
            info!("No valid documents to add");
            return Ok(0);
        }

        // Embed everything first so a service failure leaves the collection untouched.
        let mut records = Vec::with_capacity(valid.len());
        for batch in valid.chunks(self.batch_size) {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let embeddings = self.embedder.embed_batch(&texts).await.map_err(|e| {
                error!(error = %e, batch_size = texts.len(), "embedding failed");
                e
            })?;

            if embeddings.len() != batch.len() {
                return Err(RagError::Service(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    embeddings.len()
                )));
            }

            records.extend(batch.iter().zip(embeddings).map(|(chunk, embedding)| {
                VectorRecord {
                    id: Uuid::new_v4().to_string(),
                    embedding,
                    chunk: chunk.clone(),
                }
            }));
        }

        self.ensure_loaded().await?;
        let mut guard = self.collection.write().await;
        let collection = guard
            .get_or_insert_with(|| Collection::new(self.embedder.model_name()));

        let added = records.len();
        let before = collection.records.len();
        if collection.records.is_empty() {
            collection.embedding_model = self.embedder.model_name().to_string();
        }
        collection.records.extend(records);

        if let Err(e) = save_collection(collection, &self.collection_path()) {
            collection.records.truncate(before);
            return Err(e);
        }

        info!(
            added,
            total = collection.records.len(),
            "Added documents to vector store"
        );
        Ok(added)
    }

    /// Return the `k` stored chunks most similar to `query`, best first.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<DocumentChunk>> {
        Ok(self
            .search_with_scores(query, k)
            .await?
            .into_iter()
            .map(|hit| hit.chunk)
            .collect())
    }

    /// Like [`search`](Self::search) but keeps similarity scores.
    pub async fn search_with_scores(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        if query.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        self.ensure_loaded().await.map_err(|e| {
            error!(error = %e, "failed to open collection");
            e
        })?;

        if self.collection.read().await.as_ref().is_none_or(|c| c.records.is_empty()) {
            return Ok(Vec::new());
        }

        // No lock is held while the embedding request is in flight.
        let query_embedding = self.embedder.embed(query).await.map_err(|e| {
            error!(error = %e, query, "Error in similarity search");
            e
        })?;

        let guard = self.collection.read().await;
        let Some(collection) = guard.as_ref() else {
            return Ok(Vec::new());
        };

        let mut ranked: Vec<(f32, usize)> = collection
            .records
            .iter()
            .enumerate()
            .map(|(i, record)| (cosine_similarity(&query_embedding, &record.embedding), i))
            .collect();

        // Sort by score descending; stable, so ties keep insertion order
        ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(k);

        Ok(ranked
            .into_iter()
            .map(|(score, i)| ScoredChunk {
                chunk: collection.records[i].chunk.clone(),
                score,
            })
            .collect())
    }

    /// A retriever over this collection returning `options.top_k` chunks.
    pub fn as_retriever(&self, options: SearchOptions) -> VectorRetriever {
        VectorRetriever {
            store: self.clone(),
            options,
        }
    }

    /// Number of stored records.
    pub async fn len(&self) -> Result<usize> {
        self.ensure_loaded().await?;
        Ok(self
            .collection
            .read()
            .await
            .as_ref()
            .map(|c| c.records.len())
            .unwrap_or(0))
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Collection statistics for display.
    pub async fn stats(&self) -> Result<CollectionStats> {
        self.ensure_loaded().await?;
        let guard = self.collection.read().await;
        let path = self.collection_path();
        let size_bytes = if collection_exists(&path) {
            Some(collection_size(&path)?)
        } else {
            None
        };

        Ok(CollectionStats {
            records: guard.as_ref().map(|c| c.records.len()).unwrap_or(0),
            embedding_model: guard
                .as_ref()
                .map(|c| c.embedding_model.clone())
                .unwrap_or_default(),
            size_bytes,
            path,
        })
    }

    /// Delete the collection file and unbind the handle.
    pub async fn reset(&self) -> Result<()> {
        let mut guard = self.collection.write().await;
        let path = self.collection_path();
        if collection_exists(&path) {
            std::fs::remove_file(&path).map_err(|e| RagError::persistence(&path, e))?;
        }
        *guard = None;
        info!(path = %path.display(), "vector collection deleted");
        Ok(())
    }
}

/// Similarity-search retriever over a [`VectorStore`].
#[derive(Clone)]
pub struct VectorRetriever {
    store: VectorStore,
    options: SearchOptions,
}

impl VectorRetriever {
    pub fn options(&self) -> &SearchOptions {
        &self.options
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<DocumentChunk>> {
        self.store.search(query, self.options.top_k).await
    }
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;
    use tempfile::TempDir;

    const VOCAB: [&str; 4] = ["revenue", "debt", "cloud", "dividend"];

    /// Embeds text as keyword counts over a tiny vocabulary.
    #[derive(Default)]
    struct KeywordEmbedder {
        batches: Mutex<Vec<usize>>,
    }

    impl KeywordEmbedder {
        fn vector(text: &str) -> Vec<f32> {
            let lower = text.to_lowercase();
            VOCAB
                .iter()
                .map(|word| lower.matches(word).count() as f32)
                .collect()
        }
    }

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            self.batches.lock().unwrap().push(texts.len());
            Ok(texts.iter().map(|t| Self::vector(t)).collect())
        }

        fn model_name(&self) -> &str {
            "keyword-test"
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            Err(RagError::Service("401 Unauthorized".to_string()))
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    /// Reads the store's size from inside every embedding call.
    #[derive(Default)]
    struct StoreReadingEmbedder {
        store: OnceLock<VectorStore>,
    }

    #[async_trait]
    impl Embedder for StoreReadingEmbedder {
        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            if let Some(store) = self.store.get() {
                store.len().await?;
            }
            Ok(texts.iter().map(|t| KeywordEmbedder::vector(t)).collect())
        }

        fn model_name(&self) -> &str {
            "keyword-test"
        }
    }

    fn chunks(texts: &[&str]) -> Vec<DocumentChunk> {
        texts.iter().map(|t| DocumentChunk::new(*t)).collect()
    }

    #[tokio::test]
    async fn test_add_and_search_ranks_by_similarity() {
        let dir = TempDir::new().unwrap();
        let store = VectorStore::new(dir.path(), Arc::new(KeywordEmbedder::default()));

        let added = store
            .add(chunks(&[
                "Debt rose and debt covenants tightened.",
                "Cloud revenue grew 51% year-over-year.",
                "The board declared a dividend.",
            ]))
            .await
            .unwrap();
        assert_eq!(added, 3);
        assert!(store.is_bound().await);

        let results = store.search("cloud revenue", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].text, "Cloud revenue grew 51% year-over-year.");
    }

    #[tokio::test]
    async fn test_empty_input_is_noop() {
        let dir = TempDir::new().unwrap();
        let store = VectorStore::new(dir.path(), Arc::new(KeywordEmbedder::default()));

        assert_eq!(store.add(Vec::new()).await.unwrap(), 0);
        assert_eq!(store.add(chunks(&["  ", "\n\t"])).await.unwrap(), 0);
        assert!(!store.collection_path().exists());
        assert!(!store.is_bound().await);
    }

    #[tokio::test]
    async fn test_empty_query_returns_nothing() {
        let dir = TempDir::new().unwrap();
        let store = VectorStore::new(dir.path(), Arc::new(FailingEmbedder));
        assert!(store.search("", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batches_are_capped() {
        let dir = TempDir::new().unwrap();
        let embedder = Arc::new(KeywordEmbedder::default());
        let store = VectorStore::new(dir.path(), embedder.clone()).with_batch_size(100);

        let texts: Vec<String> = (0..23).map(|i| format!("revenue line {}", i)).collect();
        let input: Vec<DocumentChunk> = texts.iter().map(DocumentChunk::new).collect();
        assert_eq!(store.add(input).await.unwrap(), 23);

        assert_eq!(*embedder.batches.lock().unwrap(), vec![10, 10, 3]);
    }

    #[tokio::test]
    async fn test_lazily_opens_persisted_collection() {
        let dir = TempDir::new().unwrap();
        {
            let store = VectorStore::new(dir.path(), Arc::new(KeywordEmbedder::default()));
            store
                .add(chunks(&["Dividend payout ratio was 40%.", "Debt fell."]))
                .await
                .unwrap();
        }

        let reopened = VectorStore::new(dir.path(), Arc::new(KeywordEmbedder::default()));
        assert!(!reopened.is_bound().await);

        let results = reopened.search("dividend", 1).await.unwrap();
        assert_eq!(results[0].text, "Dividend payout ratio was 40%.");
        assert!(reopened.is_bound().await);

        // Appends keep earlier records
        reopened.add(chunks(&["Cloud margin expanded."])).await.unwrap();
        assert_eq!(reopened.len().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_collection_is_unlocked_while_query_is_embedded() {
        let dir = TempDir::new().unwrap();
        let embedder = Arc::new(StoreReadingEmbedder::default());
        let store = VectorStore::new(dir.path(), embedder.clone());
        store
            .add(chunks(&["Revenue grew.", "Debt fell."]))
            .await
            .unwrap();
        let _ = embedder.store.set(store.clone());

        let results = tokio::time::timeout(Duration::from_secs(5), store.search("revenue", 1))
            .await
            .expect("search blocked on the collection lock")
            .unwrap();
        assert_eq!(results[0].text, "Revenue grew.");
    }

    #[tokio::test]
    async fn test_search_error_propagates() {
        let dir = TempDir::new().unwrap();
        VectorStore::new(dir.path(), Arc::new(KeywordEmbedder::default()))
            .add(chunks(&["Revenue grew."]))
            .await
            .unwrap();

        let store = VectorStore::new(dir.path(), Arc::new(FailingEmbedder));
        let err = store.search("revenue", 3).await.unwrap_err();
        assert!(matches!(err, RagError::Service(_)));
    }

    #[tokio::test]
    async fn test_add_error_leaves_collection_untouched() {
        let dir = TempDir::new().unwrap();
        let store = VectorStore::new(dir.path(), Arc::new(FailingEmbedder));
        assert!(store.add(chunks(&["Revenue grew."])).await.is_err());
        assert!(!store.collection_path().exists());
    }

    #[tokio::test]
    async fn test_retriever_uses_top_k_and_sees_new_records() {
        let dir = TempDir::new().unwrap();
        let store = VectorStore::new(dir.path(), Arc::new(KeywordEmbedder::default()));
        let retriever = store.as_retriever(SearchOptions { top_k: 1 });

        assert!(retriever.retrieve("revenue").await.unwrap().is_empty());

        store
            .add(chunks(&["Revenue up.", "Revenue down.", "Debt flat."]))
            .await
            .unwrap();
        let docs = retriever.retrieve("revenue").await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(retriever.options().top_k, 1);
    }

    #[tokio::test]
    async fn test_reset_and_stats() {
        let dir = TempDir::new().unwrap();
        let store = VectorStore::new(dir.path(), Arc::new(KeywordEmbedder::default()));
        store.add(chunks(&["Revenue grew."])).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.records, 1);
        assert_eq!(stats.embedding_model, "keyword-test");
        assert!(stats.size_bytes.unwrap() > 0);

        store.reset().await.unwrap();
        assert!(!store.collection_path().exists());
        assert!(store.is_empty().await.unwrap());
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);

        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 1e-6);

        assert_eq!(cosine_similarity(&a, &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&a, &[0.0, 0.0, 0.0]), 0.0);
    }
}
