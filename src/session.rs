//! Per-process context tying configuration to the pipeline components.
//!
//! The vector store and answer engine are built on first use and kept
//! until [`Session::reset`].

use crate::chunker::{META_SOURCE, TextSplitter};
use crate::config::Config;
use crate::document::DocumentLoader;
use crate::error::Result;
use crate::eval::{EvaluationReport, HallucinationEvaluator, TestCase, TestSetStore};
use crate::llm::{ChatModel, Embedder, EmbeddingClient, LlmClient};
use crate::rag::{FinancialRag, RagResponse};
use crate::vector_store::{SearchOptions, VectorStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Outcome of ingesting one file.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub path: PathBuf,
    /// Characters of cleaned text.
    pub characters: usize,
    pub chunks_created: usize,
    /// Chunks actually stored (blank chunks are skipped).
    pub chunks_added: usize,
}

pub struct Session {
    config: Config,
    chat: Option<Arc<dyn ChatModel>>,
    embedder: Option<Arc<dyn Embedder>>,
    vector_store: Option<VectorStore>,
    rag: Option<FinancialRag>,
}

impl Session {
    /// A session whose service clients are created from `config` on demand.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            chat: None,
            embedder: None,
            vector_store: None,
            rag: None,
        }
    }

    /// A session using the given models instead of HTTP clients.
    pub fn with_models(
        config: Config,
        chat: Arc<dyn ChatModel>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            chat: Some(chat),
            embedder: Some(embedder),
            ..Self::new(config)
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Drop the vector store and answer engine; the next use rebuilds them.
    pub fn reset(&mut self) {
        self.vector_store = None;
        self.rag = None;
    }

    fn chat_model(&mut self) -> Result<Arc<dyn ChatModel>> {
        if let Some(chat) = &self.chat {
            return Ok(chat.clone());
        }
        let chat: Arc<dyn ChatModel> = Arc::new(LlmClient::new(self.config.llm.clone())?);
        self.chat = Some(chat.clone());
        Ok(chat)
    }

    fn embedder(&mut self) -> Result<Arc<dyn Embedder>> {
        if let Some(embedder) = &self.embedder {
            return Ok(embedder.clone());
        }
        let embedder: Arc<dyn Embedder> = Arc::new(EmbeddingClient::new(
            &self.config.llm,
            self.config.embedding.model.clone(),
        )?);
        self.embedder = Some(embedder.clone());
        Ok(embedder)
    }

    /// The session's vector store, created on first call.
    pub fn vector_store(&mut self) -> Result<VectorStore> {
        if let Some(store) = &self.vector_store {
            return Ok(store.clone());
        }
        let embedder = self.embedder()?;
        let store = VectorStore::new(&self.config.storage.collection_dir, embedder)
            .with_batch_size(self.config.embedding_batch_size());
        self.vector_store = Some(store.clone());
        Ok(store)
    }

    /// The session's answer engine, created on first call.
    pub fn rag(&mut self) -> Result<FinancialRag> {
        if let Some(rag) = &self.rag {
            return Ok(rag.clone());
        }
        let options = SearchOptions {
            top_k: self.config.retrieval.top_k,
        };
        let retriever = self.vector_store()?.as_retriever(options);
        let rag = FinancialRag::new(Arc::new(retriever), self.chat_model()?);
        self.rag = Some(rag.clone());
        Ok(rag)
    }

    /// The test set at the configured path.
    pub fn test_set(&self) -> TestSetStore {
        TestSetStore::open(&self.config.storage.test_set_path)
    }

    /// Load, clean, split and index one file.
    pub async fn ingest_file(&mut self, path: &Path) -> Result<IngestReport> {
        let text = DocumentLoader::new().load_file(path)?;

        let splitter = TextSplitter::new(
            self.config.chunking.chunk_size,
            self.config.chunking.chunk_overlap,
        );
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let chunks: Vec<_> = splitter
            .create_chunks(&text)
            .into_iter()
            .map(|c| c.with_metadata(META_SOURCE, &source))
            .collect();
        let chunks_created = chunks.len();

        let chunks_added = self.vector_store()?.add(chunks).await?;
        info!(
            file = %source,
            chunks = chunks_added,
            "Ingested document"
        );

        Ok(IngestReport {
            path: path.to_path_buf(),
            characters: text.chars().count(),
            chunks_created,
            chunks_added,
        })
    }

    pub async fn ask(&mut self, question: &str) -> Result<RagResponse> {
        self.rag()?.generate_answer(question).await
    }

    /// Answer and judge every case with the session's chat model.
    pub async fn evaluate(&mut self, cases: &[TestCase]) -> Result<EvaluationReport> {
        let rag = self.rag()?;
        let evaluator = HallucinationEvaluator::new(self.chat_model()?);
        Ok(EvaluationReport::run(&evaluator, cases, &rag).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// One dimension per character class, enough to rank short texts.
    struct CharClassEmbedder;

    #[async_trait]
    impl Embedder for CharClassEmbedder {
        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    vec![
                        t.chars().filter(|c| c.is_ascii_digit()).count() as f32,
                        t.chars().filter(|c| c.is_alphabetic()).count() as f32,
                        1.0,
                    ]
                })
                .collect())
        }

        fn model_name(&self) -> &str {
            "char-class"
        }
    }

    /// Answers prompts with "ANSWER" and judge prompts with "0.5".
    #[derive(Default)]
    struct StubChat {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl ChatModel for StubChat {
        async fn invoke(&self, prompt: &str) -> Result<String> {
            *self.calls.lock().unwrap() += 1;
            if prompt.starts_with("You are a judge") {
                Ok("0.5".to_string())
            } else {
                Ok("ANSWER".to_string())
            }
        }
    }

    fn session_in(dir: &TempDir, chat: Arc<StubChat>) -> Session {
        let mut config = Config::with_llm("http://localhost:1/v1", "key", "stub");
        config.storage = StorageConfig::rooted_at(dir.path());
        config.chunking.chunk_size = 40;
        config.chunking.chunk_overlap = 5;
        Session::with_models(config, chat, Arc::new(CharClassEmbedder))
    }

    #[tokio::test]
    async fn test_ingest_then_ask() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.txt");
        std::fs::write(
            &path,
            "Page 1\nRevenue increased across all segments this year.\n2023 2024 2025\n",
        )
        .unwrap();

        let mut session = session_in(&dir, Arc::new(StubChat::default()));
        let report = session.ingest_file(&path).await.unwrap();
        assert!(report.chunks_created >= 2);
        assert_eq!(report.chunks_added, report.chunks_created);

        let response = session.ask("What happened to revenue?").await.unwrap();
        assert_eq!(response.answer, "ANSWER");
        assert!(!response.source_documents.is_empty());
    }

    #[tokio::test]
    async fn test_components_are_reused_until_reset() {
        let dir = TempDir::new().unwrap();
        let mut session = session_in(&dir, Arc::new(StubChat::default()));

        let path = dir.path().join("a.txt");
        std::fs::write(&path, "Net income rose.").unwrap();
        session.ingest_file(&path).await.unwrap();

        // Same shared handle: already bound after the ingest
        assert!(session.vector_store().unwrap().is_bound().await);

        session.reset();
        assert!(!session.vector_store().unwrap().is_bound().await);
        assert_eq!(session.vector_store().unwrap().len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_evaluate_costs_three_calls_per_case() {
        let dir = TempDir::new().unwrap();
        let chat = Arc::new(StubChat::default());
        let mut session = session_in(&dir, chat.clone());

        let mut test_set = session.test_set();
        test_set.add("Q1?", "A1", Vec::new()).unwrap();
        test_set.add("Q2?", "A2", Vec::new()).unwrap();

        let cases = session.test_set().all().to_vec();
        let report = session.evaluate(&cases).await.unwrap();
        assert_eq!(report.total_cases, 2);
        assert_eq!(report.results[0].answer, "ANSWER");
        assert_eq!(report.scores.faithfulness, 0.5);
        assert_eq!(report.scores.relevance, 0.5);
        assert_eq!(*chat.calls.lock().unwrap(), 6);
    }

    #[tokio::test]
    async fn test_ingest_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let mut session = session_in(&dir, Arc::new(StubChat::default()));
        assert!(session.ingest_file(&dir.path().join("nope.pdf")).await.is_err());
    }
}
