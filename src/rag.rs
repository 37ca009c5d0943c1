//! Retrieval-augmented answering over financial reports.

use crate::chunker::DocumentChunk;
use crate::error::Result;
use crate::llm::{ChatModel, Prompts};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Returns the chunks most relevant to a query.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<Vec<DocumentChunk>>;
}

/// Anything that can answer a question with supporting sources.
///
/// Batch evaluation depends on this rather than on [`FinancialRag`], so
/// tests can substitute fixed answers.
#[async_trait]
pub trait AnswerSource: Send + Sync {
    async fn generate_answer(&self, question: &str) -> Result<RagResponse>;
}

/// An answer together with the chunk texts it was generated from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagResponse {
    pub query: String,
    pub answer: String,
    /// Retrieved chunk texts in retrieval order.
    pub source_documents: Vec<String>,
}

/// Retrieves context and asks the chat model to answer from it.
#[derive(Clone)]
pub struct FinancialRag {
    retriever: Arc<dyn Retriever>,
    chat: Arc<dyn ChatModel>,
}

impl FinancialRag {
    pub fn new(retriever: Arc<dyn Retriever>, chat: Arc<dyn ChatModel>) -> Self {
        Self { retriever, chat }
    }

    pub async fn retrieve_context(&self, question: &str) -> Result<Vec<DocumentChunk>> {
        self.retriever.retrieve(question).await
    }

    /// Join chunk texts with blank lines, in order.
    pub fn format_docs(chunks: &[DocumentChunk]) -> String {
        chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Retrieve, prompt, and return the raw model answer with its sources.
    pub async fn generate_answer(&self, question: &str) -> Result<RagResponse> {
        let chunks = self.retrieve_context(question).await?;
        let context = Self::format_docs(&chunks);
        debug!(chunks = chunks.len(), context_chars = context.len(), "answering question");

        let prompt = Prompts::fill(
            Prompts::financial_answer(),
            &[("context", &context), ("question", question)],
        );
        let answer = self.chat.invoke(&prompt).await?;

        Ok(RagResponse {
            query: question.to_string(),
            answer,
            source_documents: chunks.into_iter().map(|c| c.text).collect(),
        })
    }
}

#[async_trait]
impl AnswerSource for FinancialRag {
    async fn generate_answer(&self, question: &str) -> Result<RagResponse> {
        FinancialRag::generate_answer(self, question).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RagError;
    use std::sync::Mutex;

    struct FixedRetriever(Vec<&'static str>);

    #[async_trait]
    impl Retriever for FixedRetriever {
        async fn retrieve(&self, _query: &str) -> Result<Vec<DocumentChunk>> {
            Ok(self.0.iter().map(|t| DocumentChunk::new(*t)).collect())
        }
    }

    /// Returns a fixed reply and records every prompt it receives.
    struct RecordingChat {
        reply: &'static str,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatModel for RecordingChat {
        async fn invoke(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.reply.to_string())
        }
    }

    struct DownChat;

    #[async_trait]
    impl ChatModel for DownChat {
        async fn invoke(&self, _prompt: &str) -> Result<String> {
            Err(RagError::Service("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_generate_answer_returns_sources_and_exact_answer() {
        let chat = Arc::new(RecordingChat {
            reply: "Revenue was $10M, up 20%.",
            prompts: Mutex::new(Vec::new()),
        });
        let rag = FinancialRag::new(
            Arc::new(FixedRetriever(vec!["Revenue was $10M.", "Growth was 20%."])),
            chat.clone(),
        );

        let response = rag.generate_answer("What was revenue?").await.unwrap();
        assert_eq!(response.answer, "Revenue was $10M, up 20%.");
        assert_eq!(
            response.source_documents,
            vec!["Revenue was $10M.", "Growth was 20%."]
        );
        assert_eq!(response.query, "What was revenue?");

        let prompts = chat.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Revenue was $10M.\n\nGrowth was 20%."));
        assert!(prompts[0].contains("Question: What was revenue?"));
    }

    #[tokio::test]
    async fn test_empty_context_still_asks_model() {
        let chat = Arc::new(RecordingChat {
            reply: "I don't know based on the context.",
            prompts: Mutex::new(Vec::new()),
        });
        let rag = FinancialRag::new(Arc::new(FixedRetriever(Vec::new())), chat.clone());

        let response = rag.generate_answer("Who is the CFO?").await.unwrap();
        assert!(response.source_documents.is_empty());
        assert_eq!(chat.prompts.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_chat_failure_propagates() {
        let rag = FinancialRag::new(Arc::new(FixedRetriever(vec!["x"])), Arc::new(DownChat));
        let result = tokio_test::block_on(rag.generate_answer("q"));
        assert!(matches!(result, Err(RagError::Service(_))));
    }

    #[test]
    fn test_format_docs() {
        let chunks = vec![DocumentChunk::new("a"), DocumentChunk::new("b")];
        assert_eq!(FinancialRag::format_docs(&chunks), "a\n\nb");
        assert_eq!(FinancialRag::format_docs(&[]), "");
    }
}
