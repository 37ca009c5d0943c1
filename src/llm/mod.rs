//! LLM integration module.
//!
//! Provides OpenAI-compatible clients for chat completions and embeddings,
//! the prompts used for answering and judging, and the capability traits
//! the rest of the crate depends on instead of the concrete clients.

mod client;
mod embeddings;
mod prompts;

pub use client::{LlmClient, LlmResponse, Message, Role, TokenUsage};
pub use embeddings::EmbeddingClient;
pub use prompts::Prompts;

use crate::error::Result;
use async_trait::async_trait;

/// A chat model that turns a single prompt into a completion.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send `prompt` as one user message and return the raw model text.
    async fn invoke(&self, prompt: &str) -> Result<String>;
}

/// A text embedding backend.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, one vector per input in input order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text]).await?;
        vectors.pop().ok_or_else(|| {
            crate::error::RagError::Service("embedding service returned no vectors".to_string())
        })
    }

    /// Name of the embedding model, recorded alongside stored vectors.
    fn model_name(&self) -> &str;
}
