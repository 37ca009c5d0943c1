//! finrag - Retrieval-augmented question answering over financial reports,
//! with an LLM-as-judge harness for measuring hallucination.
//!
//! # Overview
//!
//! Reports (PDF or plain text) are cleaned of page numbers and disclaimer
//! banners, split into overlapping chunks, embedded through an
//! OpenAI-compatible service and stored in a local vector collection.
//! Questions retrieve the most similar chunks and a chat model answers
//! from them. A persistent test set of questions can then be answered in
//! batch and scored for faithfulness and relevance by a judge model.
//!
//! # Quick Start
//!
//! ```no_run
//! use finrag::{config::Config, session::Session};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     config.validate()?;
//!
//!     let mut session = Session::new(config);
//!     session.ingest_file(Path::new("annual_report.pdf")).await?;
//!
//!     let response = session.ask("What was the operating margin?").await?;
//!     println!("{}", response.answer);
//!
//!     let cases = session.test_set().all().to_vec();
//!     let report = session.evaluate(&cases).await?;
//!     report.print_summary();
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **DocumentLoader**: PDF/text loading and noise cleanup
//! - **TextSplitter**: Recursive character splitting with overlap
//! - **VectorStore**: Persistent embeddings with cosine search
//! - **FinancialRag**: Retrieve-then-answer pipeline
//! - **HallucinationEvaluator**: Judge-model scoring of answers
//! - **TestSetStore**: JSON-backed evaluation questions
//! - **Session**: Owns configuration and the lazily built components

pub mod chunker;
pub mod config;
pub mod document;
pub mod error;
pub mod eval;
pub mod llm;
pub mod logging;
pub mod persistence;
pub mod rag;
pub mod session;
pub mod vector_store;

// Re-export commonly used types
pub use chunker::{DocumentChunk, TextSplitter};
pub use config::Config;
pub use document::{DocumentLoader, clean_text};
pub use error::{RagError, Result};
pub use eval::{EvaluationReport, HallucinationEvaluator, TestCase, TestSetStore};
pub use llm::{ChatModel, Embedder, EmbeddingClient, LlmClient};
pub use rag::{AnswerSource, FinancialRag, RagResponse, Retriever};
pub use session::{IngestReport, Session};
pub use vector_store::{SearchOptions, VectorStore};
