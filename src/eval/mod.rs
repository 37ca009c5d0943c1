//! Evaluation of generated answers.
//!
//! This module provides:
//! - A persistent test set of questions with ground-truth answers
//! - LLM-as-judge faithfulness and relevance scoring
//! - Batch reports with averaged scores

pub mod benchmark;
pub mod dataset;
pub mod judge;

pub use benchmark::EvaluationReport;
pub use dataset::{TestCase, TestSetStore};
pub use judge::{EvaluationResult, EvaluationScores, HallucinationEvaluator, aggregate, parse_score};
