//! LLM-as-judge scoring for generated answers.
//!
//! Two scores are produced per answer: faithfulness (are the claims
//! supported by the retrieved context) and relevance (does the answer
//! address the question). Scoring never fails; an unusable judge reply
//! scores 0.0.

use super::dataset::TestCase;
use crate::llm::{ChatModel, Prompts};
use crate::rag::AnswerSource;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of evaluating one test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub id: u32,
    pub question: String,
    pub answer: String,
    /// Faithfulness score in [0, 1].
    pub faithfulness: f64,
    /// Relevance score in [0, 1].
    pub relevance: f64,
    pub ground_truth: String,
}

/// Mean scores over a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationScores {
    pub faithfulness: f64,
    pub relevance: f64,
}

/// Scores answers by asking a chat model to act as judge.
#[derive(Clone)]
pub struct HallucinationEvaluator {
    judge: Arc<dyn ChatModel>,
}

impl HallucinationEvaluator {
    pub fn new(judge: Arc<dyn ChatModel>) -> Self {
        Self { judge }
    }

    /// How well the answer's claims are supported by `context`.
    pub async fn faithfulness(&self, answer: &str, context: &str) -> f64 {
        let prompt = Prompts::fill(
            Prompts::faithfulness_judge(),
            &[("context", context), ("answer", answer)],
        );
        self.score("faithfulness", &prompt).await
    }

    /// How well the answer addresses `question`.
    pub async fn relevance(&self, answer: &str, question: &str) -> f64 {
        let prompt = Prompts::fill(
            Prompts::relevance_judge(),
            &[("question", question), ("answer", answer)],
        );
        self.score("relevance", &prompt).await
    }

    async fn score(&self, metric: &str, prompt: &str) -> f64 {
        match self.judge.invoke(prompt).await {
            Ok(reply) => parse_score(&reply).unwrap_or_else(|| {
                warn!(metric, reply = %reply.trim(), "judge reply is not a score, using 0.0");
                0.0
            }),
            Err(e) => {
                warn!(metric, error = %e, "judge call failed, using 0.0");
                0.0
            }
        }
    }

    /// Answer and score every case in order, one at a time.
    ///
    /// An answer-source failure becomes that case's answer text with both
    /// scores at 0.0; the batch always completes.
    pub async fn run_batch(
        &self,
        cases: &[TestCase],
        source: &dyn AnswerSource,
    ) -> Vec<EvaluationResult> {
        let mut results = Vec::with_capacity(cases.len());

        for (i, case) in cases.iter().enumerate() {
            info!(case = case.id, progress = i + 1, total = cases.len(), "evaluating");

            let (answer, faithfulness, relevance) =
                match source.generate_answer(&case.question).await {
                    Ok(response) => {
                        let context = response.source_documents.join("\n");
                        let faithfulness = self.faithfulness(&response.answer, &context).await;
                        let relevance = self.relevance(&response.answer, &case.question).await;
                        (response.answer, faithfulness, relevance)
                    }
                    Err(e) => {
                        warn!(case = case.id, error = %e, "answer generation failed");
                        (format!("Error: {}", e), 0.0, 0.0)
                    }
                };

            results.push(EvaluationResult {
                id: case.id,
                question: case.question.clone(),
                answer,
                faithfulness,
                relevance,
                ground_truth: case.ground_truth.clone(),
            });
        }

        results
    }
}

/// Parse a judge reply as a score.
///
/// Finite values are clamped to [0, 1]; anything else is rejected.
pub fn parse_score(reply: &str) -> Option<f64> {
    reply
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|score| score.is_finite())
        .map(|score| score.clamp(0.0, 1.0))
}

/// Arithmetic means of both scores; zeros for an empty batch.
pub fn aggregate(results: &[EvaluationResult]) -> EvaluationScores {
    if results.is_empty() {
        return EvaluationScores::default();
    }

    let n = results.len() as f64;
    EvaluationScores {
        faithfulness: results.iter().map(|r| r.faithfulness).sum::<f64>() / n,
        relevance: results.iter().map(|r| r.relevance).sum::<f64>() / n,
    }
}
