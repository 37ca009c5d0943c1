//! Batch evaluation report.

use super::dataset::TestCase;
use super::judge::{EvaluationResult, EvaluationScores, HallucinationEvaluator, aggregate};
use crate::error::{RagError, Result};
use crate::rag::AnswerSource;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Instant;

/// Maximum characters of a question shown in the summary table.
const QUESTION_PREVIEW_CHARS: usize = 48;

/// Scores for a whole test set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub total_cases: usize,
    /// Mean scores across all cases.
    pub scores: EvaluationScores,
    /// Per-case results in test-set order.
    pub results: Vec<EvaluationResult>,
    /// Wall time of the batch (seconds).
    pub total_time_secs: f64,
}

impl EvaluationReport {
    /// Evaluate every case against `source` and aggregate the scores.
    pub async fn run(
        evaluator: &HallucinationEvaluator,
        cases: &[TestCase],
        source: &dyn AnswerSource,
    ) -> Self {
        let start_time = Instant::now();
        let results = evaluator.run_batch(cases, source).await;
        Self::from_results(results, start_time.elapsed().as_secs_f64())
    }

    pub fn from_results(results: Vec<EvaluationResult>, total_time_secs: f64) -> Self {
        Self {
            total_cases: results.len(),
            scores: aggregate(&results),
            results,
            total_time_secs,
        }
    }

    /// Print averages and a per-case table to stdout.
    pub fn print_summary(&self) {
        println!("\n========== Evaluation Results ==========");
        println!("Total cases: {}", self.total_cases);
        println!("----------------------------------------");
        println!("Avg faithfulness: {:.2}", self.scores.faithfulness);
        println!("Avg relevance:    {:.2}", self.scores.relevance);
        println!("----------------------------------------");
        println!(
            "{:>4}  {:<width$}  {:>8}  {:>8}",
            "ID",
            "Question",
            "Faith.",
            "Relev.",
            width = QUESTION_PREVIEW_CHARS
        );
        for result in &self.results {
            println!(
                "{:>4}  {:<width$}  {:>8.2}  {:>8.2}",
                result.id,
                preview(&result.question, QUESTION_PREVIEW_CHARS),
                result.faithfulness,
                result.relevance,
                width = QUESTION_PREVIEW_CHARS
            );
        }
        println!("----------------------------------------");
        println!("Total time: {:.1}s", self.total_time_secs);
        println!("========================================\n");
    }

    /// Write the report as pretty JSON.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| RagError::Serialization(e.to_string()))?;
        fs::write(path, content).map_err(|e| RagError::persistence(path, e))
    }
}

/// First `max_chars` characters of a single-line rendering of `text`.
pub fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.replace(['\n', '\r'], " ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn result(id: u32, faithfulness: f64, relevance: f64) -> EvaluationResult {
        EvaluationResult {
            id,
            question: format!("question {}", id),
            answer: "answer".to_string(),
            faithfulness,
            relevance,
            ground_truth: String::new(),
        }
    }

    #[test]
    fn test_report_from_results() {
        let report = EvaluationReport::from_results(vec![result(1, 1.0, 0.8), result(2, 0.0, 0.4)], 2.5);

        assert_eq!(report.total_cases, 2);
        assert!((report.scores.faithfulness - 0.5).abs() < 1e-9);
        assert!((report.scores.relevance - 0.6).abs() < 1e-9);
        report.print_summary();
    }

    #[test]
    fn test_empty_report() {
        let report = EvaluationReport::from_results(Vec::new(), 0.0);
        assert_eq!(report.total_cases, 0);
        assert_eq!(report.scores, EvaluationScores::default());
    }

    #[test]
    fn test_save_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.json");

        EvaluationReport::from_results(vec![result(7, 0.9, 1.0)], 1.0)
            .save_json(&path)
            .unwrap();

        let loaded: EvaluationReport =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.results[0].id, 7);
        assert_eq!(loaded.total_cases, 1);
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("line one\nline two", 100), "line one line two");
        assert_eq!(preview("abcdefghijkl", 8), "abcde...");
        assert_eq!(preview("营业收入同比增长", 5).chars().count(), 5);
    }
}
