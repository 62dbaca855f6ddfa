//! Exact-match evaluation of the extraction pipeline.
//!
//! Runs evaluation queries through the full query pipeline and scores the
//! parsed replies against ground-truth entities by exact equality. The
//! reranker's output is captured per query and logged for inspection.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::models::MedicationEntity;
use crate::pipeline::{PipelineError, PipelineService};

/// Metrics plus run metadata, serialized as the CLI's JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub items: usize,
    pub elapsed_secs: f64,
    pub timestamp: DateTime<Utc>,
}

pub struct Evaluator {
    pipeline_service: PipelineService,
}

impl Evaluator {
    pub fn new(pipeline_service: PipelineService) -> Self {
        Self { pipeline_service }
    }

    /// Run every test item through the query pipeline and score the batch.
    ///
    /// Unlike the serving path there is no per-item isolation here: a
    /// pipeline failure or an unparseable reply aborts the whole run.
    pub async fn run(
        &self,
        test_data: &[MedicationEntity],
    ) -> Result<EvaluationReport, PipelineError> {
        let start = Instant::now();
        let mut comparisons = Vec::with_capacity(test_data.len());

        for entity in test_data {
            let query = entity.original_text.as_str();
            let outputs = self
                .pipeline_service
                .execute_query_pipeline_with_captures(query, &["reranker".to_string()])
                .await?;

            let reply = outputs
                .replies("llm")
                .and_then(|replies| replies.first())
                .ok_or_else(|| {
                    PipelineError::Wiring("query pipeline produced no replies".to_string())
                })?;

            if let Some(documents) = outputs.documents("reranker", "documents") {
                for document in documents {
                    debug!(query, context = %document.meta, "Reranked context");
                }
            }

            let answer: serde_json::Value = serde_json::from_str(reply.trim())?;
            let ground_truth = serde_json::to_value(entity)?;
            comparisons.push(answer == ground_truth);
        }

        let elapsed = start.elapsed();
        info!(
            items = test_data.len(),
            elapsed_secs = elapsed.as_secs_f64(),
            "Evaluation completed"
        );

        let (accuracy, precision, recall, f1_score) = compute_metrics(&comparisons);
        Ok(EvaluationReport {
            accuracy,
            precision,
            recall,
            f1_score,
            items: test_data.len(),
            elapsed_secs: elapsed.as_secs_f64(),
            timestamp: Utc::now(),
        })
    }
}

/// Binary classification metrics with exact match as the positive class.
/// Every ground-truth row is positive: recall equals the match rate and
/// precision is 1 whenever any prediction matched. Divisions are
/// zero-guarded.
fn compute_metrics(comparisons: &[bool]) -> (f64, f64, f64, f64) {
    let total = comparisons.len();
    if total == 0 {
        return (0.0, 0.0, 0.0, 0.0);
    }

    let matches = comparisons.iter().filter(|matched| **matched).count();
    let accuracy = matches as f64 / total as f64;
    let precision = if matches > 0 { 1.0 } else { 0.0 };
    let recall = matches as f64 / total as f64;
    let f1_score = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    (accuracy, precision, recall, f1_score)
}
