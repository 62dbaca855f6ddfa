//! Runs pipelines end to end with per-call construction.
//!
//! Every execution builds a fresh graph from the component factory, feeds
//! it, and tears it down with the call. Creation and execution timings are
//! measured per call and logged, never persisted.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::factory::PipelineFactory;
use super::graph::{PipelineGraph, PipelineInputs, PipelineOutputs, StageValue};
use super::PipelineError;
use crate::models::Document;

/// Document accepted by the indexing path: already typed, or a raw record
/// of the same shape that still needs checking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentInput {
    Typed(Document),
    Raw(serde_json::Value),
}

impl From<Document> for DocumentInput {
    fn from(document: Document) -> Self {
        DocumentInput::Typed(document)
    }
}

fn prepare_documents(inputs: Vec<DocumentInput>) -> Result<Vec<Document>, PipelineError> {
    inputs
        .into_iter()
        .map(|input| match input {
            DocumentInput::Typed(document) => Ok(document),
            DocumentInput::Raw(value) => serde_json::from_value(value)
                .map_err(|e| PipelineError::Validation(format!("Invalid document: {e}"))),
        })
        .collect()
}

/// Characters of query text kept in failure logs.
const QUERY_CONTEXT_CHARS: usize = 100;
/// Characters of rendered pipeline input kept in failure logs.
const INPUT_CONTEXT_CHARS: usize = 200;

/// Timing breakdown of one pipeline call.
#[derive(Debug, Clone, Copy)]
pub struct PipelineMetrics {
    pub pipeline_creation_time: Duration,
    pub execution_time: Duration,
    pub total_time: Duration,
}

impl PipelineMetrics {
    fn from_phases(creation: Duration, total: Duration) -> Self {
        Self {
            pipeline_creation_time: creation,
            execution_time: total.checked_sub(creation).unwrap_or_default(),
            total_time: total,
        }
    }
}

/// Creates and executes pipelines on demand.
pub struct PipelineService {
    factory: PipelineFactory,
}

impl PipelineService {
    pub fn new(factory: PipelineFactory) -> Self {
        Self { factory }
    }

    /// Run the full query pipeline for one text.
    pub async fn execute_query_pipeline(
        &self,
        text: &str,
    ) -> Result<PipelineOutputs, PipelineError> {
        self.execute_query_pipeline_with_captures(text, &[]).await
    }

    /// Run the query pipeline, additionally capturing all outputs of the
    /// named stages even where a connection consumes them.
    pub async fn execute_query_pipeline_with_captures(
        &self,
        text: &str,
        include_outputs_from: &[String],
    ) -> Result<PipelineOutputs, PipelineError> {
        if text.trim().is_empty() {
            return Err(PipelineError::Validation(
                "Query text must be a non-empty string".to_string(),
            ));
        }

        let start = Instant::now();
        let graph = self.factory.create_query_pipeline().await?;
        let creation = start.elapsed();
        tracing::debug!(creation_s = creation.as_secs_f64(), "Query pipeline created");

        let inputs = query_inputs(text);
        let outputs = match run_graph(graph, inputs, include_outputs_from.to_vec()).await {
            Ok(outputs) => outputs,
            Err(e) => {
                let query: String = text.chars().take(QUERY_CONTEXT_CHARS).collect();
                tracing::error!(error = %e, query = %query, "Query pipeline execution failed");
                return Err(e);
            }
        };

        let metrics = PipelineMetrics::from_phases(creation, start.elapsed());
        tracing::info!(
            creation_s = metrics.pipeline_creation_time.as_secs_f64(),
            execution_s = metrics.execution_time.as_secs_f64(),
            total_s = metrics.total_time.as_secs_f64(),
            "Query pipeline metrics"
        );
        Ok(outputs)
    }

    /// Run the indexing pipeline over a document batch. All documents are
    /// written or none are; the write count comes back on success.
    pub async fn execute_index_pipeline(
        &self,
        documents: Vec<DocumentInput>,
    ) -> Result<usize, PipelineError> {
        if documents.is_empty() {
            return Err(PipelineError::Validation(
                "Documents list cannot be empty".to_string(),
            ));
        }

        // Inputs are normalized before any graph is built.
        let documents = prepare_documents(documents)?;
        let document_count = documents.len();
        let start = Instant::now();
        let graph = self.factory.create_indexing_pipeline().await?;
        let creation = start.elapsed();
        tracing::debug!(
            creation_s = creation.as_secs_f64(),
            "Indexing pipeline created"
        );

        let inputs = index_inputs(documents);
        let outputs = match run_graph(graph, inputs, Vec::new()).await {
            Ok(outputs) => outputs,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    documents = document_count,
                    "Index pipeline execution failed"
                );
                return Err(e);
            }
        };

        let written = match outputs.get("writer", "documents_written") {
            Some(StageValue::Count(written)) => *written,
            _ => {
                return Err(PipelineError::Wiring(
                    "indexing pipeline produced no written count".to_string(),
                ))
            }
        };

        let metrics = PipelineMetrics::from_phases(creation, start.elapsed());
        tracing::info!(
            documents = document_count,
            creation_s = metrics.pipeline_creation_time.as_secs_f64(),
            execution_s = metrics.execution_time.as_secs_f64(),
            total_s = metrics.total_time.as_secs_f64(),
            "Documents indexed"
        );
        Ok(written)
    }
}

/// The query text fans out to every stage that needs it directly.
fn query_inputs(text: &str) -> PipelineInputs {
    let mut inputs = PipelineInputs::new();
    for (stage, port) in [
        ("sparse_embedder", "text"),
        ("dense_embedder", "text"),
        ("reranker", "query"),
        ("prompt_builder", "query"),
    ] {
        inputs
            .entry(stage.to_string())
            .or_default()
            .insert(port.to_string(), StageValue::Text(text.to_string()));
    }
    inputs
}

fn index_inputs(documents: Vec<Document>) -> PipelineInputs {
    let mut inputs = PipelineInputs::new();
    inputs
        .entry("sparse_embedder".to_string())
        .or_default()
        .insert("documents".to_string(), StageValue::Documents(documents));
    inputs
}

/// Stages call blocking HTTP clients, so graph execution moves to the
/// blocking pool as a unit.
async fn run_graph(
    graph: PipelineGraph,
    inputs: PipelineInputs,
    include_outputs_from: Vec<String>,
) -> Result<PipelineOutputs, PipelineError> {
    tokio::task::spawn_blocking(move || {
        let input_context: String = format!("{inputs:?}")
            .chars()
            .take(INPUT_CONTEXT_CHARS)
            .collect();
        graph.run(inputs, &include_outputs_from).map_err(|e| {
            tracing::error!(error = %e, input = %input_context, "Pipeline run failed");
            e
        })
    })
    .await
    .map_err(|e| PipelineError::Background(e.to_string()))?
}
