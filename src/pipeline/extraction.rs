//! Medication entity extraction and indexing on top of the pipelines.
//!
//! Extraction processes texts one at a time and isolates them: a text
//! whose pipeline run or reply parse fails degrades to an empty entity
//! carrying its input, and the rest of the batch is unaffected. Indexing
//! is the opposite, one batch succeeds or fails as a whole.

use std::time::Instant;

use uuid::Uuid;

use super::execution::PipelineService;
use super::graph::PipelineOutputs;
use super::PipelineError;
use crate::models::{
    index_documents, MedicationEntity, MedicationIndexResponse, MedicationResponse,
};

pub struct MedicationService {
    pipeline_service: PipelineService,
}

impl MedicationService {
    pub fn new(pipeline_service: PipelineService) -> Self {
        Self { pipeline_service }
    }

    /// Index medication entities into the vector store.
    pub async fn index_medications(
        &self,
        medications: &[MedicationEntity],
    ) -> Result<MedicationIndexResponse, PipelineError> {
        let request_id = Uuid::new_v4();
        tracing::info!(
            request_id = %request_id,
            medications = medications.len(),
            "Starting indexing operation"
        );
        let start = Instant::now();

        let documents = index_documents(medications)?
            .into_iter()
            .map(Into::into)
            .collect();
        match self.pipeline_service.execute_index_pipeline(documents).await {
            Ok(written) => {
                let processing_time = start.elapsed().as_secs_f64();
                tracing::info!(
                    request_id = %request_id,
                    written,
                    seconds = processing_time,
                    "Medications indexed"
                );
                Ok(MedicationIndexResponse {
                    message: format!("Successfully indexed {} medications", medications.len()),
                    processing_time,
                })
            }
            Err(e) => {
                tracing::error!(request_id = %request_id, error = %e, "Failed to index medications");
                Err(e)
            }
        }
    }

    /// Extract medication entities from each text, in input order.
    pub async fn extract_entities(&self, texts: &[String]) -> MedicationResponse {
        let request_id = Uuid::new_v4();
        tracing::info!(
            request_id = %request_id,
            texts = texts.len(),
            "Starting entity extraction"
        );
        let start = Instant::now();

        let mut results = Vec::with_capacity(texts.len());
        for (position, text) in texts.iter().enumerate() {
            let item = position + 1;
            tracing::debug!(
                request_id = %request_id,
                item,
                total = texts.len(),
                "Processing text"
            );
            results.push(self.process_single_text(text, &request_id, item).await);
        }

        let processing_time = start.elapsed().as_secs_f64();
        tracing::info!(
            request_id = %request_id,
            texts = texts.len(),
            seconds = processing_time,
            "Entity extraction completed"
        );
        MedicationResponse {
            results,
            processing_time,
        }
    }

    async fn process_single_text(
        &self,
        text: &str,
        request_id: &Uuid,
        item: usize,
    ) -> MedicationEntity {
        match self.try_extract(text).await {
            Ok(entity) => {
                tracing::debug!(request_id = %request_id, item, "Extracted entities");
                entity
            }
            Err(e) => {
                tracing::error!(request_id = %request_id, item, error = %e, "Failed to process text");
                MedicationEntity::fallback(text)
            }
        }
    }

    async fn try_extract(&self, text: &str) -> Result<MedicationEntity, PipelineError> {
        let outputs = self.pipeline_service.execute_query_pipeline(text).await?;
        let reply = first_reply(&outputs)?;
        parse_reply(reply, text).map_err(|e| {
            tracing::error!(error = %e, "Failed to parse model reply");
            PipelineError::Serialization(e)
        })
    }
}

fn first_reply(outputs: &PipelineOutputs) -> Result<&str, PipelineError> {
    outputs
        .replies("llm")
        .and_then(|replies| replies.first())
        .map(String::as_str)
        .ok_or_else(|| PipelineError::Wiring("query pipeline produced no replies".to_string()))
}

/// Parse a model reply into an entity. The input text always wins over
/// whatever the model put in `original_text`, and a reply that omits the
/// field entirely still parses.
fn parse_reply(reply: &str, original_text: &str) -> Result<MedicationEntity, serde_json::Error> {
    let mut value: serde_json::Value = serde_json::from_str(reply.trim())?;
    if let Some(fields) = value.as_object_mut() {
        fields.insert(
            "original_text".to_string(),
            serde_json::Value::String(original_text.to_string()),
        );
    }
    serde_json::from_value(value)
}
