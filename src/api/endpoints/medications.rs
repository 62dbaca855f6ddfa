//! Medication extraction and indexing endpoints.
//!
//! Two endpoints:
//! - `POST /api/v1/extract` — run the query pipeline over a batch of texts
//! - `POST /api/v1/index` — write few-shot examples through the indexing
//!   pipeline

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::{MedicationEntity, MedicationIndexResponse, MedicationResponse};

/// Hard cap on texts per extraction request.
const MAX_TEXTS_PER_REQUEST: usize = 100;

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    pub texts: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct IndexRequest {
    pub medications: Vec<MedicationEntity>,
}

/// `POST /api/v1/extract` — extract medication entities from each text.
pub async fn extract(
    State(ctx): State<ApiContext>,
    Json(request): Json<ExtractRequest>,
) -> Result<Json<MedicationResponse>, ApiError> {
    // Validate
    if request.texts.is_empty() {
        return Err(ApiError::BadRequest("At least one text is required".into()));
    }
    if request.texts.len() > MAX_TEXTS_PER_REQUEST {
        return Err(ApiError::BadRequest(format!(
            "At most {MAX_TEXTS_PER_REQUEST} texts are accepted per request"
        )));
    }

    let response = ctx.medications.extract_entities(&request.texts).await;
    Ok(Json(response))
}

/// `POST /api/v1/index` — index medications as retrieval examples.
pub async fn index(
    State(ctx): State<ApiContext>,
    Json(request): Json<IndexRequest>,
) -> Result<Json<MedicationIndexResponse>, ApiError> {
    if request.medications.is_empty() {
        return Err(ApiError::BadRequest(
            "At least one medication is required".into(),
        ));
    }

    let response = ctx
        .medications
        .index_medications(&request.medications)
        .await?;
    Ok(Json(response))
}
