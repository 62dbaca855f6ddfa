//! Startup seed data.
//!
//! Loads `data/few_shot_examples.json` and indexes its medications through
//! the standard indexing pipeline so retrieval has few-shot examples from
//! the first request on. A missing file only logs a warning; a malformed
//! one aborts startup.

use std::path::Path;

use thiserror::Error;
use tracing::{info, warn};

use crate::models::MedicationEntity;
use crate::pipeline::{MedicationService, PipelineError};

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("Failed to read seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON in seed file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Read the seed file into entities. A missing file yields an empty list.
pub fn load_medications(path: &Path) -> Result<Vec<MedicationEntity>, SeedError> {
    if !path.exists() {
        warn!(path = %path.display(), "Initial data file not found");
        return Ok(Vec::new());
    }

    let raw = std::fs::read_to_string(path)?;
    let medications: Vec<MedicationEntity> = serde_json::from_str(&raw)?;
    info!(
        count = medications.len(),
        path = %path.display(),
        "Loaded medications from seed file"
    );
    Ok(medications)
}

/// Load and index the seed data, returning how many medications went in.
///
/// Indexing is skipped when the file is missing or empty. Document ids are
/// positional, so reseeding overwrites the previous seed instead of
/// accumulating duplicates.
pub async fn load_initial_data(
    service: &MedicationService,
    path: &Path,
) -> Result<usize, SeedError> {
    let medications = load_medications(path)?;
    if medications.is_empty() {
        return Ok(0);
    }

    service.index_medications(&medications).await?;
    info!(count = medications.len(), "Initial medication data loaded");
    Ok(medications.len())
}
