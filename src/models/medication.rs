use serde::{Deserialize, Serialize};

/// One extracted medication, the unit the whole service produces and
/// consumes.
///
/// `original_text` is always present; the five entity lists default to empty
/// so a partially-filled generator reply still deserializes. Values are
/// never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicationEntity {
    pub original_text: String,
    #[serde(default)]
    pub quantity: Vec<String>,
    #[serde(default)]
    pub drug_name: Vec<String>,
    #[serde(default)]
    pub dosage: Vec<String>,
    #[serde(default)]
    pub administration_type: Vec<String>,
    #[serde(default)]
    pub brand: Vec<String>,
}

impl MedicationEntity {
    /// Entity carrying only the input text, substituted when extraction of
    /// that text failed. Keeps batch shape intact.
    pub fn fallback(original_text: impl Into<String>) -> Self {
        Self {
            original_text: original_text.into(),
            quantity: Vec::new(),
            drug_name: Vec::new(),
            dosage: Vec::new(),
            administration_type: Vec::new(),
            brand: Vec::new(),
        }
    }

    /// True when every entity list is empty (the fallback shape).
    pub fn is_empty(&self) -> bool {
        self.quantity.is_empty()
            && self.drug_name.is_empty()
            && self.dosage.is_empty()
            && self.administration_type.is_empty()
            && self.brand.is_empty()
    }
}

/// Result of one extraction request: one entity per input text, in input
/// order, plus wall-clock processing time in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicationResponse {
    pub results: Vec<MedicationEntity>,
    pub processing_time: f64,
}

/// Result of one indexing request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicationIndexResponse {
    pub message: String,
    pub processing_time: f64,
}
