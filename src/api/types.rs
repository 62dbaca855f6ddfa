//! Shared state for the API layer.

use std::sync::Arc;

use crate::config::Settings;
use crate::pipeline::MedicationService;

/// Shared context handed to every handler.
///
/// Cloned per request by axum; both fields sit behind `Arc`s so clones
/// are cheap.
#[derive(Clone)]
pub struct ApiContext {
    pub settings: Arc<Settings>,
    pub medications: Arc<MedicationService>,
}

impl ApiContext {
    pub fn new(settings: Arc<Settings>, medications: Arc<MedicationService>) -> Self {
        Self {
            settings,
            medications,
        }
    }
}
