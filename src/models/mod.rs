pub mod document;
pub mod medication;

pub use document::{index_documents, Document, SparseVector};
pub use medication::{MedicationEntity, MedicationIndexResponse, MedicationResponse};
