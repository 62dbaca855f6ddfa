use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::MedicationEntity;

/// Sparse text representation: parallel index/weight arrays over a learned
/// vocabulary. Partner of the dense vector in hybrid retrieval.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

/// One unit of content flowing through a pipeline graph and into the vector
/// store.
///
/// Embedder stages attach `embedding`/`sparse_embedding`; retrieval attaches
/// `score`. The id is a caller-chosen stable string, so writing the same id
/// twice overwrites rather than duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    /// Arbitrary JSON payload carried alongside the content. For indexed
    /// medications this is the full [`MedicationEntity`].
    #[serde(default)]
    pub meta: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparse_embedding: Option<SparseVector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl Document {
    pub fn new(id: impl Into<String>, content: impl Into<String>, meta: Value) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            meta,
            embedding: None,
            sparse_embedding: None,
            score: None,
        }
    }
}

/// Map medications to indexable documents: id is the positional index
/// rendered as a string, content is the original text, and the full entity
/// rides along as metadata for few-shot prompting.
pub fn index_documents(
    medications: &[MedicationEntity],
) -> Result<Vec<Document>, serde_json::Error> {
    medications
        .iter()
        .enumerate()
        .map(|(index, med)| {
            Ok(Document::new(
                index.to_string(),
                med.original_text.clone(),
                serde_json::to_value(med)?,
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_entity(text: &str, drug: &str) -> MedicationEntity {
        MedicationEntity {
            original_text: text.into(),
            quantity: vec![],
            drug_name: vec![drug.into()],
            dosage: vec![],
            administration_type: vec![],
            brand: vec![],
        }
    }

    #[test]
    fn index_documents_uses_positional_ids() {
        let meds = vec![
            make_entity("Acetaminophen 325 MG Oral Tablet", "Acetaminophen"),
            make_entity("Aspirin 81 MG Chewable Tablet", "Aspirin"),
        ];
        let docs = index_documents(&meds).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "0");
        assert_eq!(docs[1].id, "1");
        assert_eq!(docs[0].content, "Acetaminophen 325 MG Oral Tablet");
    }

    #[test]
    fn index_documents_carries_full_entity_as_meta() {
        let meds = vec![make_entity("Aspirin 81 MG Chewable Tablet", "Aspirin")];
        let docs = index_documents(&meds).unwrap();
        let entity: MedicationEntity = serde_json::from_value(docs[0].meta.clone()).unwrap();
        assert_eq!(entity.drug_name, vec!["Aspirin"]);
    }

    #[test]
    fn document_deserializes_from_bare_record() {
        let doc: Document =
            serde_json::from_str(r#"{"id":"7","content":"Ibuprofen 200 MG","meta":{}}"#).unwrap();
        assert_eq!(doc.id, "7");
        assert!(doc.embedding.is_none());
        assert!(doc.score.is_none());
    }
}
