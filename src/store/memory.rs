use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use super::{DocumentStore, StoreConnector, StoreError};
use crate::models::{Document, SparseVector};

/// In-memory document store for testing.
/// Keyed by document id, so repeated writes overwrite like the real store.
pub struct InMemoryDocumentStore {
    entries: Mutex<BTreeMap<String, Document>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Snapshot of a stored document by id.
    pub fn get(&self, id: &str) -> Option<Document> {
        self.entries.lock().unwrap().get(id).cloned()
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn count_documents(&self) -> Result<usize, StoreError> {
        Ok(self.entries.lock().unwrap().len())
    }

    fn write_documents(&self, documents: &[Document]) -> Result<usize, StoreError> {
        for doc in documents {
            if doc.embedding.is_none() || doc.sparse_embedding.is_none() {
                return Err(StoreError::MissingEmbeddings(doc.id.clone()));
            }
        }
        let mut entries = self.entries.lock().unwrap();
        for doc in documents {
            entries.insert(doc.id.clone(), doc.clone());
        }
        Ok(documents.len())
    }

    fn hybrid_retrieval(
        &self,
        query_embedding: &[f32],
        query_sparse_embedding: &SparseVector,
        top_k: usize,
    ) -> Result<Vec<Document>, StoreError> {
        let entries = self.entries.lock().unwrap();
        let mut scored: Vec<Document> = entries
            .values()
            .filter_map(|doc| {
                let dense = doc.embedding.as_ref()?;
                let sparse = doc.sparse_embedding.as_ref()?;
                let score = cosine_similarity(query_embedding, dense)
                    + sparse_dot(query_sparse_embedding, sparse);
                // Results carry payload and score only, like the real store.
                let mut hit = Document::new(doc.id.clone(), doc.content.clone(), doc.meta.clone());
                hit.score = Some(score);
                Some(hit)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);
        Ok(scored)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Dot product over the shared indices of two sparse vectors.
fn sparse_dot(a: &SparseVector, b: &SparseVector) -> f32 {
    let mut score = 0.0;
    for (i, index) in a.indices.iter().enumerate() {
        if let Some(j) = b.indices.iter().position(|other| other == index) {
            score += a.values.get(i).copied().unwrap_or(0.0) * b.values.get(j).copied().unwrap_or(0.0);
        }
    }
    score
}

/// Connector handing out handles to one shared in-memory store, the way
/// separate client handles reach the same server.
pub struct InMemoryConnector {
    store: Arc<InMemoryDocumentStore>,
}

impl InMemoryConnector {
    pub fn new(store: Arc<InMemoryDocumentStore>) -> Self {
        Self { store }
    }
}

impl StoreConnector for InMemoryConnector {
    fn connect(&self) -> Result<Arc<dyn DocumentStore>, StoreError> {
        Ok(Arc::clone(&self.store) as Arc<dyn DocumentStore>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn embedded_doc(id: &str, embedding: Vec<f32>) -> Document {
        let mut doc = Document::new(id, format!("medication {id}"), json!({"id": id}));
        doc.embedding = Some(embedding);
        doc.sparse_embedding = Some(SparseVector {
            indices: vec![1, 2],
            values: vec![0.5, 0.5],
        });
        doc
    }

    #[test]
    fn writes_count_and_overwrite_by_id() {
        let store = InMemoryDocumentStore::new();
        let first = vec![
            embedded_doc("0", vec![1.0, 0.0]),
            embedded_doc("1", vec![0.0, 1.0]),
        ];
        assert_eq!(store.write_documents(&first).unwrap(), 2);
        assert_eq!(store.count_documents().unwrap(), 2);

        // Same ids again: overwritten, not duplicated.
        assert_eq!(store.write_documents(&first).unwrap(), 2);
        assert_eq!(store.count_documents().unwrap(), 2);
    }

    #[test]
    fn overwrite_keeps_latest_content() {
        let store = InMemoryDocumentStore::new();
        store
            .write_documents(&[embedded_doc("0", vec![1.0, 0.0])])
            .unwrap();
        let mut updated = embedded_doc("0", vec![1.0, 0.0]);
        updated.content = "updated".into();
        store.write_documents(&[updated]).unwrap();
        assert_eq!(store.get("0").unwrap().content, "updated");
    }

    #[test]
    fn write_rejects_unembedded_documents() {
        let store = InMemoryDocumentStore::new();
        let err = store
            .write_documents(&[Document::new("0", "bare", json!(null))])
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingEmbeddings(_)));
    }

    #[test]
    fn hybrid_retrieval_ranks_by_similarity() {
        let store = InMemoryDocumentStore::new();
        store
            .write_documents(&[
                embedded_doc("aligned", vec![1.0, 0.0]),
                embedded_doc("orthogonal", vec![0.0, 1.0]),
            ])
            .unwrap();

        let query_sparse = SparseVector {
            indices: vec![3],
            values: vec![1.0],
        };
        let hits = store
            .hybrid_retrieval(&[1.0, 0.0], &query_sparse, 2)
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "aligned");
        assert!(hits[0].score.unwrap() > hits[1].score.unwrap());
    }

    #[test]
    fn hybrid_retrieval_honors_top_k() {
        let store = InMemoryDocumentStore::new();
        store
            .write_documents(&[
                embedded_doc("0", vec![1.0, 0.0]),
                embedded_doc("1", vec![0.9, 0.1]),
                embedded_doc("2", vec![0.0, 1.0]),
            ])
            .unwrap();
        let hits = store
            .hybrid_retrieval(&[1.0, 0.0], &SparseVector::default(), 2)
            .unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn connector_handles_share_backing_state() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let connector = InMemoryConnector::new(Arc::clone(&store));
        let handle_a = connector.connect().unwrap();
        let handle_b = connector.connect().unwrap();

        handle_a
            .write_documents(&[embedded_doc("0", vec![1.0, 0.0])])
            .unwrap();
        assert_eq!(handle_b.count_documents().unwrap(), 1);
    }
}
