use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::{DocumentStore, StoreConnector, StoreError};
use crate::config::Settings;
use crate::models::{Document, SparseVector};

/// Named vector spaces inside the collection. Dense and sparse embeddings
/// of the same document live side by side under these keys.
const DENSE_SPACE: &str = "text-dense";
const SPARSE_SPACE: &str = "text-sparse";

const CONNECT_TIMEOUT_SECS: u64 = 5;
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Qdrant REST client scoped to one collection.
///
/// `connect` builds the handle and makes sure the collection exists with
/// the expected vector spaces; it never recreates an existing collection.
/// Point ids are derived from document ids (UUIDv5), so writing a document
/// id twice overwrites the previous point instead of duplicating it.
pub struct QdrantStore {
    base_url: String,
    collection: String,
    embedding_dim: usize,
    /// Ask Qdrant to apply writes before answering, so a completed index
    /// call is immediately visible to retrieval.
    wait_for_writes: bool,
    client: reqwest::blocking::Client,
}

impl QdrantStore {
    /// Build a handle without touching the network.
    pub fn new(settings: &Settings) -> Self {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: settings.qdrant_url().trim_end_matches('/').to_string(),
            collection: settings.qdrant_collection.clone(),
            embedding_dim: settings.qdrant_embedding_dim,
            wait_for_writes: true,
            client,
        }
    }

    /// Build a handle and ensure the collection exists.
    pub fn connect(settings: &Settings) -> Result<Self, StoreError> {
        let store = Self::new(settings);
        store.ensure_collection()?;
        Ok(store)
    }

    /// Create the collection if missing: cosine dense space at the
    /// configured dimension plus an IDF-weighted sparse space. An existing
    /// collection is left untouched.
    fn ensure_collection(&self) -> Result<(), StoreError> {
        let url = format!("{}/collections/{}", self.base_url, self.collection);
        let response = self.client.get(&url).send().map_err(|e| self.map_transport(e))?;

        match response.status().as_u16() {
            200 => return Ok(()),
            404 => {}
            _ => return Err(Self::map_status(response)),
        }

        tracing::info!(collection = %self.collection, dim = self.embedding_dim, "Creating Qdrant collection");
        let body = json!({
            "vectors": {
                DENSE_SPACE: { "size": self.embedding_dim, "distance": "Cosine" }
            },
            "sparse_vectors": {
                SPARSE_SPACE: { "modifier": "idf" }
            }
        });
        let response = self
            .client
            .put(&url)
            .json(&body)
            .send()
            .map_err(|e| self.map_transport(e))?;
        if !response.status().is_success() {
            return Err(Self::map_status(response));
        }
        Ok(())
    }

    /// Qdrant only accepts integers or UUIDs as point ids; derive a stable
    /// UUID from the document id so rewrites land on the same point.
    fn point_id(document_id: &str) -> String {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, document_id.as_bytes()).to_string()
    }

    fn map_transport(&self, e: reqwest::Error) -> StoreError {
        if e.is_connect() && e.is_timeout() {
            StoreError::ConnectTimeout(CONNECT_TIMEOUT_SECS)
        } else if e.is_connect() {
            StoreError::Connection(self.base_url.clone())
        } else if e.is_timeout() {
            StoreError::ReadTimeout(REQUEST_TIMEOUT_SECS)
        } else {
            StoreError::HttpClient(e.to_string())
        }
    }

    /// Classify a non-success response: overload statuses are transient,
    /// everything else is a hard API error.
    fn map_status(response: reqwest::blocking::Response) -> StoreError {
        let status = response.status().as_u16();
        if matches!(status, 429 | 500 | 502 | 503 | 504) {
            return StoreError::Unavailable(status);
        }
        let body = response.text().unwrap_or_default();
        StoreError::Api { status, body }
    }

    fn build_points(documents: &[Document]) -> Result<Vec<Point>, StoreError> {
        documents
            .iter()
            .map(|doc| {
                let dense = doc
                    .embedding
                    .as_ref()
                    .ok_or_else(|| StoreError::MissingEmbeddings(doc.id.clone()))?;
                let sparse = doc
                    .sparse_embedding
                    .as_ref()
                    .ok_or_else(|| StoreError::MissingEmbeddings(doc.id.clone()))?;
                Ok(Point {
                    id: Self::point_id(&doc.id),
                    vector: json!({
                        DENSE_SPACE: dense,
                        SPARSE_SPACE: { "indices": sparse.indices, "values": sparse.values },
                    }),
                    payload: PointPayload {
                        document_id: doc.id.clone(),
                        content: doc.content.clone(),
                        meta: doc.meta.clone(),
                    },
                })
            })
            .collect()
    }
}

impl DocumentStore for QdrantStore {
    fn count_documents(&self) -> Result<usize, StoreError> {
        let url = format!("{}/collections/{}/points/count", self.base_url, self.collection);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "exact": true }))
            .send()
            .map_err(|e| self.map_transport(e))?;
        if !response.status().is_success() {
            return Err(Self::map_status(response));
        }
        let parsed: CountResponse = response
            .json()
            .map_err(|e| StoreError::ResponseParsing(e.to_string()))?;
        Ok(parsed.result.count)
    }

    fn write_documents(&self, documents: &[Document]) -> Result<usize, StoreError> {
        let points = Self::build_points(documents)?;
        let written = points.len();

        let url = format!(
            "{}/collections/{}/points?wait={}",
            self.base_url, self.collection, self.wait_for_writes
        );
        let response = self
            .client
            .put(&url)
            .json(&UpsertPoints { points })
            .send()
            .map_err(|e| self.map_transport(e))?;
        if !response.status().is_success() {
            return Err(Self::map_status(response));
        }
        Ok(written)
    }

    fn hybrid_retrieval(
        &self,
        query_embedding: &[f32],
        query_sparse_embedding: &SparseVector,
        top_k: usize,
    ) -> Result<Vec<Document>, StoreError> {
        let url = format!("{}/collections/{}/points/query", self.base_url, self.collection);
        // Prefetch both spaces, then fuse with reciprocal rank fusion.
        let body = json!({
            "prefetch": [
                {
                    "query": {
                        "indices": query_sparse_embedding.indices,
                        "values": query_sparse_embedding.values,
                    },
                    "using": SPARSE_SPACE,
                    "limit": top_k,
                },
                {
                    "query": query_embedding,
                    "using": DENSE_SPACE,
                    "limit": top_k,
                },
            ],
            "query": { "fusion": "rrf" },
            "limit": top_k,
            "with_payload": true,
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| self.map_transport(e))?;
        if !response.status().is_success() {
            return Err(Self::map_status(response));
        }
        let parsed: QueryResponse = response
            .json()
            .map_err(|e| StoreError::ResponseParsing(e.to_string()))?;

        Ok(parsed
            .result
            .points
            .into_iter()
            .map(|point| {
                let mut doc = Document::new(
                    point.payload.document_id,
                    point.payload.content,
                    point.payload.meta,
                );
                doc.score = Some(point.score);
                doc
            })
            .collect())
    }
}

/// Fresh-handle factory for the real backend. Every `connect` builds a new
/// `QdrantStore` and re-validates the collection.
pub struct QdrantConnector {
    settings: Arc<Settings>,
}

impl QdrantConnector {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self { settings }
    }
}

impl StoreConnector for QdrantConnector {
    fn connect(&self) -> Result<Arc<dyn DocumentStore>, StoreError> {
        tracing::debug!(collection = %self.settings.qdrant_collection, "Opening Qdrant store handle");
        Ok(Arc::new(QdrantStore::connect(&self.settings)?))
    }
}

#[derive(Serialize)]
struct UpsertPoints {
    points: Vec<Point>,
}

#[derive(Debug, Serialize)]
struct Point {
    id: String,
    vector: serde_json::Value,
    payload: PointPayload,
}

#[derive(Debug, Serialize, Deserialize)]
struct PointPayload {
    document_id: String,
    content: String,
    meta: serde_json::Value,
}

#[derive(Deserialize)]
struct CountResponse {
    result: CountResult,
}

#[derive(Deserialize)]
struct CountResult {
    count: usize,
}

#[derive(Deserialize)]
struct QueryResponse {
    result: QueryResult,
}

#[derive(Deserialize)]
struct QueryResult {
    points: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    score: f32,
    payload: PointPayload,
}
