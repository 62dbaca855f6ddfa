//! Vector store layer.
//!
//! [`DocumentStore`] is the contract the pipeline stages talk to: exact
//! document count (doubles as the liveness probe), overwrite-on-duplicate-id
//! writes, and hybrid dense+sparse retrieval. [`QdrantStore`] is the real
//! backend over the Qdrant REST API; [`InMemoryDocumentStore`] backs tests.

pub mod initializer;
pub mod memory;
pub mod qdrant;

pub use initializer::StoreInitializer;
pub use memory::{InMemoryConnector, InMemoryDocumentStore};
pub use qdrant::{QdrantConnector, QdrantStore};

use std::sync::Arc;

use thiserror::Error;

use crate::models::{Document, SparseVector};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Vector store is unreachable at {0}")]
    Connection(String),

    #[error("Connect attempt timed out after {0}s")]
    ConnectTimeout(u64),

    #[error("Read timed out after {0}s")]
    ReadTimeout(u64),

    #[error("Vector store temporarily unavailable (status {0})")]
    Unavailable(u16),

    #[error("Vector store returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Document {0} is missing the embeddings required for writing")]
    MissingEmbeddings(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("Background task failed: {0}")]
    Background(String),
}

impl StoreError {
    /// Connectivity failures worth retrying: refused connections, connect or
    /// read timeouts, and responses the store sends while overloaded. Every
    /// other kind is treated as fatal for the call.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Connection(_)
                | StoreError::ConnectTimeout(_)
                | StoreError::ReadTimeout(_)
                | StoreError::Unavailable(_)
        )
    }
}

/// Store operations the pipeline depends on.
pub trait DocumentStore: Send + Sync {
    /// Exact number of stored documents. Cheap, used as the liveness probe.
    fn count_documents(&self) -> Result<usize, StoreError>;

    /// Write documents, overwriting any existing document with the same id.
    /// Returns the number written.
    fn write_documents(&self, documents: &[Document]) -> Result<usize, StoreError>;

    /// Hybrid retrieval: rank by fused dense + sparse similarity, return the
    /// `top_k` best documents with content, metadata and score.
    fn hybrid_retrieval(
        &self,
        query_embedding: &[f32],
        query_sparse_embedding: &SparseVector,
        top_k: usize,
    ) -> Result<Vec<Document>, StoreError>;
}

/// Produces a fresh store connection handle per call. Pipelines never share
/// a handle across graph instances; every construction asks the connector
/// for its own.
pub trait StoreConnector: Send + Sync {
    fn connect(&self) -> Result<Arc<dyn DocumentStore>, StoreError>;
}
