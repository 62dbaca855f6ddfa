pub mod components;
pub mod embedding;
pub mod execution;
pub mod extraction;
pub mod factory;
pub mod graph;
pub mod ollama;
pub mod prompt;
pub mod rerank;

pub use components::{ComponentFactory, MockComponentFactory, ServiceComponentFactory};
pub use execution::{DocumentInput, PipelineMetrics, PipelineService};
pub use extraction::MedicationService;
pub use factory::PipelineFactory;
pub use graph::{PipelineGraph, PipelineInputs, PipelineOutputs, Stage, StageValue};

use thiserror::Error;

use crate::store::StoreError;

/// Failures from the external model services (embedding, reranking,
/// generation).
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("{service} is not reachable at {url}")]
    Connection { service: &'static str, url: String },

    #[error("{service} request timed out after {timeout_secs}s")]
    Timeout {
        service: &'static str,
        timeout_secs: u64,
    },

    #[error("{service} returned status {status}: {body}")]
    Api {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} response could not be parsed: {reason}")]
    ResponseParsing {
        service: &'static str,
        reason: String,
    },

    #[error("HTTP client error against {service}: {reason}")]
    HttpClient {
        service: &'static str,
        reason: String,
    },

    #[error("{service} returned {got} embeddings for {expected} inputs")]
    BatchShape {
        service: &'static str,
        expected: usize,
        got: usize,
    },
}

/// Failures while assembling or running a pipeline graph.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Graph wiring error: {0}")]
    Wiring(String),

    #[error("Stage {stage} has no value for input port {port}")]
    MissingInput { stage: String, port: String },

    #[error("Stage {stage} received an unexpected value kind on port {port}: {got}")]
    PortType {
        stage: String,
        port: String,
        got: &'static str,
    },

    #[error("Vector store error: {0}")]
    Store(#[from] StoreError),

    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Background(String),
}
