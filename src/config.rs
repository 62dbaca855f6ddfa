//! Process configuration.
//!
//! All tunables come from environment variables with working local-stack
//! defaults, loaded once at startup into an immutable [`Settings`] that is
//! injected into every component. Nothing below reads the environment after
//! `Settings::from_env` returns.

use std::env;
use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Rxtract";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "info,rxtract=debug"
}

/// Immutable runtime configuration.
///
/// One instance is built at startup and shared behind an `Arc`; components
/// copy out the fields they need at construction time.
#[derive(Debug, Clone)]
pub struct Settings {
    /// HTTP bind address for the API server.
    pub server_host: String,
    pub server_port: u16,
    /// Route prefix for the versioned API (e.g. `/api/v1`).
    pub api_v1_prefix: String,

    pub qdrant_host: String,
    pub qdrant_port: u16,
    pub qdrant_collection: String,
    /// Dense vector dimensionality of the collection.
    pub qdrant_embedding_dim: usize,

    /// Base URL of the embedding service (dense + sparse endpoints).
    pub embedding_api_url: String,
    pub dense_embedding_model: String,
    pub sparse_embedding_model: String,

    /// Base URL of the cross-encoder reranking service.
    pub reranker_api_url: String,
    pub reranker_model: String,
    /// Documents kept after reranking (prompt few-shot budget).
    pub reranker_top_k: usize,

    /// Candidates fetched from hybrid retrieval before reranking.
    pub retriever_top_k: usize,

    pub ollama_api_url: String,
    pub ollama_model: String,
    pub ollama_temperature: f32,
    /// `num_predict` cap for generation.
    pub ollama_max_tokens: u32,
    /// `num_ctx` context window for generation.
    pub ollama_max_context: u32,

    /// Directory holding the seed/evaluation JSON files.
    pub data_dir: PathBuf,
}

impl Settings {
    /// Load settings from the process environment, falling back to the
    /// defaults of a local development stack (Qdrant on 6333, Ollama on
    /// 11434, inference services on 8100/8110).
    pub fn from_env() -> Self {
        Self {
            server_host: env_or("SERVER_HOST", "0.0.0.0"),
            server_port: env_parse("SERVER_PORT", 8000),
            api_v1_prefix: env_or("API_V1_STR", "/api/v1"),

            qdrant_host: env_or("QDRANT_HOST", "localhost"),
            qdrant_port: env_parse("QDRANT_PORT", 6333),
            qdrant_collection: env_or("QDRANT_COLLECTION_NAME", "medications"),
            qdrant_embedding_dim: env_parse("QDRANT_EMBEDDING_DIM", 384),

            embedding_api_url: env_or("EMBEDDING_API_URL", "http://localhost:8100"),
            dense_embedding_model: env_or("EMBEDDING_MODEL_DENSE", "BAAI/bge-small-en-v1.5"),
            sparse_embedding_model: env_or(
                "EMBEDDING_MODEL_SPARSE",
                "Qdrant/bm42-all-minilm-l6-v2-attentions",
            ),

            reranker_api_url: env_or("RERANKER_API_URL", "http://localhost:8110"),
            reranker_model: env_or("RERANKER_MODEL", "cross-encoder/ms-marco-MiniLM-L-6-v2"),
            reranker_top_k: env_parse("RERANKER_TOP_K", 2),

            retriever_top_k: env_parse("RETRIEVER_TOP_K", 4),

            ollama_api_url: env_or("OLLAMA_API_URL", "http://localhost:11434"),
            ollama_model: env_or("OLLAMA_MODEL", "llama3.2:latest"),
            ollama_temperature: env_parse("OLLAMA_TEMPERATURE", 0.0),
            ollama_max_tokens: env_parse("OLLAMA_MAX_TOKENS", 150),
            ollama_max_context: env_parse("OLLAMA_MAX_CONTEXT", 2048),

            data_dir: PathBuf::from(env_or("DATA_DIR", "data")),
        }
    }

    /// `host:port` URL of the Qdrant REST endpoint.
    pub fn qdrant_url(&self) -> String {
        format!("http://{}:{}", self.qdrant_host, self.qdrant_port)
    }

    /// Socket address string the API server binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// Path of the few-shot seed file.
    pub fn few_shot_path(&self) -> PathBuf {
        self.data_dir.join("few_shot_examples.json")
    }

    /// Path of the evaluation dataset.
    pub fn eval_dataset_path(&self) -> PathBuf {
        self.data_dir.join("eval_dataset.json")
    }
}

impl Default for Settings {
    /// Defaults only — does not consult the environment. Used by tests.
    fn default() -> Self {
        Self {
            server_host: "0.0.0.0".into(),
            server_port: 8000,
            api_v1_prefix: "/api/v1".into(),
            qdrant_host: "localhost".into(),
            qdrant_port: 6333,
            qdrant_collection: "medications".into(),
            qdrant_embedding_dim: 384,
            embedding_api_url: "http://localhost:8100".into(),
            dense_embedding_model: "BAAI/bge-small-en-v1.5".into(),
            sparse_embedding_model: "Qdrant/bm42-all-minilm-l6-v2-attentions".into(),
            reranker_api_url: "http://localhost:8110".into(),
            reranker_model: "cross-encoder/ms-marco-MiniLM-L-6-v2".into(),
            reranker_top_k: 2,
            retriever_top_k: 4,
            ollama_api_url: "http://localhost:11434".into(),
            ollama_model: "llama3.2:latest".into(),
            ollama_temperature: 0.0,
            ollama_max_tokens: 150,
            ollama_max_context: 2048,
            data_dir: PathBuf::from("data"),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read and parse an env var, keeping the default on absence or parse error.
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}
