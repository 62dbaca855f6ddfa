//! Clients for the embedding sidecar, which serves both dense sentence
//! vectors and sparse lexical vectors over REST.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::InferenceError;
use crate::models::SparseVector;

const CONNECT_TIMEOUT_SECS: u64 = 5;
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Produces one dense vector per input text.
pub trait DenseEmbedder: Send + Sync {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, InferenceError>;
}

/// Produces one sparse vector per input text.
pub trait SparseEmbedder: Send + Sync {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<SparseVector>, InferenceError>;
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    texts: &'a [String],
}

#[derive(Deserialize)]
struct DenseEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Deserialize)]
struct SparseEmbedResponse {
    embeddings: Vec<SparseVector>,
}

/// REST client for the dense half of the embedding service.
pub struct DenseEmbeddingClient {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
}

impl DenseEmbeddingClient {
    const SERVICE: &'static str = "embedding service";

    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: http_client(),
        }
    }
}

impl DenseEmbedder for DenseEmbeddingClient {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, InferenceError> {
        let url = format!("{}/embed", self.base_url);
        let request = EmbedRequest {
            model: &self.model,
            texts,
        };
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .map_err(|e| map_transport(Self::SERVICE, &url, e))?;
        let response = check_status(Self::SERVICE, response)?;
        let body: DenseEmbedResponse = response.json().map_err(|e| {
            InferenceError::ResponseParsing {
                service: Self::SERVICE,
                reason: e.to_string(),
            }
        })?;
        check_batch_shape(Self::SERVICE, texts.len(), body.embeddings.len())?;
        Ok(body.embeddings)
    }
}

/// REST client for the sparse half of the embedding service.
pub struct SparseEmbeddingClient {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
}

impl SparseEmbeddingClient {
    const SERVICE: &'static str = "embedding service";

    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: http_client(),
        }
    }
}

impl SparseEmbedder for SparseEmbeddingClient {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<SparseVector>, InferenceError> {
        let url = format!("{}/embed_sparse", self.base_url);
        let request = EmbedRequest {
            model: &self.model,
            texts,
        };
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .map_err(|e| map_transport(Self::SERVICE, &url, e))?;
        let response = check_status(Self::SERVICE, response)?;
        let body: SparseEmbedResponse = response.json().map_err(|e| {
            InferenceError::ResponseParsing {
                service: Self::SERVICE,
                reason: e.to_string(),
            }
        })?;
        check_batch_shape(Self::SERVICE, texts.len(), body.embeddings.len())?;
        Ok(body.embeddings)
    }
}

fn http_client() -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .expect("Failed to create HTTP client")
}

pub(super) fn map_transport(
    service: &'static str,
    url: &str,
    err: reqwest::Error,
) -> InferenceError {
    if err.is_timeout() {
        InferenceError::Timeout {
            service,
            timeout_secs: REQUEST_TIMEOUT_SECS,
        }
    } else if err.is_connect() {
        InferenceError::Connection {
            service,
            url: url.to_string(),
        }
    } else {
        InferenceError::HttpClient {
            service,
            reason: err.to_string(),
        }
    }
}

pub(super) fn check_status(
    service: &'static str,
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, InferenceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(InferenceError::Api {
        service,
        status: status.as_u16(),
        body,
    })
}

fn check_batch_shape(
    service: &'static str,
    expected: usize,
    got: usize,
) -> Result<(), InferenceError> {
    if expected == got {
        Ok(())
    } else {
        Err(InferenceError::BatchShape {
            service,
            expected,
            got,
        })
    }
}

/// Deterministic in-process embedder for tests and offline runs.
pub struct MockDenseEmbedder {
    dimension: usize,
}

impl MockDenseEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    /// Stable unit-length vector derived from the text bytes.
    fn deterministic_vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for (i, byte) in text.bytes().enumerate() {
            vector[i % self.dimension] += f32::from(byte) / 255.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

impl DenseEmbedder for MockDenseEmbedder {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, InferenceError> {
        Ok(texts
            .iter()
            .map(|text| self.deterministic_vector(text))
            .collect())
    }
}

/// Token-hash sparse embedder for tests, counting term occurrences.
pub struct MockSparseEmbedder;

impl MockSparseEmbedder {
    fn token_index(token: &str) -> u32 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        token.to_lowercase().hash(&mut hasher);
        (hasher.finish() % 30_522) as u32
    }
}

impl SparseEmbedder for MockSparseEmbedder {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<SparseVector>, InferenceError> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut weights = std::collections::BTreeMap::new();
                for token in text.split_whitespace() {
                    *weights.entry(Self::token_index(token)).or_insert(0.0f32) += 1.0;
                }
                SparseVector {
                    indices: weights.keys().copied().collect(),
                    values: weights.values().copied().collect(),
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embed_request_serializes_model_and_texts() {
        let texts = vec!["amoxicillin 500mg".to_string()];
        let request = EmbedRequest {
            model: "BAAI/bge-small-en-v1.5",
            texts: &texts,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "BAAI/bge-small-en-v1.5");
        assert_eq!(json["texts"][0], "amoxicillin 500mg");
    }

    #[test]
    fn mock_dense_vectors_are_stable_and_normalized() {
        let embedder = MockDenseEmbedder::new(16);
        let texts = vec!["ibuprofen 200mg".to_string()];
        let first = embedder.embed_batch(&texts).unwrap();
        let second = embedder.embed_batch(&texts).unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].len(), 16);
        let norm: f32 = first[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn mock_dense_batch_matches_input_length() {
        let embedder = MockDenseEmbedder::new(8);
        let texts = vec!["one".to_string(), "two".to_string(), "three".to_string()];
        assert_eq!(embedder.embed_batch(&texts).unwrap().len(), 3);
    }

    #[test]
    fn mock_sparse_counts_repeated_tokens() {
        let embedder = MockSparseEmbedder;
        let texts = vec!["aspirin aspirin daily".to_string()];
        let vectors = embedder.embed_batch(&texts).unwrap();
        assert_eq!(vectors[0].indices.len(), 2);
        assert!(vectors[0].values.contains(&2.0));
        assert!(vectors[0].values.contains(&1.0));
    }

    #[test]
    fn mock_sparse_is_case_insensitive() {
        let embedder = MockSparseEmbedder;
        let lower = embedder
            .embed_batch(&["tylenol".to_string()])
            .unwrap();
        let upper = embedder
            .embed_batch(&["Tylenol".to_string()])
            .unwrap();
        assert_eq!(lower[0].indices, upper[0].indices);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = DenseEmbeddingClient::new("http://localhost:8100/", "test-model");
        assert_eq!(client.base_url, "http://localhost:8100");
        let sparse = SparseEmbeddingClient::new("http://localhost:8100///", "test-model");
        assert_eq!(sparse.base_url, "http://localhost:8100");
    }
}
