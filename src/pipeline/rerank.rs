//! Client for the cross-encoder reranking service.
//!
//! The service scores query/document pairs; callers keep the top of the
//! reordered list. A warm-up request is issued at construction time so the
//! first real query does not pay the model load cost.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::embedding::{check_status, map_transport};
use super::InferenceError;

const CONNECT_TIMEOUT_SECS: u64 = 5;
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Relevance score for one document, by position in the request batch.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RerankScore {
    pub index: usize,
    pub score: f32,
}

/// Scores documents against a query.
pub trait Rerank: Send + Sync {
    fn warm_up(&self) -> Result<(), InferenceError>;
    fn rerank(&self, query: &str, documents: &[String])
        -> Result<Vec<RerankScore>, InferenceError>;
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankScore>,
}

/// REST client for the reranking service.
pub struct RerankApiClient {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
}

impl RerankApiClient {
    const SERVICE: &'static str = "reranking service";

    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: reqwest::blocking::Client::builder()
                .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    fn score(
        &self,
        query: &str,
        documents: &[String],
    ) -> Result<Vec<RerankScore>, InferenceError> {
        let url = format!("{}/rerank", self.base_url);
        let request = RerankRequest {
            model: &self.model,
            query,
            documents,
        };
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .map_err(|e| map_transport(Self::SERVICE, &url, e))?;
        let response = check_status(Self::SERVICE, response)?;
        let body: RerankResponse = response.json().map_err(|e| {
            InferenceError::ResponseParsing {
                service: Self::SERVICE,
                reason: e.to_string(),
            }
        })?;
        Ok(body.results)
    }
}

impl Rerank for RerankApiClient {
    /// Minimal scoring request that forces the service to load its model.
    fn warm_up(&self) -> Result<(), InferenceError> {
        let probe = vec!["warm up".to_string()];
        self.score("warm up", &probe).map(|_| ())
    }

    fn rerank(
        &self,
        query: &str,
        documents: &[String],
    ) -> Result<Vec<RerankScore>, InferenceError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        self.score(query, documents)
    }
}

/// Token-overlap reranker for tests. Counts query terms appearing in each
/// document, so it prefers lexically closer documents the way a real
/// cross-encoder prefers semantically closer ones.
pub struct MockRerank {
    warm_ups: std::sync::Arc<std::sync::atomic::AtomicU32>,
}

impl MockRerank {
    pub fn new() -> Self {
        Self {
            warm_ups: std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0)),
        }
    }

    pub fn warm_up_count(&self) -> u32 {
        self.warm_ups.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn overlap(query: &str, document: &str) -> f32 {
        let document = document.to_lowercase();
        let document_tokens: std::collections::BTreeSet<&str> =
            document.split_whitespace().collect();
        let query = query.to_lowercase();
        query
            .split_whitespace()
            .filter(|token| document_tokens.contains(token))
            .count() as f32
    }
}

impl Default for MockRerank {
    fn default() -> Self {
        Self::new()
    }
}

impl Rerank for MockRerank {
    fn warm_up(&self) -> Result<(), InferenceError> {
        self.warm_ups
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    fn rerank(
        &self,
        query: &str,
        documents: &[String],
    ) -> Result<Vec<RerankScore>, InferenceError> {
        Ok(documents
            .iter()
            .enumerate()
            .map(|(index, document)| RerankScore {
                index,
                score: Self::overlap(query, document),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rerank_request_serializes_all_fields() {
        let documents = vec!["metformin 500mg tablet".to_string()];
        let request = RerankRequest {
            model: "cross-encoder/ms-marco-MiniLM-L-6-v2",
            query: "metformin dose",
            documents: &documents,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "cross-encoder/ms-marco-MiniLM-L-6-v2");
        assert_eq!(json["query"], "metformin dose");
        assert_eq!(json["documents"][0], "metformin 500mg tablet");
    }

    #[test]
    fn mock_scores_every_document() {
        let reranker = MockRerank::new();
        let documents = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let scores = reranker.rerank("a", &documents).unwrap();
        assert_eq!(scores.len(), 3);
        assert_eq!(scores[0].index, 0);
        assert_eq!(scores[2].index, 2);
    }

    #[test]
    fn mock_prefers_higher_overlap() {
        let reranker = MockRerank::new();
        let documents = vec![
            "unrelated text about weather".to_string(),
            "lisinopril 10mg once daily".to_string(),
        ];
        let scores = reranker.rerank("lisinopril 10mg", &documents).unwrap();
        assert!(scores[1].score > scores[0].score);
    }

    #[test]
    fn mock_counts_warm_ups() {
        let reranker = MockRerank::new();
        assert_eq!(reranker.warm_up_count(), 0);
        reranker.warm_up().unwrap();
        reranker.warm_up().unwrap();
        assert_eq!(reranker.warm_up_count(), 2);
    }
}
