//! Client for a local Ollama instance.
//!
//! Generation is non-streaming: the prompt goes out, one completed reply
//! comes back. Sampling options pin the model to deterministic, bounded
//! output since replies must parse as JSON.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::embedding::{check_status, map_transport};
use super::InferenceError;

const CONNECT_TIMEOUT_SECS: u64 = 5;
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Turns a prompt into one or more model replies.
pub trait LlmGenerate: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<Vec<String>, InferenceError>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
    num_ctx: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// REST client for Ollama's generate endpoint.
pub struct OllamaClient {
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_context: u32,
    client: reqwest::blocking::Client,
}

impl OllamaClient {
    const SERVICE: &'static str = "Ollama";

    pub fn new(
        base_url: &str,
        model: &str,
        temperature: f32,
        max_tokens: u32,
        max_context: u32,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature,
            max_tokens,
            max_context,
            client: reqwest::blocking::Client::builder()
                .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to create HTTP client"),
        }
    }
}

impl LlmGenerate for OllamaClient {
    fn generate(&self, prompt: &str) -> Result<Vec<String>, InferenceError> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
                num_ctx: self.max_context,
            },
        };
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .map_err(|e| map_transport(Self::SERVICE, &url, e))?;
        let response = check_status(Self::SERVICE, response)?;
        let body: GenerateResponse = response.json().map_err(|e| {
            InferenceError::ResponseParsing {
                service: Self::SERVICE,
                reason: e.to_string(),
            }
        })?;
        Ok(vec![body.response])
    }
}

/// Scripted generator for tests. Replies are handed out in order; asking
/// for more than were queued is an error so tests notice extra calls.
pub struct MockLlm {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl MockLlm {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn single(reply: impl Into<String>) -> Self {
        Self::new(vec![reply.into()])
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl LlmGenerate for MockLlm {
    fn generate(&self, prompt: &str) -> Result<Vec<String>, InferenceError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.replies.lock().unwrap().pop_front() {
            Some(reply) => Ok(vec![reply]),
            None => Err(InferenceError::Api {
                service: "Ollama",
                status: 500,
                body: "mock reply queue exhausted".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_request_is_non_streaming_with_options() {
        let request = GenerateRequest {
            model: "llama3.2:latest",
            prompt: "extract entities",
            stream: false,
            options: GenerateOptions {
                temperature: 0.0,
                num_predict: 150,
                num_ctx: 2048,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "llama3.2:latest");
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["temperature"], 0.0);
        assert_eq!(json["options"]["num_predict"], 150);
        assert_eq!(json["options"]["num_ctx"], 2048);
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client = OllamaClient::new("http://localhost:11434/", "llama3.2:latest", 0.0, 150, 2048);
        assert_eq!(client.base_url, "http://localhost:11434");
    }

    #[test]
    fn mock_hands_out_replies_in_order() {
        let llm = MockLlm::new(vec!["first".to_string(), "second".to_string()]);
        assert_eq!(llm.generate("a").unwrap(), vec!["first"]);
        assert_eq!(llm.generate("b").unwrap(), vec!["second"]);
    }

    #[test]
    fn mock_fails_when_queue_is_exhausted() {
        let llm = MockLlm::single("only");
        llm.generate("a").unwrap();
        assert!(llm.generate("b").is_err());
    }

    #[test]
    fn mock_records_prompts() {
        let llm = MockLlm::new(vec!["x".to_string(), "y".to_string()]);
        llm.generate("first prompt").unwrap();
        llm.generate("second prompt").unwrap();
        assert_eq!(llm.prompts(), vec!["first prompt", "second prompt"]);
    }
}
