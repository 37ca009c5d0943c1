//! OpenAI-compatible embeddings client.

use super::Embedder;
use super::client::{api_failure, http_client};
use crate::config::LlmConfig;
use crate::error::{RagError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    encoding_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

/// Client for `POST {api_base}/embeddings`.
///
/// Shares base URL, API key and timeout with the chat client; only the
/// model name differs.
#[derive(Clone)]
pub struct EmbeddingClient {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl EmbeddingClient {
    pub fn new(llm: &LlmConfig, model: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client(llm.timeout_secs)?,
            api_base: llm.api_base.clone(),
            api_key: llm.api_key.clone(),
            model: model.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.api_base.trim_end_matches('/'))
    }

    /// Decode a response body, restoring input order when indices are given.
    fn parse_response(body: &str, expected: usize) -> Result<Vec<Vec<f32>>> {
        let mut response: EmbeddingResponse = serde_json::from_str(body)?;

        if response.data.len() != expected {
            return Err(RagError::Service(format!(
                "expected {} embeddings, got {}",
                expected,
                response.data.len()
            )));
        }

        if response.data.iter().all(|d| d.index.is_some()) {
            response.data.sort_by_key(|d| d.index);
        }

        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(model = %self.model, batch_size = texts.len(), "embedding batch");

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
            encoding_format: "float",
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(api_failure(status, &body));
        }

        Self::parse_response(&body, texts.len())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint() {
        let llm = LlmConfig {
            api_base: "https://api.openai.com/v1/".to_string(),
            ..Default::default()
        };
        let client = EmbeddingClient::new(&llm, "text-embedding-ada-002").unwrap();
        assert_eq!(client.endpoint(), "https://api.openai.com/v1/embeddings");
        assert_eq!(client.model_name(), "text-embedding-ada-002");
    }

    #[test]
    fn test_parse_response_restores_order() {
        let body = r#"{"data": [
            {"embedding": [0.0, 1.0], "index": 1},
            {"embedding": [1.0, 0.0], "index": 0}
        ]}"#;
        let vectors = EmbeddingClient::parse_response(body, 2).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_response_count_mismatch() {
        let body = r#"{"data": [{"embedding": [0.5]}]}"#;
        assert!(EmbeddingClient::parse_response(body, 2).is_err());
    }
}
