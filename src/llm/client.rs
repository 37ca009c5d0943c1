//! OpenAI-compatible chat completion client.
//!
//! Works with any endpoint exposing `POST {api_base}/chat/completions`,
//! including OpenAI itself, DashScope's compatible mode and local gateways.

use super::ChatModel;
use crate::config::LlmConfig;
use crate::error::{RagError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Sampling temperature for every request; answers and judge scores must be repeatable.
const TEMPERATURE: f32 = 0.0;

/// Message role in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// A message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Request body for chat completion.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

/// Response from chat completion.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// OpenAI API error response.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiError {
    pub(crate) error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorDetail {
    pub(crate) message: String,
}

/// Turn a non-success response body into a service error.
pub(crate) fn api_failure(status: reqwest::StatusCode, body: &str) -> RagError {
    if let Ok(api_error) = serde_json::from_str::<ApiError>(body) {
        return RagError::Service(format!("API error ({}): {}", status, api_error.error.message));
    }
    RagError::Service(format!("Request failed ({}): {}", status, body))
}

/// Build an HTTP client honouring the configured timeout.
pub(crate) fn http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| RagError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Response from an LLM call including metadata.
#[derive(Debug)]
pub struct LlmResponse {
    /// The generated content.
    pub content: String,
    /// Reason the model stopped generating.
    pub finish_reason: Option<String>,
    /// Token usage (if available).
    pub usage: Option<TokenUsage>,
}

#[derive(Debug)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// OpenAI-compatible chat client.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    config: LlmConfig,
}

impl LlmClient {
    /// Create a new chat client with the given configuration.
    pub fn new(config: LlmConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            config,
        })
    }

    /// Model name requests are sent with.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Get the API endpoint URL.
    fn endpoint(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        format!("{}/chat/completions", base)
    }

    fn request(&self, messages: Vec<Message>) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens: Some(self.config.max_tokens),
            temperature: Some(TEMPERATURE),
            stream: false,
        }
    }

    /// Send a chat completion request. Non-streaming, no retry.
    pub async fn chat(&self, messages: Vec<Message>) -> Result<LlmResponse> {
        let request = self.request(messages);

        debug!(model = %self.config.model, messages = request.messages.len(), "chat completion request");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(api_failure(status, &body));
        }

        Self::parse_completion(&body)
    }

    fn parse_completion(body: &str) -> Result<LlmResponse> {
        let completion: ChatCompletionResponse = serde_json::from_str(body)?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Service("No choices in response".to_string()))?;

        Ok(LlmResponse {
            content: choice.message.content.unwrap_or_default(),
            finish_reason: choice.finish_reason,
            usage: completion.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
        })
    }

    /// Convenience method: single user message with optional system prompt.
    pub async fn complete(&self, system: Option<&str>, user: &str) -> Result<String> {
        let mut messages = Vec::new();

        if let Some(sys) = system {
            messages.push(Message::system(sys));
        }
        messages.push(Message::user(user));

        let response = self.chat(messages).await?;
        Ok(response.content)
    }

    /// Test connectivity to the API.
    pub async fn test_connection(&self) -> Result<String> {
        let messages = vec![Message::user("Say 'hello' and nothing else.")];

        let response = self.chat(messages).await?;

        if response.content.to_lowercase().contains("hello") {
            Ok(response.content)
        } else {
            Err(RagError::Service(format!(
                "Unexpected response: {}",
                response.content
            )))
        }
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn invoke(&self, prompt: &str) -> Result<String> {
        self.complete(None, prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_for(api_base: &str) -> LlmClient {
        let config = LlmConfig {
            api_base: api_base.to_string(),
            api_key: "test".to_string(),
            model: "gpt-4".to_string(),
            ..Default::default()
        };
        LlmClient::new(config).unwrap()
    }

    #[test]
    fn test_message_creation() {
        let sys = Message::system("You are helpful.");
        let user = Message::user("Hello!");

        assert!(matches!(sys.role, Role::System));
        assert!(matches!(user.role, Role::User));
    }

    #[test]
    fn test_endpoint_construction() {
        let client = client_for("https://api.example.com/v1/");
        assert_eq!(client.endpoint(), "https://api.example.com/v1/chat/completions");

        // Without trailing slash
        let client2 = client_for("https://dashscope.aliyuncs.com/compatible-mode/v1");
        assert_eq!(
            client2.endpoint(),
            "https://dashscope.aliyuncs.com/compatible-mode/v1/chat/completions"
        );
    }

    #[test]
    fn test_request_serialization() {
        let request = ChatCompletionRequest {
            model: "qwen-plus".to_string(),
            messages: vec![Message::user("你好")],
            max_tokens: None,
            temperature: Some(0.0),
            stream: false,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "你好");
        assert_eq!(json["temperature"], 0.0);
        assert_eq!(json["stream"], false);
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn test_requests_use_zero_temperature() {
        let client = client_for("https://api.example.com/v1");
        let json = serde_json::to_value(client.request(vec![Message::user("q")])).unwrap();
        assert_eq!(json["temperature"], 0.0);
        assert_eq!(json["model"], "gpt-4");
        assert_eq!(json["max_tokens"], 2048);
    }

    #[test]
    fn test_parse_completion() {
        let body = r#"{
            "choices": [{"message": {"role": "assistant", "content": "0.8"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 1, "total_tokens": 11}
        }"#;
        let response = LlmClient::parse_completion(body).unwrap();
        assert_eq!(response.content, "0.8");
        assert_eq!(response.finish_reason.as_deref(), Some("stop"));
        assert_eq!(response.usage.unwrap().total_tokens, 11);
    }

    #[test]
    fn test_parse_completion_without_choices() {
        let err = LlmClient::parse_completion(r#"{"choices": []}"#).unwrap_err();
        assert!(matches!(err, RagError::Service(_)));

        let err = LlmClient::parse_completion("<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, RagError::Service(_)));
    }

    #[test]
    fn test_api_failure_message() {
        let body = r#"{"error": {"message": "Invalid API key", "type": "auth"}}"#;
        let err = api_failure(reqwest::StatusCode::UNAUTHORIZED, body);
        assert!(err.to_string().contains("Invalid API key"));

        let err = api_failure(reqwest::StatusCode::BAD_GATEWAY, "upstream down");
        assert!(err.to_string().contains("upstream down"));
    }
}
