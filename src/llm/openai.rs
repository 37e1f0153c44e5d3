//! OpenAI chat-completions client.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Base URL for the OpenAI API.
pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Default model for summarization/classification. Cost-effective and good
/// enough for short structured outputs.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Trait for services that can turn a prompt into JSON-formatted text.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generates a JSON-formatted response for the given prompt.
    ///
    /// Returns the raw response text; the caller owns JSON parsing so it can
    /// apply its own defaults and per-item failure handling.
    async fn generate_json(&self, model: &str, prompt: &str) -> Result<String, LlmError>;
}

/// Client for the OpenAI chat-completions endpoint.
pub struct OpenAiClient {
    api_base: String,
    api_key: String,
    http_client: Client,
}

impl OpenAiClient {
    /// Creates a new client with an explicit API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_base: OPENAI_API_BASE.to_string(),
            api_key: api_key.into(),
            http_client: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    /// Creates a client from the `OPENAI_API_KEY` environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::MissingApiKey`] if the variable is not set.
    pub fn from_env() -> Result<Self, LlmError> {
        let api_key = env::var("OPENAI_API_KEY").map_err(|_| LlmError::MissingApiKey)?;
        Ok(Self::new(api_key))
    }

    /// Overrides the API base URL (for proxies and tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Get the API base URL.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }
}

/// Request structure for the chat-completions API.
#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    response_format: ResponseFormat,
}

/// A chat message.
#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

/// Response-format hint forcing a JSON object.
#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

/// Response structure from the chat-completions API.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

/// Error response from the API.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[async_trait]
impl LlmProvider for OpenAiClient {
    async fn generate_json(&self, model: &str, prompt: &str) -> Result<String, LlmError> {
        let api_request = ApiRequest {
            model: model.to_string(),
            messages: vec![ApiMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let url = format!("{}/chat/completions", self.api_base);

        let http_response = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&api_request)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = http_response.status();

        if !status.is_success() {
            let status_code = status.as_u16();
            let error_text = http_response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());

            if let Ok(error_response) = serde_json::from_str::<ApiErrorResponse>(&error_text) {
                return Err(LlmError::ApiError {
                    code: status_code,
                    message: error_response.error.message,
                });
            }

            return Err(LlmError::ApiError {
                code: status_code,
                message: error_text,
            });
        }

        let api_response: ApiResponse = http_response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(format!("Failed to parse API response: {e}")))?;

        let content = api_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| LlmError::ParseError("response contained no choices".to_string()))?;

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_from_explicit_key() {
        let client = OpenAiClient::new("sk-test");
        assert_eq!(client.api_base(), OPENAI_API_BASE);
    }

    #[test]
    fn test_with_api_base_override() {
        let client = OpenAiClient::new("sk-test").with_api_base("http://localhost:4000/v1");
        assert_eq!(client.api_base(), "http://localhost:4000/v1");
    }

    #[test]
    fn test_api_request_serializes_json_mode() {
        let request = ApiRequest {
            model: DEFAULT_MODEL.to_string(),
            messages: vec![ApiMessage {
                role: "user".to_string(),
                content: "hello".to_string(),
            }],
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let json = serde_json::to_string(&request).expect("serialization should succeed");
        assert!(json.contains("\"model\":\"gpt-4o-mini\""));
        assert!(json.contains("\"response_format\":{\"type\":\"json_object\"}"));
    }

    #[tokio::test]
    async fn test_generate_json_connection_error() {
        // A port with no listener should surface as RequestFailed.
        let client = OpenAiClient::new("sk-test").with_api_base("http://localhost:65535/v1");

        let result = client.generate_json(DEFAULT_MODEL, "test").await;
        assert!(matches!(result, Err(LlmError::RequestFailed(_))));
    }
}
