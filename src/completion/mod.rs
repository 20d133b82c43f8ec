//! Chat-completion providers used to turn a filled prompt into an answer.
//!
//! Both adapters issue plain HTTP requests and pin the sampling temperature to zero so repeated
//! questions over the same context produce the same answer.

use crate::config::{Config, Provider};
use crate::embedding::provider_http_client;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// Errors surfaced while requesting a completion.
#[derive(Debug, Error)]
pub enum ChatClientError {
    /// Provider was unreachable or missing credentials.
    #[error("Chat provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate completion: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Request payload passed to the chat provider.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Fully rendered prompt sent as a single user message.
    pub prompt: String,
    /// Sampling temperature.
    pub temperature: f32,
}

impl ChatRequest {
    /// Build a deterministic (temperature 0) request for the given prompt.
    pub fn deterministic(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            temperature: 0.0,
        }
    }
}

/// Interface implemented by chat-completion providers.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Generate the assistant reply for the request.
    async fn complete(&self, request: ChatRequest) -> Result<String, ChatClientError>;
}

/// Chat client for the OpenAI `/chat/completions` API.
pub struct OpenAiChatClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiChatClient {
    /// Construct a client for an OpenAI-compatible endpoint.
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ChatClient for OpenAiChatClient {
    async fn complete(&self, request: ChatRequest) -> Result<String, ChatClientError> {
        let payload = json!({
            "model": self.model,
            "temperature": request.temperature,
            "messages": [
                { "role": "user", "content": request.prompt }
            ]
        });

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                ChatClientError::ProviderUnavailable(format!(
                    "failed to reach {}: {error}",
                    self.endpoint()
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatClientError::GenerationFailed(format!(
                "OpenAI returned {status}: {body}"
            )));
        }

        let body: OpenAiChatResponse = response.json().await.map_err(|error| {
            ChatClientError::InvalidResponse(format!("failed to decode OpenAI response: {error}"))
        })?;

        let content = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ChatClientError::InvalidResponse("response had no choices".into()))?
            .message
            .content
            .unwrap_or_default();

        Ok(content.trim().to_string())
    }
}

/// Chat client for the Ollama `/api/chat` endpoint.
pub struct OllamaChatClient {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaChatClient {
    /// Construct a client for an Ollama runtime.
    pub fn new(http: Client, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
    done: bool,
}

#[async_trait]
impl ChatClient for OllamaChatClient {
    async fn complete(&self, request: ChatRequest) -> Result<String, ChatClientError> {
        let payload = json!({
            "model": self.model,
            "messages": [
                { "role": "user", "content": request.prompt }
            ],
            "stream": false,
            "options": {
                "temperature": request.temperature,
            }
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                ChatClientError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ChatClientError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatClientError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaChatResponse = response.json().await.map_err(|error| {
            ChatClientError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;

        if !body.done {
            return Err(ChatClientError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.message.content.unwrap_or_default().trim().to_string())
    }
}

/// Build a chat client based on configuration.
pub fn get_chat_client(config: &Config) -> Result<Box<dyn ChatClient>, ChatClientError> {
    let http = provider_http_client(config.provider_timeout_secs, "docqa/chat")
        .map_err(|error| ChatClientError::ProviderUnavailable(error.to_string()))?;
    match config.chat_provider {
        Provider::OpenAI => {
            let api_key = config.openai_api_key.clone().ok_or_else(|| {
                ChatClientError::ProviderUnavailable("OPENAI_API_KEY is not set".into())
            })?;
            Ok(Box::new(OpenAiChatClient::new(
                http,
                config.openai_base_url.clone(),
                api_key,
                config.chat_model.clone(),
            )))
        }
        Provider::Ollama => Ok(Box::new(OllamaChatClient::new(
            http,
            config.ollama_url.clone(),
            config.chat_model.clone(),
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn http() -> Client {
        Client::builder()
            .user_agent("docqa-test")
            .build()
            .expect("client")
    }

    #[tokio::test]
    async fn openai_client_sends_zero_temperature() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .json_body_partial(r#"{"model": "gpt-4o-mini", "temperature": 0.0}"#);
                then.status(200).json_body(json!({
                    "choices": [
                        { "message": { "role": "assistant", "content": "  Paris.\n" } }
                    ]
                }));
            })
            .await;

        let client = OpenAiChatClient::new(http(), server.base_url(), "sk", "gpt-4o-mini");
        let answer = client
            .complete(ChatRequest::deterministic("Capital of France?"))
            .await
            .expect("answer");

        mock.assert();
        assert_eq!(answer, "Paris.");
    }

    #[tokio::test]
    async fn openai_client_rejects_empty_choices() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).json_body(json!({ "choices": [] }));
            })
            .await;

        let client = OpenAiChatClient::new(http(), server.base_url(), "sk", "gpt-4o-mini");
        let error = client
            .complete(ChatRequest::deterministic("?"))
            .await
            .expect_err("no choices");
        assert!(matches!(error, ChatClientError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn ollama_client_handles_successful_response() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat");
                then.status(200).json_body(json!({
                    "message": { "role": "assistant", "content": "Answer text" },
                    "done": true
                }));
            })
            .await;

        let client = OllamaChatClient::new(http(), server.base_url(), "llama3.1");
        let answer = client
            .complete(ChatRequest::deterministic("Question"))
            .await
            .expect("answer");

        mock.assert();
        assert_eq!(answer, "Answer text");
    }

    #[tokio::test]
    async fn ollama_client_handles_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat");
                then.status(500).body("boom");
            })
            .await;

        let client = OllamaChatClient::new(http(), server.base_url(), "llama3.1");
        let error = client
            .complete(ChatRequest::deterministic("Question"))
            .await
            .expect_err("error response");

        assert!(
            matches!(&error, ChatClientError::GenerationFailed(message) if message.contains("500"))
        );
    }
}
