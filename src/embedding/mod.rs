use crate::config::{Config, Provider};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider could not be reached.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider response could not be decoded or did not match the request.
    #[error("Malformed embedding response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied chunk of text, in input order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Embedding client for the OpenAI `/embeddings` API.
pub struct OpenAiEmbeddingClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    batch_size: usize,
}

impl OpenAiEmbeddingClient {
    /// Construct a client for an OpenAI-compatible endpoint.
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        batch_size: usize,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            batch_size: batch_size.max(1),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url.trim_end_matches('/'))
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "input": batch }))
            .send()
            .await
            .map_err(|error| {
                EmbeddingClientError::ProviderUnavailable(format!(
                    "failed to reach {}: {error}",
                    self.endpoint()
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "OpenAI returned {status}: {body}"
            )));
        }

        let body: OpenAiEmbeddingResponse = response.json().await.map_err(|error| {
            EmbeddingClientError::InvalidResponse(format!(
                "failed to decode OpenAI response: {error}"
            ))
        })?;

        let mut data = body.data;
        data.sort_by_key(|item| item.index);
        let vectors: Vec<Vec<f32>> = data.into_iter().map(|item| item.embedding).collect();
        ensure_count(batch.len(), vectors)
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedding {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(
            model = %self.model,
            texts = texts.len(),
            batch_size = self.batch_size,
            "Generating OpenAI embeddings"
        );

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.embed_batch(batch).await?);
        }
        Ok(vectors)
    }
}

/// Embedding client for the Ollama `/api/embed` endpoint.
pub struct OllamaEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
    batch_size: usize,
}

impl OllamaEmbeddingClient {
    /// Construct a client for an Ollama runtime.
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        model: impl Into<String>,
        batch_size: usize,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            model: model.into(),
            batch_size: batch_size.max(1),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embed", self.base_url.trim_end_matches('/'))
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let response = self
            .http
            .post(self.endpoint())
            .json(&json!({ "model": self.model, "input": batch }))
            .send()
            .await
            .map_err(|error| {
                EmbeddingClientError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaEmbedResponse = response.json().await.map_err(|error| {
            EmbeddingClientError::InvalidResponse(format!(
                "failed to decode Ollama response: {error}"
            ))
        })?;
        ensure_count(batch.len(), body.embeddings)
    }
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(
            model = %self.model,
            texts = texts.len(),
            "Generating Ollama embeddings"
        );

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.embed_batch(batch).await?);
        }
        Ok(vectors)
    }
}

fn ensure_count(
    expected: usize,
    vectors: Vec<Vec<f32>>,
) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
    if vectors.len() != expected {
        return Err(EmbeddingClientError::InvalidResponse(format!(
            "expected {expected} vectors, got {}",
            vectors.len()
        )));
    }
    if vectors.iter().any(|vector| vector.is_empty()) {
        return Err(EmbeddingClientError::InvalidResponse(
            "provider returned an empty vector".into(),
        ));
    }
    Ok(vectors)
}

/// Shared HTTP client used by the provider adapters.
pub(crate) fn provider_http_client(
    timeout_secs: u64,
    agent: &str,
) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder().user_agent(agent);
    if timeout_secs > 0 {
        builder = builder.timeout(Duration::from_secs(timeout_secs));
    }
    builder.build()
}

/// Build an embedding client suitable for the current configuration.
pub fn get_embedding_client(
    config: &Config,
) -> Result<Box<dyn EmbeddingClient>, EmbeddingClientError> {
    let http = provider_http_client(config.provider_timeout_secs, "docqa/embeddings")
        .map_err(|error| EmbeddingClientError::ProviderUnavailable(error.to_string()))?;
    match config.embedding_provider {
        Provider::OpenAI => {
            let api_key = config.openai_api_key.clone().ok_or_else(|| {
                EmbeddingClientError::ProviderUnavailable("OPENAI_API_KEY is not set".into())
            })?;
            Ok(Box::new(OpenAiEmbeddingClient::new(
                http,
                config.openai_base_url.clone(),
                api_key,
                config.embedding_model.clone(),
                config.embedding_batch_size,
            )))
        }
        Provider::Ollama => Ok(Box::new(OllamaEmbeddingClient::new(
            http,
            config.ollama_url.clone(),
            config.embedding_model.clone(),
            config.embedding_batch_size,
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
    async fn openai_client_orders_vectors_by_index() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/embeddings")
                    .header("authorization", "Bearer sk-test");
                then.status(200).json_body(json!({
                    "data": [
                        { "index": 1, "embedding": [0.0, 1.0] },
                        { "index": 0, "embedding": [1.0, 0.0] }
                    ]
                }));
            })
            .await;

        let client = OpenAiEmbeddingClient::new(
            http(),
            format!("{}/v1", server.base_url()),
            "sk-test",
            "text-embedding-ada-002",
            16,
        );
        let vectors = client
            .generate_embeddings(vec!["first".into(), "second".into()])
            .await
            .expect("vectors");

        mock.assert();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn openai_client_splits_requests_into_batches() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(200).json_body(json!({
                    "data": [ { "index": 0, "embedding": [0.5] } ]
                }));
            })
            .await;

        let client = OpenAiEmbeddingClient::new(http(), server.base_url(), "sk", "m", 1);
        let vectors = client
            .generate_embeddings(vec!["a".into(), "b".into(), "c".into()])
            .await
            .expect("vectors");

        mock.assert_hits(3);
        assert_eq!(vectors.len(), 3);
    }

    #[tokio::test]
    async fn openai_client_surfaces_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(429).body("rate limited");
            })
            .await;

        let client = OpenAiEmbeddingClient::new(http(), server.base_url(), "sk", "m", 8);
        let error = client
            .generate_embeddings(vec!["a".into()])
            .await
            .expect_err("error status");

        assert!(
            matches!(&error, EmbeddingClientError::GenerationFailed(message) if message.contains("429"))
        );
    }

    #[tokio::test]
    async fn ollama_client_rejects_short_responses() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed");
                then.status(200).json_body(json!({ "embeddings": [[0.1, 0.2]] }));
            })
            .await;

        let client = OllamaEmbeddingClient::new(http(), server.base_url(), "nomic-embed-text", 8);
        let error = client
            .generate_embeddings(vec!["a".into(), "b".into()])
            .await
            .expect_err("count mismatch");

        assert!(matches!(error, EmbeddingClientError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn empty_input_skips_the_provider() {
        let client = OllamaEmbeddingClient::new(http(), "http://127.0.0.1:9", "m", 8);
        let vectors = client.generate_embeddings(Vec::new()).await.expect("empty");
        assert!(vectors.is_empty());
    }
}
