//! Vector store backends holding one isolated index per loaded document.

mod memory;
mod qdrant;

pub use memory::{InMemoryIndex, InMemoryStore};
pub use qdrant::{QdrantIndex, QdrantService, QdrantStore};

use crate::config::{Config, VectorStoreKind};
use crate::embedding::provider_http_client;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by vector store backends.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    /// Vector length does not match the index dimension.
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension the index was opened with.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },
    /// Index was opened with a zero dimension.
    #[error("index dimension must be greater than zero")]
    InvalidDimension,
    /// Backend URL failed to parse or normalize.
    #[error("Invalid vector store URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Backend responded with an unexpected status code.
    #[error("Unexpected vector store response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the backend.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

/// Chunk prepared for insertion: text, dedupe hash, and embedding.
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    /// Raw chunk text.
    pub text: String,
    /// Deterministic hash of the chunk text.
    pub chunk_hash: String,
    /// Embedding vector produced for the chunk.
    pub vector: Vec<f32>,
}

/// Chunk returned by a similarity query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    /// Stored chunk text.
    pub text: String,
    /// Cosine similarity to the query vector.
    pub score: f32,
}

/// A single document's chunk index.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert chunks, returning how many were stored.
    async fn insert(&self, chunks: Vec<IndexedChunk>) -> Result<usize, VectorStoreError>;

    /// Return up to `k` chunks ordered by descending similarity to `vector`.
    async fn search(
        &self,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, VectorStoreError>;

    /// Drop every stored chunk and free backend resources.
    async fn release(&self) -> Result<(), VectorStoreError>;
}

/// Factory for fresh, empty indexes.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Open a new index for vectors of the given dimension.
    async fn open_index(&self, dimension: usize)
    -> Result<Box<dyn VectorIndex>, VectorStoreError>;
}

/// Build the vector store selected by configuration.
pub fn get_vector_store(config: &Config) -> Result<Arc<dyn VectorStore>, VectorStoreError> {
    match config.vector_store {
        VectorStoreKind::Memory => Ok(Arc::new(InMemoryStore::new())),
        VectorStoreKind::Qdrant => {
            let url = config
                .qdrant_url
                .as_deref()
                .ok_or_else(|| VectorStoreError::InvalidUrl("QDRANT_URL is not set".into()))?;
            let http = provider_http_client(config.provider_timeout_secs, "docqa/qdrant")?;
            let service = QdrantService::new(http, url, config.qdrant_api_key.clone())?;
            Ok(Arc::new(QdrantStore::new(Arc::new(service))))
        }
    }
}
