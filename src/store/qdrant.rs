//! Qdrant-backed indexes: every opened index is its own throwaway collection.

use super::{IndexedChunk, ScoredChunk, VectorIndex, VectorStore, VectorStoreError};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use uuid::Uuid;

const COLLECTION_PREFIX: &str = "docqa";

/// Lightweight HTTP client for the Qdrant REST API.
pub struct QdrantService {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl QdrantService {
    /// Construct a client for the Qdrant instance at `url` on top of `client`.
    ///
    /// Timeouts and user agent come from `client`.
    pub fn new(
        client: Client,
        url: &str,
        api_key: Option<String>,
    ) -> Result<Self, VectorStoreError> {
        let base_url = normalize_base_url(url).map_err(VectorStoreError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_api_key = api_key.as_deref().is_some_and(|value| !value.is_empty()),
            "Initialized Qdrant HTTP client"
        );
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Create a collection with cosine distance and the given vector size.
    pub async fn create_collection(
        &self,
        collection_name: &str,
        vector_size: u64,
    ) -> Result<(), VectorStoreError> {
        let body = json!({
            "vectors": {
                "size": vector_size,
                "distance": "Cosine"
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{collection_name}"))
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(
                collection = collection_name,
                vector_size,
                "Collection created"
            );
        })
        .await
    }

    /// Delete a collection and all of its points.
    pub async fn delete_collection(&self, collection_name: &str) -> Result<(), VectorStoreError> {
        let response = self
            .request(Method::DELETE, &format!("collections/{collection_name}"))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(collection = collection_name, "Collection already absent");
            return Ok(());
        }

        self.ensure_success(response, || {
            tracing::debug!(collection = collection_name, "Collection deleted");
        })
        .await
    }

    /// Upload chunks as points, waiting until they are searchable.
    pub async fn upsert_points(
        &self,
        collection_name: &str,
        chunks: Vec<IndexedChunk>,
    ) -> Result<usize, VectorStoreError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let serialized: Vec<_> = chunks
            .into_iter()
            .map(|chunk| {
                json!({
                    "id": Uuid::new_v4().to_string(),
                    "vector": chunk.vector,
                    "payload": {
                        "text": chunk.text,
                        "chunk_hash": chunk.chunk_hash,
                    },
                })
            })
            .collect();

        let point_count = serialized.len();
        let response = self
            .request(Method::PUT, &format!("collections/{collection_name}/points"))
            .query(&[("wait", true)])
            .json(&json!({ "points": serialized }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(
                collection = collection_name,
                points = point_count,
                "Points indexed"
            );
        })
        .await?;

        Ok(point_count)
    }

    /// Perform a similarity query, returning the scored chunk texts.
    pub async fn search_points(
        &self,
        collection_name: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, VectorStoreError> {
        let body = json!({
            "query": vector,
            "limit": limit,
            "with_payload": ["text"],
        });

        let response = self
            .request(
                Method::POST,
                &format!("collections/{collection_name}/points/query"),
            )
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = VectorStoreError::UnexpectedStatus { status, body };
            tracing::error!(collection = collection_name, error = %error, "Qdrant search failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };

        Ok(points
            .into_iter()
            .filter_map(|point| {
                let text = match point.payload?.remove("text")? {
                    Value::String(text) => text,
                    _ => return None,
                };
                Some(ScoredChunk {
                    text,
                    score: point.score,
                })
            })
            .collect())
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), VectorStoreError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = VectorStoreError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Qdrant request failed");
            Err(error)
        }
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    result: QueryResponseResult,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QueryResponseResult {
    Points(Vec<QueryPoint>),
    Object { points: Vec<QueryPoint> },
}

#[derive(Debug, Deserialize)]
struct QueryPoint {
    score: f32,
    #[serde(default)]
    payload: Option<Map<String, Value>>,
}

/// Opens one fresh Qdrant collection per index.
pub struct QdrantStore {
    service: Arc<QdrantService>,
}

impl QdrantStore {
    /// Wrap a Qdrant client.
    pub fn new(service: Arc<QdrantService>) -> Self {
        Self { service }
    }

    /// Create a uniquely named collection and return the index backed by it.
    pub async fn open(&self, dimension: usize) -> Result<QdrantIndex, VectorStoreError> {
        if dimension == 0 {
            return Err(VectorStoreError::InvalidDimension);
        }
        let collection = format!("{COLLECTION_PREFIX}-{}", Uuid::new_v4().simple());
        self.service
            .create_collection(&collection, dimension as u64)
            .await?;
        Ok(QdrantIndex {
            service: Arc::clone(&self.service),
            collection,
            dimension,
        })
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn open_index(
        &self,
        dimension: usize,
    ) -> Result<Box<dyn VectorIndex>, VectorStoreError> {
        Ok(Box::new(self.open(dimension).await?))
    }
}

/// Index stored in a dedicated Qdrant collection.
pub struct QdrantIndex {
    service: Arc<QdrantService>,
    collection: String,
    dimension: usize,
}

impl QdrantIndex {
    /// Name of the backing collection.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn check_dimension(&self, actual: usize) -> Result<(), VectorStoreError> {
        if actual == self.dimension {
            Ok(())
        } else {
            Err(VectorStoreError::DimensionMismatch {
                expected: self.dimension,
                actual,
            })
        }
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn insert(&self, chunks: Vec<IndexedChunk>) -> Result<usize, VectorStoreError> {
        for chunk in &chunks {
            self.check_dimension(chunk.vector.len())?;
        }
        self.service.upsert_points(&self.collection, chunks).await
    }

    async fn search(
        &self,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, VectorStoreError> {
        self.check_dimension(vector.len())?;
        if k == 0 {
            return Ok(Vec::new());
        }
        self.service.search_points(&self.collection, vector, k).await
    }

    async fn release(&self) -> Result<(), VectorStoreError> {
        self.service.delete_collection(&self.collection).await
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::provider_http_client;
    use httpmock::{
        Method::{DELETE, POST, PUT},
        MockServer,
    };

    fn service(server: &MockServer) -> Arc<QdrantService> {
        Arc::new(
            QdrantService::new(Client::new(), &server.base_url(), Some("secret".into()))
                .expect("client"),
        )
    }

    #[tokio::test]
    async fn index_lifecycle_uses_dedicated_collection() {
        let server = MockServer::start_async().await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path_contains("/collections/docqa-")
                    .header("api-key", "secret")
                    .json_body_partial(r#"{"vectors": {"size": 2, "distance": "Cosine"}}"#);
                then.status(200).json_body(json!({ "status": "ok", "result": true }));
            })
            .await;
        let upsert = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path_contains("/points")
                    .query_param("wait", "true");
                then.status(200).json_body(json!({
                    "status": "ok",
                    "result": { "operation_id": 1, "status": "completed" }
                }));
            })
            .await;
        let query = server
            .mock_async(|when, then| {
                when.method(POST).path_contains("/points/query");
                then.status(200).json_body(json!({
                    "status": "ok",
                    "result": {
                        "points": [
                            { "id": "a", "score": 0.9, "payload": { "text": "alpha" } },
                            { "id": "b", "score": 0.4, "payload": {} }
                        ]
                    }
                }));
            })
            .await;
        let delete = server
            .mock_async(|when, then| {
                when.method(DELETE).path_contains("/collections/docqa-");
                then.status(200).json_body(json!({ "status": "ok", "result": true }));
            })
            .await;

        let store = QdrantStore::new(service(&server));
        let index = store.open(2).await.expect("open index");
        assert!(index.collection().starts_with("docqa-"));
        let other = store.open(2).await.expect("second index");
        assert_ne!(index.collection(), other.collection());
        let inserted = index
            .insert(vec![IndexedChunk {
                text: "alpha".into(),
                chunk_hash: "hash".into(),
                vector: vec![1.0, 0.0],
            }])
            .await
            .expect("insert");
        let hits = index.search(&[1.0, 0.0], 3).await.expect("search");
        index.release().await.expect("release");

        create.assert_hits(2);
        upsert.assert();
        query.assert();
        delete.assert();
        assert_eq!(inserted, 1);
        assert_eq!(
            hits,
            vec![ScoredChunk {
                text: "alpha".into(),
                score: 0.9
            }]
        );
    }

    #[tokio::test]
    async fn stalled_server_hits_client_timeout() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/slow");
                then.status(200)
                    .delay(std::time::Duration::from_secs(5))
                    .json_body(json!({ "status": "ok", "result": true }));
            })
            .await;

        let http = provider_http_client(1, "docqa/qdrant").expect("http client");
        let service = QdrantService::new(http, &server.base_url(), None).expect("client");
        let error = service
            .create_collection("slow", 4)
            .await
            .expect_err("request should time out");
        assert!(matches!(&error, VectorStoreError::Http(source) if source.is_timeout()));
    }

    #[tokio::test]
    async fn search_surfaces_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/demo/points/query");
                then.status(404).body("Not found: Collection `demo` doesn't exist!");
            })
            .await;

        let error = service(&server)
            .search_points("demo", &[0.1, 0.2], 3)
            .await
            .expect_err("missing collection");
        assert!(matches!(
            error,
            VectorStoreError::UnexpectedStatus { status, .. } if status == StatusCode::NOT_FOUND
        ));
    }

    #[tokio::test]
    async fn deleting_missing_collection_is_not_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(DELETE).path("/collections/gone");
                then.status(404).body("missing");
            })
            .await;

        service(&server)
            .delete_collection("gone")
            .await
            .expect("404 tolerated");
    }

    #[test]
    fn rejects_invalid_urls() {
        assert!(matches!(
            QdrantService::new(Client::new(), "not a url", None),
            Err(VectorStoreError::InvalidUrl(_))
        ));
    }
}
