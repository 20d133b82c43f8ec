use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use docqa::{api, config::Config, qa::QaService};
use httpmock::{Method::POST, MockServer};
use serde_json::{Value, json};
use tower::ServiceExt;

fn config_for(server: &MockServer) -> Config {
    let vars: HashMap<&str, String> = HashMap::from([
        ("OPENAI_API_KEY", "test-key".to_string()),
        ("OPENAI_BASE_URL", server.url("/v1")),
        ("CHAT_MODEL", "gpt-test".to_string()),
        ("EMBEDDING_MODEL", "embed-test".to_string()),
        ("TEXT_SPLITTER_CHUNK_SIZE", "2000".to_string()),
        ("TEXT_SPLITTER_CHUNK_OVERLAP", "0".to_string()),
        ("PROVIDER_TIMEOUT_SECS", "5".to_string()),
    ]);
    Config::from_source(|key| vars.get(key).cloned()).expect("config")
}

async fn mock_openai(server: &MockServer) {
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/embeddings")
                .header("authorization", "Bearer test-key")
                .body_contains("embed-test");
            then.status(200).json_body(json!({
                "data": [{ "index": 0, "embedding": [0.1, 0.2, 0.3] }]
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .body_contains("gpt-test")
                .body_contains("Context: Ada Lovelace wrote the first program.")
                .body_contains("Question: Who wrote the first program?");
            then.status(200).json_body(json!({
                "choices": [{ "message": { "role": "assistant", "content": "Ada Lovelace." } }]
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .body_contains("Question: Broken question?");
            then.status(500).body("upstream exploded");
        })
        .await;
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.expect("router response");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    (status, serde_json::from_slice(&body).expect("json body"))
}

#[tokio::test]
async fn batch_request_runs_full_pipeline() {
    let server = MockServer::start_async().await;
    mock_openai(&server).await;
    let config = config_for(&server);
    let service = Arc::new(QaService::from_config(&config).expect("service"));
    let app = api::create_router(Arc::clone(&service), config.max_upload_bytes);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/qa/batch")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "questions": ["Who wrote the first program?", "Broken question?"],
                "document_text": "Ada Lovelace wrote the first program."
            })
            .to_string(),
        ))
        .expect("request");

    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"]["Who wrote the first program?"], "Ada Lovelace.");
    let failure = body["errors"]["Broken question?"]
        .as_str()
        .expect("failure message");
    assert!(failure.contains("upstream exploded"));
    assert!(
        body["results"]["Broken question?"]
            .as_str()
            .is_some_and(|text| text.starts_with("Error processing question: "))
    );

    let snapshot = service.metrics_snapshot();
    assert_eq!(snapshot.documents_loaded, 1);
    assert_eq!(snapshot.chunks_indexed, 1);
    assert_eq!(snapshot.questions_answered, 1);
    assert_eq!(snapshot.questions_failed, 1);
}

#[tokio::test]
async fn multipart_upload_runs_full_pipeline() {
    let server = MockServer::start_async().await;
    mock_openai(&server).await;
    let config = config_for(&server);
    let service = Arc::new(QaService::from_config(&config).expect("service"));
    let app = api::create_router(service, config.max_upload_bytes);

    let boundary = "pipeline-boundary";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"questions_file\"; filename=\"questions.json\"\r\n\
         Content-Type: application/json\r\n\r\n\
         {{\"questions\": [\"Who wrote the first program?\"]}}\r\n\
         --{boundary}\r\n\
         Content-Disposition: form-data; name=\"document_file\"; filename=\"document.json\"\r\n\
         Content-Type: application/json\r\n\r\n\
         \"Ada Lovelace wrote the first program.\"\r\n\
         --{boundary}--\r\n"
    );
    let request = Request::builder()
        .method(Method::POST)
        .uri("/qa")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .expect("request");

    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "results": { "Who wrote the first program?": "Ada Lovelace." } })
    );
}

#[tokio::test]
async fn embedding_outage_is_a_server_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/embeddings");
            then.status(503).body("maintenance");
        })
        .await;
    let config = config_for(&server);
    let service = Arc::new(QaService::from_config(&config).expect("service"));
    let app = api::create_router(service, config.max_upload_bytes);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/qa/batch")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "questions": ["Anything?"], "document_text": "Some text." }).to_string(),
        ))
        .expect("request");

    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(
        body["detail"]
            .as_str()
            .is_some_and(|detail| detail.starts_with("Error processing: ")
                && detail.contains("maintenance"))
    );
}
