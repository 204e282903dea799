#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

/// End-to-end tests: HTTP routes, embedding queue and answers backed by a mocked Ollama
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use cofounder::api::{self, AppState};
use cofounder::commands::{Runtime, build_runtime};
use cofounder::config::{Config, OllamaConfig};
use cofounder::indexer::ConsistencyValidator;
use cofounder::rag::FALLBACK_CONTEXT;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DIMENSION: u32 = 64;

async fn mock_ollama(answer: &str) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"embeddings": [vec![0.25_f32; DIMENSION as usize]]})),
        )
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama3.2:latest",
            "response": answer,
            "done": true
        })))
        .mount(&server)
        .await;

    server
}

async fn create_runtime(server: &MockServer) -> (Runtime, Router, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ollama: OllamaConfig {
            host: "127.0.0.1".to_string(),
            port: server.address().port(),
            embedding_dimension: DIMENSION,
            ..OllamaConfig::default()
        },
        ..Config::default()
    };
    config.validate().expect("test config is valid");

    let runtime = build_runtime(config).await.expect("should build runtime");
    let state = AppState {
        database: runtime.database.clone(),
        queue: runtime.queue.clone(),
        cofounder: runtime.cofounder.clone(),
    };
    let router = api::router(state, &runtime.config.server);

    (runtime, router, temp_dir)
}

async fn send(router: &Router, method: Method, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("valid request");

    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router responds");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("can read body");
    (status, serde_json::from_slice(&bytes).expect("body is json"))
}

async fn generate_prompts(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|request| request.url.path() == "/api/generate")
        .map(|request| {
            let body: Value = serde_json::from_slice(&request.body).expect("json request");
            body["prompt"].as_str().unwrap_or_default().to_string()
        })
        .collect()
}

async fn create_space(router: &Router, name: &str) -> String {
    let (status, space) = send(
        router,
        Method::POST,
        "/api/spaces",
        json!({"name": name, "userId": "founder"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    space["id"].as_str().expect("space id").to_string()
}

#[tokio::test]
async fn team_history_reaches_the_answer() {
    let server = mock_ollama("You plan to launch in Q4.").await;
    let (runtime, router, _temp_dir) = create_runtime(&server).await;
    let space_id = create_space(&router, "Acme").await;

    let (status, _) = send(
        &router,
        Method::POST,
        "/api/documents",
        json!({"spaceId": space_id, "title": "Roadmap", "summary": "Launch by Q4"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &router,
        Method::POST,
        "/api/tasks",
        json!({"spaceId": space_id, "title": "Ship MVP"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let stats = runtime
        .indexer
        .process_pending()
        .await
        .expect("should index jobs");
    assert_eq!(stats.embeddings_stored, 2);
    assert_eq!(stats.jobs_failed, 0);

    let (status, body) = send(
        &router,
        Method::POST,
        "/api/ai/chat",
        json!({"spaceId": space_id, "query": "When do we launch?"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], "You plan to launch in Q4.");
    assert_eq!(body["context"].as_array().map(Vec::len), Some(2));

    let prompts = generate_prompts(&server).await;
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("DOCUMENTS:\n- ["));
    assert!(prompts[0].contains("Document: Roadmap | Summary: Launch by Q4"));
    assert!(prompts[0].contains("TASKS:\n- ["));
    assert!(prompts[0].contains("USER QUERY:\nWhen do we launch?"));
}

#[tokio::test]
async fn spaces_never_see_each_others_history() {
    let server = mock_ollama("I don't have enough history yet.").await;
    let (runtime, router, _temp_dir) = create_runtime(&server).await;
    let acme = create_space(&router, "Acme").await;
    let globex = create_space(&router, "Globex").await;

    send(
        &router,
        Method::POST,
        "/api/messages",
        json!({"spaceId": acme, "userId": "founder", "content": "We need a React developer"}),
    )
    .await;
    runtime
        .indexer
        .process_pending()
        .await
        .expect("should index jobs");

    // Every vector is identical, so only the space filter keeps rows apart
    let (status, results) = send(
        &router,
        Method::POST,
        "/api/ai/search",
        json!({"spaceId": globex, "query": "Who should we hire?"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(results, json!([]));

    let (status, body) = send(
        &router,
        Method::POST,
        "/api/ai/chat",
        json!({"spaceId": globex, "query": "Who should we hire?"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["context"], json!([]));

    let prompts = generate_prompts(&server).await;
    assert!(prompts[0].contains(FALLBACK_CONTEXT));
    assert!(!prompts[0].contains("React developer"));
}

#[tokio::test]
async fn indexed_sources_are_consistent() {
    let server = mock_ollama("ok").await;
    let (runtime, router, _temp_dir) = create_runtime(&server).await;
    let space_id = create_space(&router, "Acme").await;

    send(
        &router,
        Method::POST,
        "/api/journal",
        json!({"spaceId": space_id, "userId": "founder", "title": "Week 1", "content": "Interviewed users"}),
    )
    .await;

    let validator =
        ConsistencyValidator::new(&runtime.database, &runtime.vector_store, &runtime.queue);

    // Queued work is in flight, not missing
    let report = validator
        .validate_consistency()
        .await
        .expect("should validate");
    assert!(report.is_consistent, "{}", report.summary());

    runtime
        .indexer
        .process_pending()
        .await
        .expect("should index jobs");

    let report = validator
        .validate_consistency()
        .await
        .expect("should validate");
    assert!(report.is_consistent, "{}", report.summary());
    assert_eq!(report.sqlite_sources, 1);
    assert_eq!(report.lancedb_embeddings, 1);

    let (status, stats) = send(&router, Method::GET, "/api/ai/indexing", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["completedCount"], 1);
    assert_eq!(stats["pendingCount"], 0);
}
