use super::*;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use crate::config::RetrievalConfig;
use crate::database::lancedb::VectorStore;
use crate::indexer::{BackgroundIndexer, QueueConfig};
use crate::providers::{Embedder, Generator};
use crate::rag::RetrievalPipeline;
use crate::test_support::{KeywordEmbedder, ScriptedGenerator};

struct TestApp {
    router: Router,
    indexer: BackgroundIndexer,
    _temp_dir: TempDir,
}

async fn test_app(generator: Arc<dyn Generator>) -> TestApp {
    let temp_dir = TempDir::new().expect("can create temp dir");
    let database = Database::initialize_from_config_dir(temp_dir.path())
        .await
        .expect("can create database");
    let embedder = Arc::new(KeywordEmbedder);
    let vector_store = Arc::new(
        VectorStore::open(&temp_dir.path().join("vectors"), embedder.dimension())
            .await
            .expect("can open vector store"),
    );
    let pipeline = RetrievalPipeline::new(embedder, vector_store, 4000);
    let queue = EmbeddingQueue::new(database.pool().clone(), QueueConfig::default());
    let cofounder = CoFounder::new(pipeline.clone(), generator, &RetrievalConfig::default());

    let state = AppState {
        database,
        queue: queue.clone(),
        cofounder,
    };

    TestApp {
        router: router(state, &ServerConfig::default()),
        indexer: BackgroundIndexer::new(queue, pipeline),
        _temp_dir: temp_dir,
    }
}

async fn send(app: &TestApp, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("valid request");

    let response = app
        .router
        .clone()
        .oneshot(request)
        .await
        .expect("router responds");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("can read body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("body is json")
    };
    (status, value)
}

async fn create_space(app: &TestApp) -> Value {
    let (status, space) = send(
        app,
        Method::POST,
        "/api/spaces",
        Some(json!({"name": "Acme", "problemStatement": "Too many spreadsheets", "userId": "u1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    space
}

#[tokio::test]
async fn health_reports_ok() {
    let app = test_app(Arc::new(ScriptedGenerator::answering("ok"))).await;
    let (status, body) = send(&app, Method::GET, "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn chat_answers_from_indexed_content() {
    let generator = Arc::new(ScriptedGenerator::answering("You plan to launch in Q4."));
    let app = test_app(Arc::<ScriptedGenerator>::clone(&generator)).await;
    let space = create_space(&app).await;
    let space_id = space["id"].as_str().expect("space id");

    let (status, document) = send(
        &app,
        Method::POST,
        "/api/documents",
        Some(json!({"spaceId": space_id, "title": "Roadmap", "summary": "Launch by Q4"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, stats) = send(&app, Method::GET, "/api/ai/indexing", None).await;
    assert_eq!(stats["pendingCount"], 1);

    app.indexer.process_pending().await.expect("can index");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/ai/chat",
        Some(json!({"spaceId": space_id, "query": "When do we launch?"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], "You plan to launch in Q4.");
    assert_eq!(body["context"][0]["type"], "DOC");
    assert_eq!(body["context"][0]["sourceId"], document["id"]);
    assert_eq!(
        body["context"][0]["content"],
        "Document: Roadmap\nSummary: Launch by Q4"
    );
    assert!(body["context"][0]["createdAt"].is_string());
    assert!(generator.prompts()[0].contains("DOCUMENTS:"));

    let (status, results) = send(
        &app,
        Method::POST,
        "/api/ai/search",
        Some(json!({"spaceId": space_id, "query": "launch", "limit": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(results.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn chat_validates_request() {
    let app = test_app(Arc::new(ScriptedGenerator::answering("unused"))).await;

    for body in [json!({"query": "hi"}), json!({"spaceId": "SP1", "query": "  "})] {
        let (status, response) = send(&app, Method::POST, "/api/ai/chat", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response, json!({"error": "Missing spaceId or query"}));
    }

    let (status, response) = send(&app, Method::POST, "/api/ai/search", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["error"], "Missing spaceId or query");
}

#[tokio::test]
async fn generation_failure_is_generic_500() {
    let app = test_app(Arc::new(ScriptedGenerator::failing())).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/ai/chat",
        Some(json!({"spaceId": "SP1", "query": "What's our plan?"})),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"error": "Failed to generate response"}));
    assert!(!body.to_string().contains("upstream secret detail"));
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let app = test_app(Arc::new(ScriptedGenerator::answering("ok"))).await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/tasks")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .expect("valid request");
    let response = app
        .router
        .clone()
        .oneshot(request)
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("can read body");
    let body: Value = serde_json::from_slice(&bytes).expect("body is json");
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn spaces_can_be_created_joined_and_viewed() {
    let app = test_app(Arc::new(ScriptedGenerator::answering("ok"))).await;

    let (status, body) = send(&app, Method::POST, "/api/spaces", Some(json!({"userId": "u1"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing name");

    let space = create_space(&app).await;
    let space_id = space["id"].as_str().expect("space id");
    assert_eq!(space["problemStatement"], "Too many spreadsheets");

    let (status, joined) = send(
        &app,
        Method::POST,
        "/api/spaces/join",
        Some(json!({"inviteToken": space["inviteToken"], "userId": "u2"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(joined["member"]["role"], "MEMBER");
    assert_eq!(joined["space"]["id"], space["id"]);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/spaces/join",
        Some(json!({"inviteToken": "nope", "userId": "u2"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    send(
        &app,
        Method::POST,
        "/api/journal",
        Some(json!({"spaceId": space_id, "userId": "u1", "title": "Week 1", "content": "Talked to users"})),
    )
    .await;

    let (status, details) = send(&app, Method::GET, &format!("/api/spaces/{space_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(details["name"], "Acme");
    assert_eq!(details["members"].as_array().map(Vec::len), Some(2));
    assert_eq!(details["journalEntries"][0]["title"], "Week 1");

    let (status, body) = send(&app, Method::GET, "/api/spaces/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Space not found");
}

#[tokio::test]
async fn content_for_unknown_space_is_not_found() {
    let app = test_app(Arc::new(ScriptedGenerator::answering("ok"))).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/messages",
        Some(json!({"spaceId": "missing", "userId": "u1", "content": "hello"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Space not found");
}

#[tokio::test]
async fn task_lifecycle_keeps_embeddings_in_step() {
    let app = test_app(Arc::new(ScriptedGenerator::answering("ok"))).await;
    let space = create_space(&app).await;
    let space_id = space["id"].as_str().expect("space id");

    let (status, task) = send(
        &app,
        Method::POST,
        "/api/tasks",
        Some(json!({"spaceId": space_id, "title": "Ship MVP", "category": "Product"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task["status"], "TODO");
    let task_id = task["id"].as_str().expect("task id");

    let (status, updated) = send(
        &app,
        Method::PUT,
        &format!("/api/tasks/{task_id}"),
        Some(json!({"status": "DONE"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "DONE");
    assert_eq!(updated["title"], "Ship MVP");

    let stats = app.indexer.process_pending().await.expect("can index");
    // the update superseded the create job
    assert_eq!(stats.embeddings_stored, 1);

    let (_, results) = send(
        &app,
        Method::POST,
        "/api/ai/search",
        Some(json!({"spaceId": space_id, "query": "ship mvp"})),
    )
    .await;
    assert_eq!(
        results[0]["content"],
        "Task: Ship MVP\nCategory: Product\nStatus: DONE"
    );

    let (status, body) = send(&app, Method::DELETE, &format!("/api/tasks/{task_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Task deleted successfully");
    let (status, _) = send(&app, Method::DELETE, &format!("/api/tasks/{task_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let stats = app.indexer.process_pending().await.expect("can index");
    assert_eq!(stats.embeddings_removed, 1);

    let (_, results) = send(
        &app,
        Method::POST,
        "/api/ai/search",
        Some(json!({"spaceId": space_id, "query": "ship mvp"})),
    )
    .await;
    assert_eq!(results, json!([]));

    let (status, tasks) = send(&app, Method::GET, &format!("/api/tasks/{space_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tasks, json!([]));
}

#[tokio::test]
async fn messages_are_listed_oldest_first() {
    let app = test_app(Arc::new(ScriptedGenerator::answering("ok"))).await;
    let space = create_space(&app).await;
    let space_id = space["id"].as_str().expect("space id");

    for content in ["first", "second"] {
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/messages",
            Some(json!({"spaceId": space_id, "userId": "u1", "content": content})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let (status, messages) =
        send(&app, Method::GET, &format!("/api/messages/{space_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(messages[0]["content"], "first");
    assert_eq!(messages[1]["content"], "second");
}

#[tokio::test]
async fn updates_cannot_blank_required_fields() {
    let app = test_app(Arc::new(ScriptedGenerator::answering("ok"))).await;
    let space = create_space(&app).await;
    let space_id = space["id"].as_str().expect("space id");

    let (status, entry) = send(
        &app,
        Method::POST,
        "/api/journal",
        Some(json!({"spaceId": space_id, "userId": "u1", "title": "Week 1", "content": "Interviewed users"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let entry_id = entry["id"].as_str().expect("entry id");

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/journal/{entry_id}"),
        Some(json!({"title": "", "content": ""})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing title");

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/journal/{entry_id}"),
        Some(json!({"content": "   "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing content");

    let (status, task) = send(
        &app,
        Method::POST,
        "/api/tasks",
        Some(json!({"spaceId": space_id, "title": "Ship MVP"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let task_id = task["id"].as_str().expect("task id");

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/tasks/{task_id}"),
        Some(json!({"title": " "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing title");

    // Rejected updates leave the rows and their queued jobs untouched
    let (_, entries) = send(&app, Method::GET, &format!("/api/journal/{space_id}"), None).await;
    assert_eq!(entries[0]["title"], "Week 1");
    assert_eq!(entries[0]["content"], "Interviewed users");

    let (status, updated) = send(
        &app,
        Method::PUT,
        &format!("/api/journal/{entry_id}"),
        Some(json!({"title": "  Week 2  "})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["title"], "Week 2");

    let stats = app.indexer.process_pending().await.expect("can index");
    assert_eq!(stats.embeddings_stored, 2);
    assert_eq!(stats.jobs_failed, 0);
}
