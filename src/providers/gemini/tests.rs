use super::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> GeminiClient {
    let config = GeminiConfig {
        api_base: format!("{}/v1beta", server.uri()),
        embedding_dimension: 4,
        ..GeminiConfig::default()
    };
    GeminiClient::new(&config, "test-key".to_string()).expect("Failed to create client")
}

#[test]
fn empty_key_is_rejected() {
    let result = GeminiClient::new(&GeminiConfig::default(), "  ".to_string());
    assert!(result.is_err());
}

#[test]
fn debug_output_hides_key() {
    let client = GeminiClient::new(&GeminiConfig::default(), "super-secret".to_string())
        .expect("Failed to create client");
    let debug = format!("{client:?}");
    assert!(!debug.contains("super-secret"));
    assert!(debug.contains("text-embedding-004"));
}

#[tokio::test]
async fn embed_sends_key_header_and_parses_values() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/text-embedding-004:embedContent"))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "model": "models/text-embedding-004",
            "content": { "parts": [{ "text": "Launch by Q4" }] }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embedding": { "values": [0.5, 0.25, 0.0, -0.5] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let vector = client.embed("Launch by Q4").await.expect("embedding should succeed");

    assert_eq!(vector, vec![0.5, 0.25, 0.0, -0.5]);
}

#[tokio::test]
async fn embed_rejects_wrong_dimension() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/text-embedding-004:embedContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embedding": { "values": [0.5] }
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.embed("hello").await.expect_err("should reject");

    assert!(matches!(
        err,
        ProviderError::DimensionMismatch {
            expected: 4,
            actual: 1
        }
    ));
}

#[tokio::test]
async fn generate_joins_candidate_parts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "contents": [{ "role": "user", "parts": [{ "text": "What next?" }] }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{ "text": "Based on your TASKS, " }, { "text": "ship the MVP." }]
                },
                "finishReason": "STOP"
            }]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let answer = client.generate("What next?").await.expect("should generate");

    assert_eq!(answer, "Based on your TASKS, ship the MVP.");
}

#[tokio::test]
async fn generate_without_candidates_is_empty_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.generate("prompt").await.expect_err("should fail");

    assert!(matches!(err, ProviderError::EmptyCompletion));
}

#[tokio::test]
async fn unauthorized_is_a_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": { "code": 403, "message": "API key not valid" }
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.generate("prompt").await.expect_err("should fail");

    assert!(matches!(err, ProviderError::Status { status: 403, .. }));
}
