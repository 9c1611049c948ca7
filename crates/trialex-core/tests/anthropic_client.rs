//! Integration tests for [`AnthropicClient`] against a local mock server.
//!
//! Each test points `base_url` at a mockito server so no real API calls
//! are made.

use mockito::{Matcher, Server};
use serde_json::json;

use trialex_core::client::{SYSTEM_PROMPT, USER_PREFIX, user_message};
use trialex_core::{AnthropicClient, Config, ModelBackend, ModelError};

fn config_for(server: &Server) -> Config {
    Config {
        base_url: server.url(),
        ..Config::default()
    }
}

fn text_reply(text: &str) -> String {
    json!({
        "id": "msg_01",
        "type": "message",
        "role": "assistant",
        "content": [{"type": "text", "text": text}],
        "usage": {"input_tokens": 120, "output_tokens": 40}
    })
    .to_string()
}

#[tokio::test]
async fn sends_fixed_request_and_returns_text() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/messages")
        .match_header("x-api-key", "test-key")
        .match_header("anthropic-version", "2023-06-01")
        .match_body(Matcher::PartialJson(json!({
            "model": "claude-3-sonnet-20240229",
            "max_tokens": 1500,
            "temperature": 0.0,
            "system": SYSTEM_PROMPT,
            "messages": [{"role": "user", "content": format!("{USER_PREFIX}short paper")}]
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(text_reply("{\"first_author\": \"Smith\"}"))
        .create_async()
        .await;

    let client = AnthropicClient::new("test-key", &config_for(&server));
    let user = user_message("short paper", 50_000);
    let text = client.complete(SYSTEM_PROMPT, &user).await.unwrap();

    assert_eq!(text, "{\"first_author\": \"Smith\"}");
    mock.assert_async().await;
}

#[tokio::test]
async fn outbound_payload_stops_at_input_limit() {
    let mut server = Server::new_async().await;
    let kept = "x".repeat(50_000);
    let mock = server
        .mock("POST", "/v1/messages")
        .match_body(Matcher::PartialJson(json!({
            "messages": [{"role": "user", "content": format!("{USER_PREFIX}{kept}")}]
        })))
        .with_status(200)
        .with_body(text_reply("{}"))
        .create_async()
        .await;

    let client = AnthropicClient::new("test-key", &config_for(&server));
    let document = format!("{kept}BEYOND_THE_LIMIT");
    let user = user_message(&document, 50_000);
    client.complete(SYSTEM_PROMPT, &user).await.unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn auth_failure_is_api_error() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/v1/messages")
        .with_status(401)
        .with_body(r#"{"type":"error","error":{"type":"authentication_error"}}"#)
        .create_async()
        .await;

    let client = AnthropicClient::new("bad-key", &config_for(&server));
    let err = client.complete(SYSTEM_PROMPT, "hi").await.unwrap_err();

    assert!(err.is_auth());
    match err {
        ModelError::Api { status, body } => {
            assert_eq!(status, 401);
            assert!(body.contains("authentication_error"));
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn rate_limit_is_not_retried() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/messages")
        .with_status(429)
        .with_body("slow down")
        .expect(1)
        .create_async()
        .await;

    let client = AnthropicClient::new("test-key", &config_for(&server));
    let err = client.complete(SYSTEM_PROMPT, "hi").await.unwrap_err();

    assert!(err.is_rate_limited());
    mock.assert_async().await;
}

#[tokio::test]
async fn response_without_text_block_is_empty() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/v1/messages")
        .with_status(200)
        .with_body(json!({"content": []}).to_string())
        .create_async()
        .await;

    let client = AnthropicClient::new("test-key", &config_for(&server));
    let err = client.complete(SYSTEM_PROMPT, "hi").await.unwrap_err();
    assert!(matches!(err, ModelError::EmptyResponse));
}

#[tokio::test]
async fn malformed_body_is_decode_error() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/v1/messages")
        .with_status(200)
        .with_body("<html>gateway</html>")
        .create_async()
        .await;

    let client = AnthropicClient::new("test-key", &config_for(&server));
    let err = client.complete(SYSTEM_PROMPT, "hi").await.unwrap_err();
    assert!(matches!(err, ModelError::Decode(_)));
}
