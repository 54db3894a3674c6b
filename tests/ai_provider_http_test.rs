//! `ReqwestAiProvider` against a real (mocked) HTTP endpoint: success,
//! overload signalling (529-equivalent via 503/429), and non-success
//! status mapping (spec §4.2 retry policy's trigger conditions).

use form_mapper_control_plane::ai_broker::{AiError, AiProvider};
use form_mapper_control_plane::server::ReqwestAiProvider;

#[tokio::test]
async fn successful_completion_returns_text_and_token_counts() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/messages")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"text": "{\"steps\": []}", "input_tokens": 42, "output_tokens": 7}"#)
        .create_async()
        .await;

    let provider = ReqwestAiProvider::new(format!("{}/v1/messages", server.url()), "test-key", "claude-3-5-sonnet-latest");
    let (text, input_tokens, output_tokens) = provider.complete("generate steps", None).await.unwrap();

    mock.assert_async().await;
    assert_eq!(text, "{\"steps\": []}");
    assert_eq!(input_tokens, 42);
    assert_eq!(output_tokens, 7);
}

#[tokio::test]
async fn service_unavailable_maps_to_overloaded_so_the_broker_retries() {
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("POST", "/v1/messages").with_status(503).create_async().await;

    let provider = ReqwestAiProvider::new(format!("{}/v1/messages", server.url()), "test-key", "claude-3-5-sonnet-latest");
    let err = provider.complete("generate steps", None).await.unwrap_err();

    mock.assert_async().await;
    assert!(matches!(err, AiError::Overloaded));
}

#[tokio::test]
async fn too_many_requests_also_maps_to_overloaded() {
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("POST", "/v1/messages").with_status(429).create_async().await;

    let provider = ReqwestAiProvider::new(format!("{}/v1/messages", server.url()), "test-key", "claude-3-5-sonnet-latest");
    let err = provider.complete("generate steps", None).await.unwrap_err();

    mock.assert_async().await;
    assert!(matches!(err, AiError::Overloaded));
}

#[tokio::test]
async fn server_error_is_a_plain_request_error_not_overloaded() {
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("POST", "/v1/messages").with_status(500).create_async().await;

    let provider = ReqwestAiProvider::new(format!("{}/v1/messages", server.url()), "test-key", "claude-3-5-sonnet-latest");
    let err = provider.complete("generate steps", None).await.unwrap_err();

    mock.assert_async().await;
    assert!(matches!(err, AiError::Request(_)));
}
