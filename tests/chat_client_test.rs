//! Integration tests for the chat completions client
//!
//! Tests HTTP client behavior using wiremock for request/response mocking.

use futures::TryStreamExt;
use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use brainbrew::config::{ModelConfig, RequestConfig};
use brainbrew::error::{DecodeError, GenerationError, TransportError};
use brainbrew::llm::{generate, ChatClient, CompletionRequest, Generated, Generator};
use brainbrew::schema::quiz_schema;

/// Create a test client pointing to mock server
fn create_test_client(base_url: &str) -> ChatClient {
    create_client_with_retries(base_url, 0)
}

fn create_client_with_retries(base_url: &str, max_retries: u32) -> ChatClient {
    let config = ModelConfig {
        base_url: base_url.to_string(),
        ..ModelConfig::default()
    };

    let request_config = RequestConfig {
        timeout_ms: 5000,
        max_retries,
        retry_delay_ms: 10,
    };

    ChatClient::new(&config, request_config).expect("Failed to create client")
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "model": "qwen-qwq-32b",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    })
}

fn sse_body(fragments: &[&str]) -> String {
    let mut body = String::new();
    for fragment in fragments {
        body.push_str(&format!(
            "data: {}\n\n",
            json!({"choices": [{"index": 0, "delta": {"content": fragment}}]})
        ));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

#[cfg(test)]
mod completion_tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_completion() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer gsk_user_key"))
            .and(header("Content-Type", "application/json"))
            .and(body_partial_json(json!({
                "model": "qwen-qwq-32b",
                "temperature": 0.6,
                "stream": false,
                "reasoning_format": "hidden",
                "messages": [{"role": "user", "content": "Explain sets"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("# Sets")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let result = client
            .complete(&CompletionRequest::new("Explain sets", "gsk_user_key"))
            .await;

        assert_eq!(result.unwrap(), "# Sets");
    }

    #[tokio::test]
    async fn test_json_mode_sets_response_format() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({
                "response_format": {"type": "json_object"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("{}")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let request = CompletionRequest::new("p", "k").with_json_mode(true);
        assert!(client.complete(&request).await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_choices_is_invalid_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let err = client
            .complete(&CompletionRequest::new("p", "k"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Transport(TransportError::InvalidResponse { .. })
        ));
    }

    #[tokio::test]
    async fn test_non_json_body_is_invalid_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let err = client
            .complete(&CompletionRequest::new("p", "k"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Transport(TransportError::InvalidResponse { .. })
        ));
    }
}

#[cfg(test)]
mod status_tests {
    use super::*;

    async fn status_error(status: u16) -> GenerationError {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status).set_body_string("upstream says no"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        client
            .complete(&CompletionRequest::new("p", "k"))
            .await
            .unwrap_err()
    }

    #[tokio::test]
    async fn test_unauthorized() {
        let err = status_error(401).await;
        assert!(matches!(
            err,
            GenerationError::Transport(TransportError::Unauthorized { status: 401, ref message })
                if message == "upstream says no"
        ));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_forbidden() {
        assert!(matches!(
            status_error(403).await,
            GenerationError::Transport(TransportError::Unauthorized { status: 403, .. })
        ));
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let err = status_error(429).await;
        assert!(matches!(
            err,
            GenerationError::Transport(TransportError::RateLimited { .. })
        ));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_server_error() {
        assert!(matches!(
            status_error(500).await,
            GenerationError::Transport(TransportError::Api { status: 500, .. })
        ));
    }
}

#[cfg(test)]
mod retry_tests {
    use super::*;

    #[tokio::test]
    async fn test_transient_failures_retried_until_exhausted() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&mock_server)
            .await;

        let client = create_client_with_retries(&mock_server.uri(), 2);
        let err = client
            .complete(&CompletionRequest::new("p", "k"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Transport(TransportError::Unavailable { retries: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_unauthorized_never_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_client_with_retries(&mock_server.uri(), 3);
        let err = client
            .complete(&CompletionRequest::new("p", "k"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Transport(TransportError::Unauthorized { .. })
        ));
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("ok")))
            .mount(&mock_server)
            .await;

        let client = create_client_with_retries(&mock_server.uri(), 1);
        let text = client
            .complete(&CompletionRequest::new("p", "k"))
            .await
            .unwrap();
        assert_eq!(text, "ok");
    }
}

#[cfg(test)]
mod streaming_tests {
    use super::*;

    #[tokio::test]
    async fn test_stream_concatenation_equals_completion() {
        let mock_server = MockServer::start().await;
        let fragments = ["# Sets\n", "A set is ", "a collection of ", "distinct objects."];

        Mock::given(method("POST"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(sse_body(&fragments), "text/event-stream"),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(&fragments.concat())))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let request = CompletionRequest::new("Explain sets", "k");

        let streamed: Vec<String> = client
            .complete_stream(&request)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        let whole = client.complete(&request).await.unwrap();

        assert_eq!(streamed, fragments);
        assert_eq!(streamed.concat(), whole);
    }

    #[tokio::test]
    async fn test_stream_status_error_before_any_fragment() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let result = client
            .complete_stream(&CompletionRequest::new("p", "bad"))
            .await;
        assert!(matches!(
            result,
            Err(GenerationError::Transport(TransportError::Unauthorized { .. }))
        ));
    }
}

#[cfg(test)]
mod generate_tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_credential_makes_no_request() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("unused")))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let err = generate(&client, "Explain sets", "", None).await.unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Precondition { ref field, .. } if field == "credential"
        ));
    }

    #[tokio::test]
    async fn test_structured_generation_over_http() {
        let mock_server = MockServer::start().await;
        let quiz = json!({
            "thinking_content": "reasoning",
            "response_content": [{"question": "2+2?", "options": {"4": true, "5": false}}]
        });

        Mock::given(method("POST"))
            .and(body_partial_json(json!({"response_format": {"type": "json_object"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(&quiz.to_string())))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let schema = quiz_schema();
        let generated = generate(&client, "Quiz me", "k", Some(&schema)).await.unwrap();
        assert!(matches!(generated, Generated::Structured(_)));
    }

    #[tokio::test]
    async fn test_prose_where_schema_expected_is_decode_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(completion("Here is your quiz: 2+2=4")),
            )
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let schema = quiz_schema();
        let err = generate(&client, "Quiz me", "k", Some(&schema))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Decode(DecodeError::NoJson { .. })));
    }
}
