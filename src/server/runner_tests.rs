//! Unit tests for the stdio pass runner.
//!
//! Drives `PassServer::serve` with in-memory readers and writers and checks
//! the emitted JSON lines.

use super::*;
use crate::error::GenerationResult;
use crate::llm::{CompletionRequest, Generator, TextStream};
use crate::pipeline::ContentPipeline;
use crate::session::MemoryStore;
use async_trait::async_trait;
use serde_json::{json, Value};

/// Streams fixed markdown; structured completions are never requested here.
struct FixedNotes;

#[async_trait]
impl Generator for FixedNotes {
    async fn complete(&self, _request: &CompletionRequest) -> GenerationResult<String> {
        Ok("# Notes".to_string())
    }

    async fn complete_stream(&self, _request: &CompletionRequest) -> GenerationResult<TextStream> {
        let parts: Vec<GenerationResult<String>> =
            vec![Ok("# No".to_string()), Ok("tes".to_string())];
        Ok(Box::pin(futures::stream::iter(parts)))
    }
}

fn server() -> PassServer {
    let app = App::new(ContentPipeline::new(Arc::new(FixedNotes)));
    PassServer::new(app, Arc::new(MemoryStore::new()), "default")
}

async fn serve(server: &PassServer, input: &str) -> Vec<Value> {
    let mut output = Vec::new();
    server
        .serve(BufReader::new(input.as_bytes()), &mut output)
        .await
        .unwrap();
    String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

// ============================================================================
// Envelope tests
// ============================================================================

#[test]
fn test_request_defaults_to_view() {
    let request: PassRequest = serde_json::from_value(json!({"page": "quiz"})).unwrap();
    assert_eq!(request.action, Action::View);
    assert!(request.session.is_none());
}

#[test]
fn test_error_response_omits_missing_session() {
    let response = PassResponse::Error {
        session: None,
        error: "bad".to_string(),
    };
    assert_eq!(serde_json::to_value(&response).unwrap(), json!({"error": "bad"}));
}

// ============================================================================
// Loop tests
// ============================================================================

#[tokio::test]
async fn test_view_uses_default_session() {
    let lines = serve(&server(), "{\"page\":\"home\"}\n").await;
    assert_eq!(
        lines,
        vec![json!({
            "session": "default",
            "render": {"view": "home", "configured": false, "topics": ""}
        })]
    );
}

#[tokio::test]
async fn test_malformed_line_does_not_stop_loop() {
    let input = "not json\n\n{\"page\":\"notes\"}\n";
    let lines = serve(&server(), input).await;
    assert_eq!(lines.len(), 2);
    assert!(lines[0]["error"].as_str().unwrap().starts_with("Parse error"));
    assert_eq!(lines[1]["render"]["view"], "needs_config");
}

#[tokio::test]
async fn test_fragments_precede_render() {
    let input = concat!(
        r#"{"session":"s1","page":"home","action":{"type":"submit_config","topics":"Sets","credential":"k"}}"#,
        "\n",
        r#"{"session":"s1","page":"notes","action":{"type":"generate"}}"#,
        "\n",
    );
    let lines = serve(&server(), input).await;
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0]["render"]["configured"], true);
    assert_eq!(lines[1]["fragment"]["text"], "# No");
    assert_eq!(lines[2]["fragment"]["text"], "tes");
    assert_eq!(
        lines[3],
        json!({"session": "s1", "render": {"view": "notes", "content": "# Notes"}})
    );
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let input = concat!(
        r#"{"session":"a","page":"home","action":{"type":"submit_config","topics":"Sets","credential":"k"}}"#,
        "\n",
        r#"{"session":"b","page":"home"}"#,
        "\n",
    );
    let lines = serve(&server(), input).await;
    assert_eq!(lines[0]["render"]["configured"], true);
    assert_eq!(lines[1]["render"]["configured"], false);
}

#[tokio::test]
async fn test_pass_error_is_reported_with_session() {
    let input = r#"{"session":"s","page":"quiz","action":{"type":"answer","option":"A"}}"#;
    let lines = serve(&server(), &format!("{}\n", input)).await;
    // Unconfigured sessions render the config prompt before any transition.
    assert_eq!(lines[0]["render"]["view"], "needs_config");

    let input = concat!(
        r#"{"session":"s","page":"home","action":{"type":"submit_config","topics":"Sets","credential":"k"}}"#,
        "\n",
        r#"{"session":"s","page":"quiz","action":{"type":"answer","option":"A"}}"#,
        "\n",
    );
    let lines = serve(&server(), input).await;
    assert_eq!(lines[1]["session"], "s");
    assert_eq!(lines[1]["error"], "Quiz error: Quiz has not been started");
}

#[tokio::test]
async fn test_end_session_then_view_starts_over() {
    let input = concat!(
        r#"{"session":"s","page":"home","action":{"type":"submit_config","topics":"Sets","credential":"k"}}"#,
        "\n",
        r#"{"session":"s","page":"home","action":{"type":"end_session"}}"#,
        "\n",
        r#"{"session":"s","page":"home"}"#,
        "\n",
    );
    let lines = serve(&server(), input).await;
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["render"]["configured"], true);
    assert_eq!(
        lines[1],
        json!({"session": "s", "render": {"view": "session_ended"}})
    );
    assert_eq!(
        lines[2],
        json!({
            "session": "s",
            "render": {"view": "home", "configured": false, "topics": ""}
        })
    );
}
