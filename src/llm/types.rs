use serde::{Deserialize, Serialize};

/// Message in a chat completion conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl Message {
    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// What the pipeline asks the model for: one prompt, sent with the session's credential.
#[derive(Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub credential: String,
    /// Ask the endpoint for a JSON object response.
    pub json_mode: bool,
}

impl std::fmt::Debug for CompletionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionRequest")
            .field("prompt_len", &self.prompt.len())
            .field("credential", &"<redacted>")
            .field("json_mode", &self.json_mode)
            .finish()
    }
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            credential: credential.into(),
            json_mode: false,
        }
    }

    /// Request a JSON object response
    pub fn with_json_mode(mut self, json_mode: bool) -> Self {
        self.json_mode = json_mode;
        self
    }
}

/// Body of `POST /chat/completions`
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f64,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_format: Option<String>,
}

/// `response_format` field of a chat request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
}

impl ResponseFormat {
    pub fn json_object() -> Self {
        Self {
            format_type: "json_object".to_string(),
        }
    }
}

impl ChatRequest {
    /// Single-user-message request for `model`
    pub fn new(model: impl Into<String>, prompt: impl Into<String>, temperature: f64) -> Self {
        Self {
            model: model.into(),
            messages: vec![Message::user(prompt)],
            temperature,
            stream: false,
            response_format: None,
            reasoning_format: None,
        }
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_json_mode(mut self, json_mode: bool) -> Self {
        self.response_format = json_mode.then(ResponseFormat::json_object);
        self
    }

    pub fn with_reasoning_format(mut self, reasoning_format: Option<String>) -> Self {
        self.reasoning_format = reasoning_format;
        self
    }
}

/// Non-streamed chat completion response
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// One completion choice
#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Assistant message inside a choice
#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// Token usage information
#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

impl ChatResponse {
    /// Text of the first choice
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
    }
}

/// One `data:` chunk of a streamed completion
#[derive(Debug, Clone, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
}

/// Incremental content of a streamed choice
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
}

impl StreamChunk {
    /// Text carried by this chunk, if any
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.delta.content.as_deref())
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_request_serialization() {
        let request = ChatRequest::new("qwen-qwq-32b", "Explain sets", 0.6)
            .with_json_mode(true)
            .with_reasoning_format(Some("hidden".to_string()));
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "model": "qwen-qwq-32b",
                "messages": [{"role": "user", "content": "Explain sets"}],
                "temperature": 0.6,
                "stream": false,
                "response_format": {"type": "json_object"},
                "reasoning_format": "hidden"
            })
        );
    }

    #[test]
    fn test_optional_fields_skipped() {
        let request = ChatRequest::new("m", "p", 0.0).with_stream(true);
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("response_format").is_none());
        assert!(value.get("reasoning_format").is_none());
        assert_eq!(value["stream"], true);
    }

    #[test]
    fn test_response_content() {
        let response: ChatResponse = serde_json::from_value(json!({
            "id": "x",
            "choices": [{"message": {"role": "assistant", "content": "hello"}, "finish_reason": "stop"}]
        }))
        .unwrap();
        assert_eq!(response.content(), Some("hello"));

        let empty: ChatResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert_eq!(empty.content(), None);
    }

    #[test]
    fn test_stream_chunk_content() {
        let chunk: StreamChunk =
            serde_json::from_str(r#"{"choices":[{"delta":{"content":"Hi"}}]}"#).unwrap();
        assert_eq!(chunk.content(), Some("Hi"));

        let role_only: StreamChunk =
            serde_json::from_str(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap();
        assert_eq!(role_only.content(), None);
    }

    #[test]
    fn test_completion_request_debug_redacts_credential() {
        let request = CompletionRequest::new("prompt", "gsk_secret");
        let text = format!("{:?}", request);
        assert!(!text.contains("gsk_secret"));
        assert!(text.contains("<redacted>"));
    }
}
