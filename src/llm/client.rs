use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use reqwest::{Client, Response, StatusCode};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{ChatRequest, ChatResponse, CompletionRequest, StreamChunk};
use super::{Generator, TextStream};
use crate::config::{ModelConfig, RequestConfig};
use crate::error::{GenerationError, GenerationResult, TransportError};

/// Client for an OpenAI-compatible chat completions endpoint (Groq by default).
///
/// The credential is not part of the client: every request carries the one
/// the user entered for their session.
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    base_url: String,
    model: ModelConfig,
    request_config: RequestConfig,
}

impl ChatClient {
    /// Create a new chat client
    pub fn new(config: &ModelConfig, request_config: RequestConfig) -> GenerationResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(TransportError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.clone(),
            request_config,
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn chat_request(&self, request: &CompletionRequest, stream: bool) -> ChatRequest {
        ChatRequest::new(&self.model.model, &request.prompt, self.model.temperature)
            .with_stream(stream)
            .with_json_mode(request.json_mode)
            .with_reasoning_format(self.model.reasoning_format.clone())
    }

    /// Run `attempt` under the configured retry policy.
    ///
    /// Only transient failures are retried. With `max_retries == 0` the first
    /// error is returned unchanged.
    async fn with_retry<T, F, Fut>(&self, operation: &str, attempt: F) -> Result<T, TransportError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let max_retries = self.request_config.max_retries;
        let mut retries = 0;

        loop {
            if retries > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(retries - 1)),
                );
                warn!(
                    operation,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying chat completion request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();
            match attempt().await {
                Ok(value) => {
                    info!(
                        operation,
                        model = %self.model.model,
                        latency_ms = start.elapsed().as_millis(),
                        "Chat completion request succeeded"
                    );
                    return Ok(value);
                }
                Err(e) => {
                    error!(
                        operation,
                        error = %e,
                        latency_ms = start.elapsed().as_millis(),
                        retry = retries,
                        "Chat completion request failed"
                    );
                    if !e.is_transient() || max_retries == 0 {
                        return Err(e);
                    }
                    if retries >= max_retries {
                        return Err(TransportError::Unavailable {
                            message: e.to_string(),
                            retries,
                        });
                    }
                    retries += 1;
                }
            }
        }
    }

    /// Send one request and map non-success statuses (internal)
    async fn send(&self, body: &ChatRequest, credential: &str) -> Result<Response, TransportError> {
        let url = format!("{}/chat/completions", self.base_url);

        debug!(
            model = %body.model,
            stream = body.stream,
            json_mode = body.response_format.is_some(),
            prompt_len = body.messages.iter().map(|m| m.content.len()).sum::<usize>(),
            "Calling chat completions endpoint"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", credential))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    TransportError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(status_error(status, error_body));
        }

        Ok(response)
    }

    async fn complete_once(&self, body: &ChatRequest, credential: &str) -> Result<String, TransportError> {
        let response: ChatResponse =
            self.send(body, credential)
                .await?
                .json()
                .await
                .map_err(|e| TransportError::InvalidResponse {
                    message: format!("Failed to parse response: {}", e),
                })?;

        response
            .content()
            .map(str::to_string)
            .ok_or_else(|| TransportError::InvalidResponse {
                message: "Response contained no completion text".to_string(),
            })
    }
}

/// Map a non-success HTTP status to a transport error
pub fn status_error(status: StatusCode, message: String) -> TransportError {
    match status.as_u16() {
        401 | 403 => TransportError::Unauthorized {
            status: status.as_u16(),
            message,
        },
        429 => TransportError::RateLimited { message },
        code => TransportError::Api {
            status: code,
            message,
        },
    }
}

#[async_trait]
impl Generator for ChatClient {
    async fn complete(&self, request: &CompletionRequest) -> GenerationResult<String> {
        let body = self.chat_request(request, false);
        let text = self
            .with_retry("complete", || self.complete_once(&body, &request.credential))
            .await?;
        Ok(text)
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> GenerationResult<TextStream> {
        let body = self.chat_request(request, true);
        let response = self
            .with_retry("complete_stream", || self.send(&body, &request.credential))
            .await?;
        Ok(sse_text_stream(response.bytes_stream()))
    }
}

struct SseState<S> {
    body: Pin<Box<S>>,
    buffer: Vec<u8>,
    pending: VecDeque<String>,
    finished: bool,
}

impl<S> SseState<S> {
    /// Consume every complete line in the buffer.
    fn drain_lines(&mut self) -> GenerationResult<()> {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.handle_line(&line)?;
            if self.finished {
                self.buffer.clear();
            }
        }
        Ok(())
    }

    fn handle_line(&mut self, line: &[u8]) -> GenerationResult<()> {
        // Lines end in ASCII newlines, so a complete line is complete UTF-8.
        let line = String::from_utf8_lossy(line);
        let Some(data) = line.trim_end().strip_prefix("data:") else {
            return Ok(());
        };
        let data = data.trim();
        if data.is_empty() {
            return Ok(());
        }
        if data == "[DONE]" {
            self.finished = true;
            return Ok(());
        }

        let chunk: StreamChunk =
            serde_json::from_str(data).map_err(|e| TransportError::InvalidResponse {
                message: format!("Failed to parse stream chunk: {}", e),
            })?;
        if let Some(text) = chunk.content() {
            self.pending.push_back(text.to_string());
        }
        Ok(())
    }
}

/// Turn a server-sent-events byte stream into a stream of text fragments.
///
/// Bytes are buffered until a full line is available. The stream ends at
/// `data: [DONE]` or when the body ends.
pub fn sse_text_stream<S, B, E>(body: S) -> TextStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let state = SseState {
        body: Box::pin(body),
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(text) = state.pending.pop_front() {
                return Some((Ok(text), state));
            }
            if state.finished {
                return None;
            }

            match state.body.next().await {
                Some(Ok(bytes)) => {
                    state.buffer.extend_from_slice(bytes.as_ref());
                    if let Err(e) = state.drain_lines() {
                        state.finished = true;
                        return Some((Err(e), state));
                    }
                }
                Some(Err(e)) => {
                    state.finished = true;
                    let err = GenerationError::from(TransportError::Stream {
                        message: e.to_string(),
                    });
                    return Some((Err(err), state));
                }
                None => {
                    state.finished = true;
                    let tail = std::mem::take(&mut state.buffer);
                    if let Err(e) = state.handle_line(&tail) {
                        return Some((Err(e), state));
                    }
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn chunks(parts: Vec<&'static [u8]>) -> TextStream {
        sse_text_stream(stream::iter(
            parts.into_iter().map(Ok::<_, std::io::Error>),
        ))
    }

    fn event(text: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": text}}]})
        )
    }

    #[test]
    fn test_client_creation() {
        let client = ChatClient::new(&ModelConfig::default(), RequestConfig::default());
        assert!(client.is_ok());
        assert_eq!(
            client.unwrap().base_url(),
            "https://api.groq.com/openai/v1"
        );
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, String::new()),
            TransportError::Unauthorized { status: 401, .. }
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, String::new()),
            TransportError::Unauthorized { status: 403, .. }
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, String::new()),
            TransportError::RateLimited { .. }
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, String::new()),
            TransportError::Api { status: 502, .. }
        ));
    }

    #[tokio::test]
    async fn test_sse_concatenates_fragments() {
        let body = format!("{}{}data: [DONE]\n\n", event("Hello, "), event("world"));
        let bytes: &'static [u8] = Box::leak(body.into_bytes().into_boxed_slice());
        let fragments: Vec<String> = chunks(vec![bytes]).try_collect().await.unwrap();
        assert_eq!(fragments, vec!["Hello, ", "world"]);
    }

    #[tokio::test]
    async fn test_sse_multibyte_split_across_chunks() {
        let body = format!("{}data: [DONE]\n\n", event("π ≈ 3.14"));
        let bytes: &'static [u8] = Box::leak(body.into_bytes().into_boxed_slice());
        let split = bytes
            .windows(2)
            .position(|w| w == "π".as_bytes())
            .unwrap()
            + 1;
        let (head, tail) = bytes.split_at(split);
        let text: String = chunks(vec![head, tail]).try_collect().await.unwrap();
        assert_eq!(text, "π ≈ 3.14");
    }

    #[tokio::test]
    async fn test_sse_ignores_non_data_lines() {
        let body: &'static [u8] =
            b": keep-alive\n\nevent: message\ndata: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n";
        let fragments: Vec<String> = chunks(vec![body]).try_collect().await.unwrap();
        assert!(fragments.is_empty());
    }

    #[tokio::test]
    async fn test_sse_malformed_chunk_is_an_error() {
        let body: &'static [u8] = b"data: {not json}\n\n";
        let result: GenerationResult<Vec<String>> = chunks(vec![body]).try_collect().await;
        assert!(matches!(
            result,
            Err(GenerationError::Transport(TransportError::InvalidResponse { .. }))
        ));
    }

    #[tokio::test]
    async fn test_sse_stops_at_done() {
        let body = format!("{}data: [DONE]\n\n{}", event("a"), event("b"));
        let bytes: &'static [u8] = Box::leak(body.into_bytes().into_boxed_slice());
        let text: String = chunks(vec![bytes]).try_collect().await.unwrap();
        assert_eq!(text, "a");
    }
}
