//! Model access.
//!
//! [`Generator`] is the seam between the pipeline and the network: the
//! production implementation is [`ChatClient`], tests substitute their own.
//! [`generate`] layers the credential precondition and structured decoding
//! on top of any generator.

mod client;
mod types;

pub use client::{sse_text_stream, status_error, ChatClient};
pub use types::*;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;

use crate::error::{GenerationError, GenerationResult};
use crate::schema::{decode, Decoded, Schema};

/// Boxed stream of completion text fragments.
pub type TextStream = Pin<Box<dyn Stream<Item = GenerationResult<String>> + Send>>;

/// Anything that can turn a prompt into completion text.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Whole completion text.
    async fn complete(&self, request: &CompletionRequest) -> GenerationResult<String>;

    /// Completion text as it is produced. Concatenating the fragments yields
    /// what [`Generator::complete`] would have returned.
    async fn complete_stream(&self, request: &CompletionRequest) -> GenerationResult<TextStream>;
}

/// Result of [`generate`].
#[derive(Debug, Clone, PartialEq)]
pub enum Generated {
    /// Free-form output, returned verbatim.
    Text(String),
    /// Output decoded against the requested schema.
    Structured(Decoded),
}

impl Generated {
    pub fn into_text(self) -> Option<String> {
        match self {
            Generated::Text(text) => Some(text),
            Generated::Structured(_) => None,
        }
    }

    pub fn into_structured(self) -> Option<Decoded> {
        match self {
            Generated::Structured(decoded) => Some(decoded),
            Generated::Text(_) => None,
        }
    }
}

/// Reject an empty credential before anything is dispatched.
pub fn require_credential(credential: &str) -> GenerationResult<&str> {
    let credential = credential.trim();
    if credential.is_empty() {
        return Err(GenerationError::precondition(
            "credential",
            "an API key is required before generating content",
        ));
    }
    Ok(credential)
}

/// Send `prompt` to the model, decoding against `schema` when one is given.
///
/// A structured request carries the schema's output instructions and asks
/// the endpoint for JSON; output that does not decode fails with
/// [`GenerationError::Decode`], never with partial text.
pub async fn generate(
    generator: &dyn Generator,
    prompt: &str,
    credential: &str,
    schema: Option<&Schema>,
) -> GenerationResult<Generated> {
    let credential = require_credential(credential)?;

    match schema {
        None => {
            let text = generator
                .complete(&CompletionRequest::new(prompt, credential))
                .await?;
            Ok(Generated::Text(text))
        }
        Some(schema) => Ok(Generated::Structured(
            generate_structured(generator, prompt, credential, schema).await?,
        )),
    }
}

/// Structured half of [`generate`]: instructions appended, JSON mode on,
/// output decoded against `schema`.
pub async fn generate_structured(
    generator: &dyn Generator,
    prompt: &str,
    credential: &str,
    schema: &Schema,
) -> GenerationResult<Decoded> {
    let credential = require_credential(credential)?;
    let prompt = format!("{}{}", prompt, schema.instructions()?);
    let request = CompletionRequest::new(prompt, credential).with_json_mode(true);
    let raw = generator.complete(&request).await?;
    Ok(decode(&raw, schema)?)
}

/// Streamed counterpart of [`generate`] for free-form output.
pub async fn generate_stream(
    generator: &dyn Generator,
    prompt: &str,
    credential: &str,
) -> GenerationResult<TextStream> {
    let credential = require_credential(credential)?;
    generator
        .complete_stream(&CompletionRequest::new(prompt, credential))
        .await
}

/// Drive `stream` to the end, handing each fragment to `sink`, and return the
/// full text. The first error aborts and is returned.
pub async fn drain_stream(
    mut stream: TextStream,
    sink: &mut (dyn FnMut(&str) + Send),
) -> GenerationResult<String> {
    let mut text = String::new();
    while let Some(fragment) = stream.next().await {
        let fragment = fragment?;
        sink(&fragment);
        text.push_str(&fragment);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DecodeError, TransportError};
    use crate::schema::qna_questions_schema;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Returns canned completions and records what it was asked.
    struct Canned {
        reply: String,
        calls: AtomicUsize,
        last: Mutex<Option<CompletionRequest>>,
    }

    impl Canned {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                calls: AtomicUsize::new(0),
                last: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl Generator for Canned {
        async fn complete(&self, request: &CompletionRequest) -> GenerationResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(request.clone());
            Ok(self.reply.clone())
        }

        async fn complete_stream(&self, request: &CompletionRequest) -> GenerationResult<TextStream> {
            let text = self.complete(request).await?;
            let parts: Vec<GenerationResult<String>> =
                text.chars().map(|c| Ok(c.to_string())).collect();
            Ok(Box::pin(futures::stream::iter(parts)))
        }
    }

    #[tokio::test]
    async fn test_empty_credential_dispatches_nothing() {
        let canned = Canned::new("unused");
        let err = generate(&canned, "prompt", "  ", None).await.unwrap_err();
        assert!(matches!(err, GenerationError::Precondition { ref field, .. } if field == "credential"));
        assert_eq!(canned.calls.load(Ordering::SeqCst), 0);

        assert!(generate_stream(&canned, "prompt", "").await.is_err());
        assert_eq!(canned.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_plain_generation_is_verbatim() {
        let canned = Canned::new("# Notes\n$x^2$");
        let generated = generate(&canned, "prompt", "key", None).await.unwrap();
        assert_eq!(generated, Generated::Text("# Notes\n$x^2$".to_string()));

        let sent = canned.last.lock().unwrap().clone().unwrap();
        assert_eq!(sent.prompt, "prompt");
        assert!(!sent.json_mode);
    }

    #[tokio::test]
    async fn test_structured_generation_appends_instructions() {
        let canned = Canned::new(r#"{"thinking_content":"","response_content":["Q1"]}"#);
        let schema = qna_questions_schema();
        let generated = generate(&canned, "List questions.", "key", Some(&schema))
            .await
            .unwrap();
        assert!(matches!(generated, Generated::Structured(Decoded::Object(_))));

        let sent = canned.last.lock().unwrap().clone().unwrap();
        assert!(sent.prompt.starts_with("List questions."));
        assert!(sent.prompt.contains("JSON Schema"));
        assert!(sent.json_mode);
    }

    #[tokio::test]
    async fn test_structured_generation_never_returns_raw_text() {
        let canned = Canned::new("Sorry, here are some questions: one, two");
        let schema = qna_questions_schema();
        let err = generate(&canned, "p", "key", Some(&schema)).await.unwrap_err();
        assert!(matches!(err, GenerationError::Decode(DecodeError::NoJson { .. })));
    }

    #[tokio::test]
    async fn test_drain_stream_matches_completion() {
        let canned = Canned::new("Hello ∑ world");
        let stream = generate_stream(&canned, "p", "key").await.unwrap();
        let mut seen = Vec::new();
        let text = drain_stream(stream, &mut |f: &str| seen.push(f.to_string()))
            .await
            .unwrap();
        assert_eq!(text, "Hello ∑ world");
        assert_eq!(seen.concat(), text);
    }

    #[tokio::test]
    async fn test_drain_stream_stops_at_error() {
        let parts: Vec<GenerationResult<String>> = vec![
            Ok("a".to_string()),
            Err(TransportError::Stream {
                message: "reset".to_string(),
            }
            .into()),
            Ok("b".to_string()),
        ];
        let mut seen = String::new();
        let result = drain_stream(Box::pin(futures::stream::iter(parts)), &mut |f: &str| {
            seen.push_str(f)
        })
        .await;
        assert!(result.is_err());
        assert_eq!(seen, "a");
    }
}
