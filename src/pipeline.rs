//! Content pipeline: task kind → prompt template → generator → decoder.
//!
//! Structured tasks (Q&A questions, quiz) get a bounded decode retry: when
//! the model's output does not decode, the prompt is amended with the decode
//! error and sent again. Transport failures are returned as-is.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::error::{DecodeError, GenerationError, GenerationResult, TransportError};
use crate::llm::{drain_stream, generate, generate_stream, generate_structured, Generator};
use crate::prompts::{
    bindings, format_prompt, DECODE_RETRY_AMENDMENT, NOTES_PROMPT, QNA_ANSWER_PROMPT,
    QNA_QUESTIONS_PROMPT, QUIZ_PROMPT,
};
use crate::schema::{
    qna_questions_schema, questions_from_decoded, quiz_from_decoded, quiz_schema, Decoded,
    DecodedQuiz, Schema,
};

/// Default number of extra attempts for output that fails to decode.
pub const DEFAULT_DECODE_RETRIES: u32 = 1;

/// Kind of content a request produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Notes,
    QnaQuestions,
    /// Answer to one Q&A question; the request's `topics` carries the question.
    QnaAnswer,
    Quiz,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Notes => "notes",
            TaskKind::QnaQuestions => "qna_questions",
            TaskKind::QnaAnswer => "qna_answer",
            TaskKind::Quiz => "quiz",
        }
    }

    pub fn template(&self) -> &'static str {
        match self {
            TaskKind::Notes => NOTES_PROMPT,
            TaskKind::QnaQuestions => QNA_QUESTIONS_PROMPT,
            TaskKind::QnaAnswer => QNA_ANSWER_PROMPT,
            TaskKind::Quiz => QUIZ_PROMPT,
        }
    }

    /// Placeholder the template expects the request text under.
    pub fn variable(&self) -> &'static str {
        match self {
            TaskKind::QnaAnswer => "question",
            _ => "topics",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request for generated content.
#[derive(Clone, PartialEq)]
pub struct GenerationRequest {
    pub kind: TaskKind,
    pub topics: String,
    pub credential: String,
}

impl fmt::Debug for GenerationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationRequest")
            .field("kind", &self.kind)
            .field("topics", &self.topics)
            .field("credential", &"<redacted>")
            .finish()
    }
}

impl GenerationRequest {
    pub fn new(kind: TaskKind, topics: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            kind,
            topics: topics.into(),
            credential: credential.into(),
        }
    }

    /// Check dispatch preconditions: non-blank topics and credential.
    pub fn validate(&self) -> GenerationResult<()> {
        if self.topics.trim().is_empty() {
            return Err(GenerationError::precondition(
                self.kind.variable(),
                "enter at least one topic before generating content",
            ));
        }
        if self.credential.trim().is_empty() {
            return Err(GenerationError::precondition(
                "credential",
                "an API key is required before generating content",
            ));
        }
        Ok(())
    }

    /// The formatted instruction for this request.
    pub fn prompt(&self) -> GenerationResult<String> {
        let prompt = format_prompt(
            self.kind.template(),
            &bindings([(self.kind.variable(), self.topics.trim())]),
        )?;
        Ok(prompt)
    }
}

/// Produces notes, Q&A and quizzes from topics.
#[derive(Clone)]
pub struct ContentPipeline {
    generator: Arc<dyn Generator>,
    decode_retries: u32,
}

impl ContentPipeline {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self {
            generator,
            decode_retries: DEFAULT_DECODE_RETRIES,
        }
    }

    /// Set how many times undecodable structured output is re-requested.
    pub fn with_decode_retries(mut self, decode_retries: u32) -> Self {
        self.decode_retries = decode_retries;
        self
    }

    /// Notes as markdown.
    pub async fn notes(&self, topics: &str, credential: &str) -> GenerationResult<String> {
        let request = GenerationRequest::new(TaskKind::Notes, topics, credential);
        self.text(&request).await
    }

    /// Notes as markdown, handing fragments to `sink` as they arrive.
    pub async fn notes_stream(
        &self,
        topics: &str,
        credential: &str,
        sink: &mut (dyn FnMut(&str) + Send),
    ) -> GenerationResult<String> {
        let request = GenerationRequest::new(TaskKind::Notes, topics, credential);
        self.text_stream(&request, sink).await
    }

    /// Open-ended questions covering `topics`.
    pub async fn qna_questions(
        &self,
        topics: &str,
        credential: &str,
    ) -> GenerationResult<Vec<String>> {
        let request = GenerationRequest::new(TaskKind::QnaQuestions, topics, credential);
        self.structured(&request, &qna_questions_schema(), questions_from_decoded)
            .await
    }

    /// Markdown answer to one question.
    pub async fn qna_answer(&self, question: &str, credential: &str) -> GenerationResult<String> {
        let request = GenerationRequest::new(TaskKind::QnaAnswer, question, credential);
        self.text(&request).await
    }

    /// Markdown answer to one question, streamed to `sink`.
    pub async fn qna_answer_stream(
        &self,
        question: &str,
        credential: &str,
        sink: &mut (dyn FnMut(&str) + Send),
    ) -> GenerationResult<String> {
        let request = GenerationRequest::new(TaskKind::QnaAnswer, question, credential);
        self.text_stream(&request, sink).await
    }

    /// Multiple-choice quiz on `topics`.
    pub async fn quiz(&self, topics: &str, credential: &str) -> GenerationResult<DecodedQuiz> {
        let request = GenerationRequest::new(TaskKind::Quiz, topics, credential);
        let quiz = self
            .structured(&request, &quiz_schema(), quiz_from_decoded)
            .await?;
        if !quiz.warnings.is_empty() {
            warn!(
                questions = quiz.questions.len(),
                warnings = quiz.warnings.len(),
                "Quiz decoded with ambiguous answer keys"
            );
        }
        Ok(quiz)
    }

    async fn text(&self, request: &GenerationRequest) -> GenerationResult<String> {
        request.validate()?;
        let prompt = request.prompt()?;
        let start = Instant::now();

        let text = generate(self.generator.as_ref(), &prompt, &request.credential, None)
            .await?
            .into_text()
            .ok_or_else(|| TransportError::InvalidResponse {
                message: "expected free-form text".to_string(),
            })?;

        info!(
            task = %request.kind,
            chars = text.len(),
            latency_ms = start.elapsed().as_millis(),
            "Generated content"
        );
        Ok(text)
    }

    async fn text_stream(
        &self,
        request: &GenerationRequest,
        sink: &mut (dyn FnMut(&str) + Send),
    ) -> GenerationResult<String> {
        request.validate()?;
        let prompt = request.prompt()?;
        let start = Instant::now();

        let stream = generate_stream(self.generator.as_ref(), &prompt, &request.credential).await?;
        let text = drain_stream(stream, sink).await?;

        info!(
            task = %request.kind,
            chars = text.len(),
            latency_ms = start.elapsed().as_millis(),
            "Streamed content"
        );
        Ok(text)
    }

    async fn structured<T>(
        &self,
        request: &GenerationRequest,
        schema: &Schema,
        convert: fn(Decoded) -> Result<T, DecodeError>,
    ) -> GenerationResult<T> {
        request.validate()?;
        let base_prompt = request.prompt()?;
        let mut prompt = base_prompt.clone();
        let mut attempt = 0;
        let start = Instant::now();

        loop {
            let result =
                generate_structured(self.generator.as_ref(), &prompt, &request.credential, schema)
                    .await
                    .and_then(|decoded| convert(decoded).map_err(GenerationError::from));

            match result {
                Err(GenerationError::Decode(e)) if attempt < self.decode_retries => {
                    attempt += 1;
                    warn!(
                        task = %request.kind,
                        attempt,
                        error = %e,
                        "Structured output did not decode, retrying"
                    );
                    let error = e.to_string();
                    let amendment =
                        format_prompt(DECODE_RETRY_AMENDMENT, &bindings([("error", error.as_str())]))?;
                    prompt = format!("{}{}", base_prompt, amendment);
                }
                Ok(value) => {
                    info!(
                        task = %request.kind,
                        attempts = attempt + 1,
                        latency_ms = start.elapsed().as_millis(),
                        "Generated structured content"
                    );
                    return Ok(value);
                }
                Err(e) => return Err(e),
            }
        }
    }
}
