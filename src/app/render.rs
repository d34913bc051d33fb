use serde::Serialize;

use super::Page;
use crate::error::GenerationError;
use crate::quiz::QuizView;
use crate::schema::SchemaViolationWarning;

/// Output of a pass. A pure function of the committed session state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum Render {
    Home {
        configured: bool,
        topics: String,
    },
    /// Topics or credential missing; nothing was generated.
    NeedsConfig {
        page: Page,
        missing: Vec<String>,
    },
    /// `content` is `None` until notes are generated.
    Notes {
        content: Option<String>,
    },
    Qna {
        pairs: Option<Vec<QnaPair>>,
    },
    Quiz {
        quiz: QuizView,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        warnings: Vec<SchemaViolationWarning>,
    },
    /// The session was ended; the next event starts from defaults.
    SessionEnded,
    /// Generation failed; the session is unchanged.
    Failure {
        page: Page,
        kind: FailureKind,
        message: String,
        retryable: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transport,
    Decode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QnaPair {
    pub question: String,
    pub answer: String,
}

/// A piece of content streamed while a pass is generating it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fragment {
    pub page: Page,
    /// Q&A question the fragment answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    pub text: String,
}

/// Result of a single reducer invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum PassOutcome {
    Rendered(Render),
    /// State was committed; run again with `view` to show it.
    Rerun,
}

impl Render {
    /// Render for a generation failure. Precondition and template errors are
    /// not failures of the model and yield `None`.
    pub fn failure(page: Page, error: &GenerationError) -> Option<Render> {
        let kind = match error {
            GenerationError::Transport(_) => FailureKind::Transport,
            GenerationError::Decode(_) => FailureKind::Decode,
            GenerationError::Precondition { .. } | GenerationError::Template(_) => return None,
        };
        Some(Render::Failure {
            page,
            kind,
            message: error.to_string(),
            retryable: error.is_retryable(),
        })
    }
}
