use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Quiz error: {0}")]
    Quiz(#[from] QuizError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Session store errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session slot '{key}' was read before it was initialized")]
    MissingKey { key: String },

    #[error("Session slot '{key}' holds an unexpected value: {message}")]
    Codec { key: String, message: String },

    #[error("Session storage failed: {message}")]
    Storage { message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Errors raised while producing generated content.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Topics or credential missing; nothing was dispatched.
    #[error("Missing {field}: {reason}")]
    Precondition { field: String, reason: String },

    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("Model output did not match the expected structure: {0}")]
    Decode(#[from] DecodeError),

    #[error("Prompt could not be built: {0}")]
    Template(#[from] TemplateError),
}

/// Network, authentication and rate-limit failures from the model endpoint
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Credential rejected ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("Rate limited: {message}")]
    RateLimited { message: String },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Model endpoint unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Stream interrupted: {message}")]
    Stream { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Structured decoding failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("No JSON found in model output. First 100 chars: '{preview}'")]
    NoJson { preview: String },

    #[error("Invalid JSON: {message}")]
    Syntax { message: String },

    #[error("Expected {expected} at {path}, found {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },

    #[error("Missing field '{field}' at {path}")]
    MissingField { path: String, field: String },

    #[error("Expected at least one element at {path}")]
    Empty { path: String },
}

/// Prompt template errors. These indicate a template and its call site are out of sync.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("No value bound for placeholder '{name}'")]
    MissingVariable { name: String },

    #[error("Malformed template at byte {position}: {reason}")]
    Malformed { position: usize, reason: String },
}

/// Invalid quiz transitions and inconsistent persisted quiz state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuizError {
    #[error("Quiz has not been started")]
    NotStarted,

    #[error("Quiz has already been started")]
    AlreadyStarted,

    #[error("Quiz is already completed")]
    AlreadyCompleted,

    #[error("Cannot start a quiz without questions")]
    NoQuestions,

    #[error("Question {index} has no options to choose from")]
    NoOptions { index: usize },

    #[error("Option '{label}' does not belong to question {index}")]
    UnknownOption { index: usize, label: String },

    #[error("Persisted quiz state is inconsistent: {reason}")]
    Inconsistent { reason: String },
}

impl GenerationError {
    /// Shorthand for a precondition failure on `field`.
    pub fn precondition(field: impl Into<String>, reason: impl Into<String>) -> Self {
        GenerationError::Precondition {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether retrying the same request can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerationError::Precondition { .. } | GenerationError::Template(_) => false,
            GenerationError::Decode(_) => true,
            GenerationError::Transport(e) => !matches!(e, TransportError::Unauthorized { .. }),
        }
    }
}

impl TransportError {
    /// Transient failures worth another attempt under a bounded retry policy.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::RateLimited { .. }
            | TransportError::Timeout { .. }
            | TransportError::Http(_) => true,
            TransportError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for session store operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Result type alias for generation operations
pub type GenerationResult<T> = Result<T, GenerationError>;

/// Result type alias for quiz transitions
pub type QuizResult<T> = Result<T, QuizError>;
