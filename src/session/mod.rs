//! Per-session keyed state that survives between passes.
//!
//! A [`SessionStore`] maps `(session id, key)` to a JSON value. Components
//! never touch a store directly; they receive a [`SessionContext`] bound to
//! one session, so state can never leak across sessions and tests can build
//! isolated contexts.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;

use crate::config::{SessionBackend, SessionConfig};
use crate::error::{SessionError, SessionResult};

/// Every slot the application reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKey {
    /// Comma-separated topics entered by the user.
    Topics,
    /// Model API key entered by the user.
    Credential,
    /// Generated notes markdown, `null` until generated.
    NotesContent,
    /// Generated Q&A questions, `null` until generated.
    QnaQuestions,
    /// Answers to `QnaQuestions`, same length, `null` until generated.
    QnaAnswers,
    /// Decoded quiz questions, `null` until generated.
    QuizQuestions,
    QuizCurrentIndex,
    QuizScore,
    QuizAttempted,
    QuizCompleted,
}

impl SessionKey {
    /// All keys, in bootstrap order.
    pub const ALL: [SessionKey; 10] = [
        SessionKey::Topics,
        SessionKey::Credential,
        SessionKey::NotesContent,
        SessionKey::QnaQuestions,
        SessionKey::QnaAnswers,
        SessionKey::QuizQuestions,
        SessionKey::QuizCurrentIndex,
        SessionKey::QuizScore,
        SessionKey::QuizAttempted,
        SessionKey::QuizCompleted,
    ];

    /// Storage name of the slot.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKey::Topics => "topics",
            SessionKey::Credential => "credential",
            SessionKey::NotesContent => "notes_content",
            SessionKey::QnaQuestions => "qna_questions",
            SessionKey::QnaAnswers => "qna_answers",
            SessionKey::QuizQuestions => "quiz_questions",
            SessionKey::QuizCurrentIndex => "quiz_current_index",
            SessionKey::QuizScore => "quiz_score",
            SessionKey::QuizAttempted => "quiz_attempted",
            SessionKey::QuizCompleted => "quiz_completed",
        }
    }

    /// Value written by [`SessionContext::bootstrap`].
    pub fn default_value(&self) -> Value {
        match self {
            SessionKey::Topics | SessionKey::Credential => json!(""),
            SessionKey::NotesContent
            | SessionKey::QnaQuestions
            | SessionKey::QnaAnswers
            | SessionKey::QuizQuestions => Value::Null,
            SessionKey::QuizCurrentIndex | SessionKey::QuizScore => json!(0),
            SessionKey::QuizAttempted => json!([]),
            SessionKey::QuizCompleted => json!(false),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend for session slots.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Read a slot; fails with [`SessionError::MissingKey`] if it was never set.
    async fn get(&self, session_id: &str, key: &str) -> SessionResult<Value>;
    /// Write a slot.
    async fn set(&self, session_id: &str, key: &str, value: Value) -> SessionResult<()>;
    /// Whether a slot has been set.
    async fn has(&self, session_id: &str, key: &str) -> SessionResult<bool>;
    /// Write several slots atomically: either all entries land or none do.
    async fn set_many(&self, session_id: &str, entries: Vec<(String, Value)>)
        -> SessionResult<()>;
    /// Remove a slot. Removing an absent slot is not an error.
    async fn remove(&self, session_id: &str, key: &str) -> SessionResult<()>;
    /// Drop every slot of a session.
    async fn end_session(&self, session_id: &str) -> SessionResult<()>;
}

/// Open the store selected by configuration.
pub async fn open_store(config: &SessionConfig) -> SessionResult<Arc<dyn SessionStore>> {
    match config.backend {
        SessionBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        SessionBackend::Sqlite => Ok(Arc::new(SqliteStore::new(&config.database).await?)),
    }
}

/// A store handle bound to one session.
#[derive(Clone)]
pub struct SessionContext {
    id: String,
    store: Arc<dyn SessionStore>,
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext").field("id", &self.id).finish()
    }
}

impl SessionContext {
    pub fn new(id: impl Into<String>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            id: id.into(),
            store,
        }
    }

    /// Session identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Initialize every slot that has not been set yet with its default.
    ///
    /// Slots that already hold a value are left untouched, so bootstrapping
    /// on every pass is safe.
    pub async fn bootstrap(&self) -> SessionResult<()> {
        let mut missing = Vec::new();
        for key in SessionKey::ALL {
            if !self.store.has(&self.id, key.as_str()).await? {
                missing.push((key.as_str().to_string(), key.default_value()));
            }
        }
        if !missing.is_empty() {
            tracing::debug!(session_id = %self.id, slots = missing.len(), "Bootstrapping session slots");
            self.store.set_many(&self.id, missing).await?;
        }
        Ok(())
    }

    /// Read a raw slot value.
    pub async fn get_value(&self, key: SessionKey) -> SessionResult<Value> {
        self.store.get(&self.id, key.as_str()).await
    }

    /// Read and deserialize a slot.
    pub async fn get<T: DeserializeOwned>(&self, key: SessionKey) -> SessionResult<T> {
        let value = self.get_value(key).await?;
        serde_json::from_value(value).map_err(|e| SessionError::Codec {
            key: key.to_string(),
            message: e.to_string(),
        })
    }

    /// Serialize and write a single slot.
    pub async fn set<T: Serialize>(&self, key: SessionKey, value: &T) -> SessionResult<()> {
        let value = encode(key, value)?;
        self.store.set(&self.id, key.as_str(), value).await
    }

    pub async fn has(&self, key: SessionKey) -> SessionResult<bool> {
        self.store.has(&self.id, key.as_str()).await
    }

    /// Atomically write a set of changes. An empty delta is a no-op.
    pub async fn commit(&self, delta: Delta) -> SessionResult<()> {
        if delta.is_empty() {
            return Ok(());
        }
        tracing::debug!(
            session_id = %self.id,
            keys = ?delta.keys(),
            "Committing session delta"
        );
        let entries = delta
            .entries
            .into_iter()
            .map(|(k, v)| (k.as_str().to_string(), v))
            .collect();
        self.store.set_many(&self.id, entries).await
    }

    /// End the session, dropping all of its slots.
    pub async fn end(&self) -> SessionResult<()> {
        self.store.end_session(&self.id).await
    }
}

/// Pending slot writes, committed together by [`SessionContext::commit`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Delta {
    entries: Vec<(SessionKey, Value)>,
}

impl Delta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a write, replacing an earlier staged write to the same key.
    pub fn set<T: Serialize>(&mut self, key: SessionKey, value: &T) -> SessionResult<()> {
        let value = encode(key, value)?;
        self.set_value(key, value);
        Ok(())
    }

    /// Stage a raw value.
    pub fn set_value(&mut self, key: SessionKey, value: Value) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Stage a reset of `key` to its bootstrap default.
    pub fn reset(&mut self, key: SessionKey) {
        self.set_value(key, key.default_value());
    }

    /// Merge another delta; its writes win.
    pub fn extend(&mut self, other: Delta) {
        for (key, value) in other.entries {
            self.set_value(key, value);
        }
    }

    pub fn keys(&self) -> Vec<SessionKey> {
        self.entries.iter().map(|(k, _)| *k).collect()
    }

    pub fn get(&self, key: SessionKey) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

fn encode<T: Serialize>(key: SessionKey, value: &T) -> SessionResult<Value> {
    serde_json::to_value(value).map_err(|e| SessionError::Codec {
        key: key.to_string(),
        message: e.to_string(),
    })
}
