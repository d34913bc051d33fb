//! Quiz state machine.
//!
//! [`QuizState`] moves `NotStarted → InProgress → Completed`. Transitions are
//! pure: they borrow the current state and return the next one, leaving
//! persistence to the caller through [`QuizState::delta`]. Progress is
//! monotonic; there is no way to go back or retry a question.

mod item;

pub use item::*;

use serde::Serialize;
use std::collections::BTreeSet;

use crate::error::{AppResult, QuizError, QuizResult, SessionResult};
use crate::session::{Delta, SessionContext, SessionKey};

/// Session keys owned by the quiz.
pub const QUIZ_KEYS: [SessionKey; 5] = [
    SessionKey::QuizQuestions,
    SessionKey::QuizCurrentIndex,
    SessionKey::QuizScore,
    SessionKey::QuizAttempted,
    SessionKey::QuizCompleted,
];

/// Coarse lifecycle phase of a quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizPhase {
    NotStarted,
    InProgress,
    Completed,
}

/// Quiz progress for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuizState {
    questions: Option<Vec<QuestionItem>>,
    current_index: usize,
    score: usize,
    attempted: BTreeSet<usize>,
    completed: bool,
}

/// `attempted` out of `total`, plus the same as a fraction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub attempted: usize,
    pub total: usize,
    pub fraction: f64,
}

/// One selectable option as shown to the user; never carries correctness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionLabel {
    pub letter: String,
    pub label: String,
}

/// What the render layer shows for the quiz.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum QuizView {
    /// No quiz yet; show the generate trigger.
    NotStarted,
    InProgress {
        /// One-based question number.
        number: usize,
        question: String,
        options: Vec<OptionLabel>,
        progress: Progress,
    },
    Completed {
        score: usize,
        total: usize,
        progress: Progress,
    },
}

impl QuizState {
    /// Fresh state: no questions, nothing attempted.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> QuizPhase {
        match (&self.questions, self.completed) {
            (None, _) => QuizPhase::NotStarted,
            (Some(_), false) => QuizPhase::InProgress,
            (Some(_), true) => QuizPhase::Completed,
        }
    }

    pub fn questions(&self) -> Option<&[QuestionItem]> {
        self.questions.as_deref()
    }

    /// Number of questions, zero before the quiz starts.
    pub fn len(&self) -> usize {
        self.questions.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn score(&self) -> usize {
        self.score
    }

    pub fn attempted(&self) -> &BTreeSet<usize> {
        &self.attempted
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// The question awaiting an answer, if the quiz is in progress.
    pub fn current_question(&self) -> Option<&QuestionItem> {
        match self.phase() {
            QuizPhase::InProgress => self.questions.as_ref()?.get(self.current_index),
            _ => None,
        }
    }

    pub fn progress(&self) -> Progress {
        let total = self.len();
        let attempted = self.attempted.len();
        let fraction = if total == 0 {
            0.0
        } else {
            attempted as f64 / total as f64
        };
        Progress {
            attempted,
            total,
            fraction,
        }
    }

    /// Install a freshly generated question list.
    pub fn start(&self, questions: Vec<QuestionItem>) -> QuizResult<QuizState> {
        if self.phase() != QuizPhase::NotStarted {
            return Err(QuizError::AlreadyStarted);
        }
        if questions.is_empty() {
            return Err(QuizError::NoQuestions);
        }
        if let Some(index) = questions.iter().position(|q| q.options.is_empty()) {
            return Err(QuizError::NoOptions { index });
        }
        Ok(QuizState {
            questions: Some(questions),
            ..QuizState::default()
        })
    }

    /// Answer the current question with `selected` and move to the next one.
    ///
    /// An unknown label is rejected without changing anything.
    pub fn advance(&self, selected: &str) -> QuizResult<QuizState> {
        let questions = match self.phase() {
            QuizPhase::NotStarted => return Err(QuizError::NotStarted),
            QuizPhase::Completed => return Err(QuizError::AlreadyCompleted),
            QuizPhase::InProgress => self.questions.as_deref().unwrap_or_default(),
        };

        let question = questions
            .get(self.current_index)
            .ok_or(QuizError::AlreadyCompleted)?;
        let is_correct =
            question
                .options
                .is_correct(selected)
                .ok_or_else(|| QuizError::UnknownOption {
                    index: self.current_index,
                    label: selected.to_string(),
                })?;

        let mut next = self.clone();
        if is_correct {
            next.score += 1;
        }
        next.attempted.insert(self.current_index);
        next.current_index += 1;
        if next.current_index == questions.len() {
            next.completed = true;
        }
        Ok(next)
    }

    /// Reject states no sequence of transitions could have produced.
    pub fn check_invariants(&self) -> QuizResult<()> {
        let inconsistent = |reason: String| Err(QuizError::Inconsistent { reason });

        let Some(questions) = &self.questions else {
            if self.current_index != 0
                || self.score != 0
                || !self.attempted.is_empty()
                || self.completed
            {
                return inconsistent("progress recorded without questions".to_string());
            }
            return Ok(());
        };

        if questions.is_empty() {
            return inconsistent("question list is empty".to_string());
        }
        if let Some(index) = questions.iter().position(|q| q.options.is_empty()) {
            return inconsistent(format!("question {} has no options", index));
        }
        if self.current_index > questions.len() {
            return inconsistent(format!(
                "current index {} exceeds {} questions",
                self.current_index,
                questions.len()
            ));
        }
        if self.score > self.attempted.len() || self.attempted.len() > self.current_index {
            return inconsistent(format!(
                "score {} / attempted {} / index {} are not ordered",
                self.score,
                self.attempted.len(),
                self.current_index
            ));
        }
        if self.attempted.iter().any(|&i| i >= self.current_index) {
            return inconsistent("attempted index beyond current question".to_string());
        }
        if self.completed != (self.current_index == questions.len()) {
            return inconsistent(format!(
                "completed flag {} disagrees with index {} of {}",
                self.completed,
                self.current_index,
                questions.len()
            ));
        }
        Ok(())
    }

    /// Rebuild the quiz from its session slots.
    pub async fn load(ctx: &SessionContext) -> AppResult<QuizState> {
        let state = QuizState {
            questions: ctx.get(SessionKey::QuizQuestions).await?,
            current_index: ctx.get(SessionKey::QuizCurrentIndex).await?,
            score: ctx.get(SessionKey::QuizScore).await?,
            attempted: ctx.get(SessionKey::QuizAttempted).await?,
            completed: ctx.get(SessionKey::QuizCompleted).await?,
        };
        state.check_invariants()?;
        Ok(state)
    }

    /// Slot writes that turn `self` into `next`; unchanged fields are omitted.
    pub fn delta(&self, next: &QuizState) -> SessionResult<Delta> {
        let mut delta = Delta::new();
        if self.questions != next.questions {
            delta.set(SessionKey::QuizQuestions, &next.questions)?;
        }
        if self.current_index != next.current_index {
            delta.set(SessionKey::QuizCurrentIndex, &next.current_index)?;
        }
        if self.score != next.score {
            delta.set(SessionKey::QuizScore, &next.score)?;
        }
        if self.attempted != next.attempted {
            delta.set(SessionKey::QuizAttempted, &next.attempted)?;
        }
        if self.completed != next.completed {
            delta.set(SessionKey::QuizCompleted, &next.completed)?;
        }
        Ok(delta)
    }

    /// Slot writes that discard the quiz entirely.
    pub fn reset_delta() -> Delta {
        let mut delta = Delta::new();
        for key in QUIZ_KEYS {
            delta.reset(key);
        }
        delta
    }

    /// Read-only projection for rendering.
    pub fn view(&self) -> QuizView {
        match self.phase() {
            QuizPhase::NotStarted => QuizView::NotStarted,
            QuizPhase::Completed => QuizView::Completed {
                score: self.score,
                total: self.len(),
                progress: self.progress(),
            },
            QuizPhase::InProgress => match self.current_question() {
                Some(question) => QuizView::InProgress {
                    number: self.current_index + 1,
                    question: question.question.clone(),
                    options: question
                        .options
                        .labels()
                        .enumerate()
                        .map(|(i, label)| OptionLabel {
                            letter: option_letter(i),
                            label: label.to_string(),
                        })
                        .collect(),
                    progress: self.progress(),
                },
                None => QuizView::NotStarted,
            },
        }
    }
}

/// Spreadsheet-style letters: A..Z, AA, AB, ...
pub fn option_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}
