//! The pass reducer.
//!
//! Every user interaction is one [`Event`]. [`App::pass`] reads the
//! committed session state, applies the event, commits any mutation in a
//! single delta and either renders or asks for a rerun. [`App::handle`] is the
//! outer loop: it bootstraps the session and re-invokes the reducer with
//! `view` after each committed mutation, so the render always reflects the
//! state the next pass will see.

mod event;
mod render;

pub use event::{Action, Event, Page};
pub use render::{FailureKind, Fragment, PassOutcome, QnaPair, Render};

use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult, GenerationError};
use crate::pipeline::ContentPipeline;
use crate::quiz::{QuizPhase, QuizState};
use crate::schema::answer_key_warnings;
use crate::session::{Delta, SessionContext, SessionKey};

/// Reruns allowed per handled event.
pub const MAX_RERUNS: usize = 3;

/// Receives streamed fragments during a pass.
pub type FragmentSink<'a> = &'a mut (dyn FnMut(Fragment) + Send);

/// Runs passes against a session.
#[derive(Clone)]
pub struct App {
    pipeline: ContentPipeline,
}

/// Topics and credential as entered by the user.
struct UserConfig {
    topics: String,
    credential: String,
}

impl UserConfig {
    async fn load(ctx: &SessionContext) -> AppResult<Self> {
        Ok(Self {
            topics: ctx.get(SessionKey::Topics).await?,
            credential: ctx.get(SessionKey::Credential).await?,
        })
    }

    fn missing(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.topics.trim().is_empty() {
            missing.push(SessionKey::Topics.to_string());
        }
        if self.credential.trim().is_empty() {
            missing.push(SessionKey::Credential.to_string());
        }
        missing
    }
}

impl App {
    pub fn new(pipeline: ContentPipeline) -> Self {
        Self { pipeline }
    }

    /// Handle one event: bootstrap, run the reducer, rerun after commits.
    pub async fn handle(
        &self,
        ctx: &SessionContext,
        event: Event,
        sink: FragmentSink<'_>,
    ) -> AppResult<Render> {
        ctx.bootstrap().await?;

        info!(
            session_id = %ctx.id(),
            page = %event.page,
            action = event.action.name(),
            "Handling event"
        );

        let mut event = event;
        let mut reruns = 0;
        loop {
            match self.pass(ctx, &event, &mut *sink).await? {
                PassOutcome::Rendered(render) => return Ok(render),
                PassOutcome::Rerun => {
                    reruns += 1;
                    if reruns > MAX_RERUNS {
                        return Err(AppError::Internal {
                            message: format!("exceeded {} reruns for one event", MAX_RERUNS),
                        });
                    }
                    debug!(session_id = %ctx.id(), page = %event.page, reruns, "Rerunning pass");
                    event = Event::view(event.page);
                }
            }
        }
    }

    /// One reducer invocation against committed state.
    pub async fn pass(
        &self,
        ctx: &SessionContext,
        event: &Event,
        sink: FragmentSink<'_>,
    ) -> AppResult<PassOutcome> {
        if let Action::SubmitConfig { topics, credential } = &event.action {
            let mut delta = Delta::new();
            delta.set(SessionKey::Topics, &topics.trim())?;
            delta.set(SessionKey::Credential, &credential.trim())?;
            ctx.commit(delta).await?;
            info!(session_id = %ctx.id(), "Stored topics and credential");
            return Ok(PassOutcome::Rerun);
        }
        if event.action == Action::EndSession {
            ctx.end().await?;
            info!(session_id = %ctx.id(), "Session ended");
            return Ok(PassOutcome::Rendered(Render::SessionEnded));
        }

        let config = UserConfig::load(ctx).await?;
        let missing = config.missing();

        match event.page {
            Page::Home => Ok(PassOutcome::Rendered(Render::Home {
                configured: missing.is_empty(),
                topics: config.topics,
            })),
            page if !missing.is_empty() => {
                Ok(PassOutcome::Rendered(Render::NeedsConfig { page, missing }))
            }
            Page::Notes => self.notes(ctx, &config, &event.action, sink).await,
            Page::Qna => self.qna(ctx, &config, &event.action, sink).await,
            Page::Quiz => self.quiz(ctx, &config, &event.action).await,
        }
    }

    async fn notes(
        &self,
        ctx: &SessionContext,
        config: &UserConfig,
        action: &Action,
        sink: FragmentSink<'_>,
    ) -> AppResult<PassOutcome> {
        let content: Option<String> = ctx.get(SessionKey::NotesContent).await?;

        match (action, content) {
            (Action::Generate, None) => {
                let mut forward = |text: &str| {
                    sink(Fragment {
                        page: Page::Notes,
                        index: None,
                        text: text.to_string(),
                    })
                };
                let result = self
                    .pipeline
                    .notes_stream(&config.topics, &config.credential, &mut forward)
                    .await;

                match result {
                    Ok(notes) => {
                        ctx.set(SessionKey::NotesContent, &notes).await?;
                        Ok(PassOutcome::Rerun)
                    }
                    Err(e) => failed(Page::Notes, e),
                }
            }
            (Action::Discard, Some(_)) => {
                ctx.set(SessionKey::NotesContent, &SessionKey::NotesContent.default_value())
                    .await?;
                Ok(PassOutcome::Rerun)
            }
            (_, content) => Ok(PassOutcome::Rendered(Render::Notes { content })),
        }
    }

    async fn qna(
        &self,
        ctx: &SessionContext,
        config: &UserConfig,
        action: &Action,
        sink: FragmentSink<'_>,
    ) -> AppResult<PassOutcome> {
        let questions: Option<Vec<String>> = ctx.get(SessionKey::QnaQuestions).await?;
        let answers: Option<Vec<String>> = ctx.get(SessionKey::QnaAnswers).await?;

        match (action, questions) {
            (Action::Generate, None) => {
                let result = self.generate_qna(config, sink).await;
                match result {
                    Ok((questions, answers)) => {
                        let mut delta = Delta::new();
                        delta.set(SessionKey::QnaQuestions, &questions)?;
                        delta.set(SessionKey::QnaAnswers, &answers)?;
                        ctx.commit(delta).await?;
                        Ok(PassOutcome::Rerun)
                    }
                    Err(e) => failed(Page::Qna, e),
                }
            }
            (Action::Discard, Some(_)) => {
                let mut delta = Delta::new();
                delta.reset(SessionKey::QnaQuestions);
                delta.reset(SessionKey::QnaAnswers);
                ctx.commit(delta).await?;
                Ok(PassOutcome::Rerun)
            }
            (_, questions) => {
                let pairs = match (questions, answers) {
                    (Some(questions), Some(answers)) if questions.len() == answers.len() => Some(
                        questions
                            .into_iter()
                            .zip(answers)
                            .map(|(question, answer)| QnaPair { question, answer })
                            .collect(),
                    ),
                    (None, None) => None,
                    _ => {
                        return Err(AppError::Internal {
                            message: "stored Q&A questions and answers do not line up"
                                .to_string(),
                        })
                    }
                };
                Ok(PassOutcome::Rendered(Render::Qna { pairs }))
            }
        }
    }

    /// Questions first, then one streamed answer per question.
    async fn generate_qna(
        &self,
        config: &UserConfig,
        sink: FragmentSink<'_>,
    ) -> Result<(Vec<String>, Vec<String>), GenerationError> {
        let questions = self
            .pipeline
            .qna_questions(&config.topics, &config.credential)
            .await?;

        let mut answers = Vec::with_capacity(questions.len());
        for (index, question) in questions.iter().enumerate() {
            let mut forward = |text: &str| {
                sink(Fragment {
                    page: Page::Qna,
                    index: Some(index),
                    text: text.to_string(),
                })
            };
            let answer = self
                .pipeline
                .qna_answer_stream(question, &config.credential, &mut forward)
                .await?;
            answers.push(answer);
        }
        Ok((questions, answers))
    }

    async fn quiz(
        &self,
        ctx: &SessionContext,
        config: &UserConfig,
        action: &Action,
    ) -> AppResult<PassOutcome> {
        let state = QuizState::load(ctx).await?;

        match action {
            Action::Generate if state.phase() == QuizPhase::NotStarted => {
                match self.pipeline.quiz(&config.topics, &config.credential).await {
                    Ok(quiz) => {
                        let next = state.start(quiz.questions)?;
                        ctx.commit(state.delta(&next)?).await?;
                        info!(session_id = %ctx.id(), questions = next.len(), "Quiz started");
                        Ok(PassOutcome::Rerun)
                    }
                    Err(e) => failed(Page::Quiz, e),
                }
            }
            Action::Answer { option } => {
                let next = state.advance(option)?;
                info!(
                    session_id = %ctx.id(),
                    question = state.current_index(),
                    correct = next.score() > state.score(),
                    completed = next.is_completed(),
                    "Quiz answer recorded"
                );
                ctx.commit(state.delta(&next)?).await?;
                Ok(PassOutcome::Rerun)
            }
            Action::Discard if state.phase() != QuizPhase::NotStarted => {
                ctx.commit(QuizState::reset_delta()).await?;
                Ok(PassOutcome::Rerun)
            }
            _ => Ok(PassOutcome::Rendered(Render::Quiz {
                quiz: state.view(),
                warnings: state.questions().map(answer_key_warnings).unwrap_or_default(),
            })),
        }
    }
}

fn failed(page: Page, error: GenerationError) -> AppResult<PassOutcome> {
    match Render::failure(page, &error) {
        Some(render) => {
            warn!(page = %page, error = %error, "Generation failed, session left unchanged");
            Ok(PassOutcome::Rendered(render))
        }
        None => Err(error.into()),
    }
}
