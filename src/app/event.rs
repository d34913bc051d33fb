use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level page a pass runs for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Page {
    Home,
    Notes,
    Qna,
    Quiz,
}

impl Page {
    pub fn as_str(&self) -> &'static str {
        match self {
            Page::Home => "home",
            Page::Notes => "notes",
            Page::Qna => "qna",
            Page::Quiz => "quiz",
        }
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the user did.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Plain render, also used for reruns.
    View,
    SubmitConfig {
        topics: String,
        credential: String,
    },
    Generate,
    Answer {
        option: String,
    },
    /// Drop the page's cached content.
    Discard,
    /// Log out: every slot of the session is removed.
    EndSession,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::View => "view",
            Action::SubmitConfig { .. } => "submit_config",
            Action::Generate => "generate",
            Action::Answer { .. } => "answer",
            Action::Discard => "discard",
            Action::EndSession => "end_session",
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::SubmitConfig { topics, .. } => f
                .debug_struct("SubmitConfig")
                .field("topics", topics)
                .field("credential", &"<redacted>")
                .finish(),
            Action::Answer { option } => f.debug_struct("Answer").field("option", option).finish(),
            other => f.write_str(other.name()),
        }
    }
}

/// One user interaction, the input of a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub page: Page,
    pub action: Action,
}

impl Event {
    pub fn new(page: Page, action: Action) -> Self {
        Self { page, action }
    }

    pub fn view(page: Page) -> Self {
        Self::new(page, Action::View)
    }
}
