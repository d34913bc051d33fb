use serde::Serialize;
use std::fmt;
use tracing::warn;

use super::{decode, Decoded, Field, Schema};
use crate::error::DecodeError;
use crate::quiz::{OptionSet, QuestionItem};

/// Field holding the model's free-form reasoning; dropped by projection.
pub const THINKING_FIELD: &str = "thinking_content";
/// Field holding the payload callers actually use.
pub const RESPONSE_FIELD: &str = "response_content";

/// A decoded quiz together with any advisory warnings.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedQuiz {
    pub questions: Vec<QuestionItem>,
    pub warnings: Vec<SchemaViolationWarning>,
}

/// A question that does not have exactly one correct option.
///
/// Decoding still succeeds; the warning is reported, not enforced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaViolationWarning {
    /// Zero-based position of the question in the quiz.
    pub index: usize,
    pub correct_options: usize,
    pub total_options: usize,
}

impl fmt::Display for SchemaViolationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "question {} has {} correct option(s) out of {}; expected exactly one",
            self.index, self.correct_options, self.total_options
        )
    }
}

fn thinking_field() -> Field {
    Field::new(
        THINKING_FIELD,
        "All the reasoning/thinking content here",
        Schema::String,
    )
}

/// `{thinking_content: string, response_content: [string]}`
pub fn qna_questions_schema() -> Schema {
    Schema::object(vec![
        thinking_field(),
        Field::new(
            RESPONSE_FIELD,
            "Generated questions as a list of strings",
            Schema::list(Schema::String),
        ),
    ])
}

/// `{thinking_content: string, response_content: [{question: string, options: {string: bool}}]}`
pub fn quiz_schema() -> Schema {
    let item = Schema::object(vec![
        Field::new("question", "Question to be asked", Schema::String),
        Field::new(
            "options",
            "A mapping from each option text to true if the option is correct and false otherwise",
            Schema::map(Schema::Bool),
        ),
    ]);
    Schema::object(vec![
        thinking_field(),
        Field::new(
            RESPONSE_FIELD,
            "A list containing question items",
            Schema::list(item),
        ),
    ])
}

/// Decode a Q&A question list, keeping only non-blank questions.
pub fn decode_questions(raw_text: &str) -> Result<Vec<String>, DecodeError> {
    questions_from_decoded(decode(raw_text, &qna_questions_schema())?)
}

/// Convert an already validated Q&A payload into its question list.
pub fn questions_from_decoded(decoded: Decoded) -> Result<Vec<String>, DecodeError> {
    let projected = decoded.project(RESPONSE_FIELD)?;
    let questions: Vec<String> = expect_list(projected, "$.response_content")?
        .into_iter()
        .filter_map(|q| match q {
            Decoded::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        })
        .collect();

    if questions.is_empty() {
        return Err(DecodeError::Empty {
            path: "$.response_content".to_string(),
        });
    }
    Ok(questions)
}

/// Decode a quiz, projecting away the reasoning field.
pub fn decode_quiz(raw_text: &str) -> Result<DecodedQuiz, DecodeError> {
    quiz_from_decoded(decode(raw_text, &quiz_schema())?)
}

/// Convert an already validated quiz payload into question items.
pub fn quiz_from_decoded(decoded: Decoded) -> Result<DecodedQuiz, DecodeError> {
    let projected = decoded.project(RESPONSE_FIELD)?;
    let items = expect_list(projected, "$.response_content")?;

    if items.is_empty() {
        return Err(DecodeError::Empty {
            path: "$.response_content".to_string(),
        });
    }

    let questions = items
        .into_iter()
        .enumerate()
        .map(|(i, item)| question_item(item, &format!("$.response_content[{}]", i)))
        .collect::<Result<Vec<_>, _>>()?;

    let warnings = answer_key_warnings(&questions);

    for warning in &warnings {
        warn!(
            index = warning.index,
            correct_options = warning.correct_options,
            total_options = warning.total_options,
            "Quiz question does not have exactly one correct option"
        );
    }

    Ok(DecodedQuiz {
        questions,
        warnings,
    })
}

/// One warning per question whose options do not mark exactly one correct answer.
pub fn answer_key_warnings(questions: &[QuestionItem]) -> Vec<SchemaViolationWarning> {
    questions
        .iter()
        .enumerate()
        .filter(|(_, q)| q.correct_count() != 1)
        .map(|(index, q)| SchemaViolationWarning {
            index,
            correct_options: q.correct_count(),
            total_options: q.options.len(),
        })
        .collect()
}

fn expect_list(decoded: Decoded, path: &str) -> Result<Vec<Decoded>, DecodeError> {
    match decoded {
        Decoded::List(items) => Ok(items),
        other => Err(DecodeError::TypeMismatch {
            path: path.to_string(),
            expected: "list".to_string(),
            found: other.kind().to_string(),
        }),
    }
}

fn question_item(decoded: Decoded, path: &str) -> Result<QuestionItem, DecodeError> {
    let fields = match decoded {
        Decoded::Object(fields) => fields,
        other => {
            return Err(DecodeError::TypeMismatch {
                path: path.to_string(),
                expected: "object".to_string(),
                found: other.kind().to_string(),
            })
        }
    };

    let mut question = None;
    let mut options = None;
    for (name, value) in fields {
        match (name.as_str(), value) {
            ("question", Decoded::String(text)) => question = Some(text),
            ("options", Decoded::Map(entries)) => {
                options = Some(
                    entries
                        .into_iter()
                        .filter_map(|(label, flag)| flag.as_bool().map(|b| (label, b)))
                        .collect::<OptionSet>(),
                )
            }
            _ => {}
        }
    }

    match (question, options) {
        (Some(_), Some(options)) if options.is_empty() => Err(DecodeError::Empty {
            path: format!("{}.options", path),
        }),
        (Some(question), Some(options)) => Ok(QuestionItem::new(question, options)),
        (None, _) => Err(DecodeError::MissingField {
            path: path.to_string(),
            field: "question".to_string(),
        }),
        (_, None) => Err(DecodeError::MissingField {
            path: path.to_string(),
            field: "options".to_string(),
        }),
    }
}
