//! Centralized prompt templates and the placeholder formatter.
//!
//! Templates use `{name}` placeholders and `{{` / `}}` for literal braces.
//! The output-format instructions inside each template are a request to the
//! model, not a guarantee; structured output is enforced by [`crate::schema`].

use std::collections::HashMap;

use crate::error::TemplateError;

/// Notes generation. Binds `{topics}`.
pub const NOTES_PROMPT: &str = r#"You are a professional college professor. Generate a set of comprehensive notes based on the topics provided.
The notes should be detailed, well-structured, and easy to understand.
The notes should be suitable for students in their final year of high school or the first year of university.
Use proper markdown formatting where necessary: headers, subheaders, dividers and lists.
Use $...$ to wrap *every* mathematical expression, including equations, formulas, or symbols. For example: $E=mc^2$.
Wrap full LaTeX blocks like matrices in $$...$$.
Example: $$A = \begin{{bmatrix}} 1 & 2 \\ 3 & 4 \end{{bmatrix}}$$
Wrap inline formulas like $a_{{ij}}$ or $x^2 + y^2 = z^2$.
Do not forget to include both dollar signs.

Here are the topics:
{topics}"#;

/// Question generation for the Q&A page. Binds `{topics}`.
pub const QNA_QUESTIONS_PROMPT: &str = r#"You are a professional college professor, and you are creating a test paper.
Generate a set of questions that challenge the students' understanding of the given topics.
The questions should be clear, concise, and relevant to the given topics.
Use $...$ to wrap *every* mathematical expression, including equations, formulas, or symbols.
Wrap inline formulas like $a_{{ij}}$ or $x^2 + y^2 = z^2$.
Respond only with a JSON object of this form:
{{"thinking_content": "your reasoning", "response_content": ["Question 1", "Question 2", "Question 3"]}}

Here are the topics:
{topics}"#;

/// Answer for a single Q&A question. Binds `{question}`.
pub const QNA_ANSWER_PROMPT: &str = r#"You are a professional college professor. Based on the notes you provided, the students have
come up with some questions; your job is to answer the question below.
The answer should be detailed and well-explained.
Use proper markdown formatting where necessary: headers, subheaders, dividers and lists.
Use $...$ to wrap *every* mathematical expression, including equations, formulas, or symbols. For example: $E=mc^2$.
Wrap full LaTeX blocks like matrices in $$...$$.
Example: $$A = \begin{{bmatrix}} 1 & 2 \\ 3 & 4 \end{{bmatrix}}$$
Do not forget to include both dollar signs.

Here is the question:
{question}"#;

/// Multiple-choice quiz generation. Binds `{topics}`.
pub const QUIZ_PROMPT: &str = r#"You are a college professor tasked with creating a multiple choice question (MCQ) quiz on these topics:
{topics}

Generate at least 10 MCQs. Every question has exactly four options and exactly one correct option.
Respond only with a JSON object formatted like this:
{{
  "thinking_content": "your reasoning",
  "response_content": [
    {{
      "question": "If a train travels 120 miles in 2 hours, what is its average speed?",
      "options": {{
        "60 mph": true,
        "40 mph": false,
        "100 mph": false,
        "240 mph": false
      }}
    }}
  ]
}}
Each option maps to true if it is the correct answer and false otherwise."#;

/// Appended to structured prompts. Binds `{schema}`.
pub const STRUCTURED_OUTPUT_INSTRUCTIONS: &str = r#"

Your response MUST be a single JSON object conforming to this JSON Schema:
{schema}

Always respond with valid JSON only, no other text."#;

/// Appended when a structured response could not be decoded. Binds `{error}`.
pub const DECODE_RETRY_AMENDMENT: &str = r#"

Your previous response could not be used: {error}
Respond again with the JSON object only, exactly matching the schema above."#;

enum Segment<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

/// Substitute every `{name}` placeholder in `template` with its binding.
///
/// Fails with [`TemplateError::MissingVariable`] when a placeholder has no
/// binding and [`TemplateError::Malformed`] on unbalanced braces. Bindings the
/// template does not use are ignored.
pub fn format_prompt(
    template: &str,
    variables: &HashMap<String, String>,
) -> Result<String, TemplateError> {
    let segments = parse_template(template)?;
    let mut out = String::with_capacity(template.len());

    for segment in segments {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Placeholder(name) => {
                let value = variables
                    .get(name)
                    .ok_or_else(|| TemplateError::MissingVariable {
                        name: name.to_string(),
                    })?;
                out.push_str(value);
            }
        }
    }

    Ok(out)
}

/// Names of the placeholders in `template`, in order of appearance.
pub fn placeholders(template: &str) -> Result<Vec<&str>, TemplateError> {
    Ok(parse_template(template)?
        .into_iter()
        .filter_map(|s| match s {
            Segment::Placeholder(name) => Some(name),
            Segment::Literal(_) => None,
        })
        .collect())
}

/// Build a variable map from `(name, value)` pairs.
pub fn bindings<const N: usize>(pairs: [(&str, &str); N]) -> HashMap<String, String> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn parse_template(template: &str) -> Result<Vec<Segment<'_>>, TemplateError> {
    // Braces are ASCII, so byte offsets found here are always char boundaries.
    let bytes = template.as_bytes();
    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' | b'}' if bytes.get(i + 1) == Some(&bytes[i]) => {
                segments.push(Segment::Literal(&template[literal_start..=i]));
                i += 2;
                literal_start = i;
            }
            b'{' => {
                let close = template[i + 1..]
                    .find('}')
                    .map(|offset| i + 1 + offset)
                    .ok_or_else(|| TemplateError::Malformed {
                        position: i,
                        reason: "unclosed '{'".to_string(),
                    })?;
                let name = &template[i + 1..close];
                if !is_placeholder_name(name) {
                    return Err(TemplateError::Malformed {
                        position: i,
                        reason: format!("invalid placeholder name '{}'", name),
                    });
                }
                if literal_start < i {
                    segments.push(Segment::Literal(&template[literal_start..i]));
                }
                segments.push(Segment::Placeholder(name));
                i = close + 1;
                literal_start = i;
            }
            b'}' => {
                return Err(TemplateError::Malformed {
                    position: i,
                    reason: "unmatched '}'".to_string(),
                });
            }
            _ => i += 1,
        }
    }

    if literal_start < bytes.len() {
        segments.push(Segment::Literal(&template[literal_start..]));
    }

    Ok(segments)
}

fn is_placeholder_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
