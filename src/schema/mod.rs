//! Structured decoding of model output.
//!
//! A [`Schema`] describes the shape generated text must have. [`decode`]
//! extracts the JSON payload from a completion, validates it against the
//! schema and returns a [`Decoded`] tree; [`Decoded::project`] then pulls out
//! the one field a caller needs. Task-specific schemas and conversions live in
//! [`tasks`].

mod tasks;


pub use tasks::*;

use serde::de::IgnoredAny;
use serde_json::{json, Value};

use crate::error::{DecodeError, TemplateError};
use crate::prompts::{bindings, format_prompt, STRUCTURED_OUTPUT_INSTRUCTIONS};

/// Structural description of expected model output.
#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    /// A JSON string.
    String,
    /// A JSON boolean.
    Bool,
    /// A JSON array whose elements all match the inner schema.
    List(Box<Schema>),
    /// A JSON object with arbitrary string keys whose values match the inner schema.
    Map(Box<Schema>),
    /// A JSON object with named, required fields.
    Object(Vec<Field>),
}

/// A named field of a [`Schema::Object`].
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    /// Passed to the model as the field's JSON Schema description.
    pub description: String,
    pub schema: Schema,
}

/// Output of [`decode`], mirroring the schema it was validated against.
///
/// Objects keep only declared fields, in schema order. Maps keep the order in
/// which the model emitted their keys.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    String(String),
    Bool(bool),
    List(Vec<Decoded>),
    Map(Vec<(String, Decoded)>),
    Object(Vec<(String, Decoded)>),
}

impl Schema {
    pub fn list(item: Schema) -> Self {
        Schema::List(Box::new(item))
    }

    pub fn map(value: Schema) -> Self {
        Schema::Map(Box::new(value))
    }

    pub fn object(fields: Vec<Field>) -> Self {
        Schema::Object(fields)
    }

    /// Human-readable kind used in mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Schema::String => "string",
            Schema::Bool => "boolean",
            Schema::List(_) => "list",
            Schema::Map(_) => "mapping",
            Schema::Object(_) => "object",
        }
    }

    /// Render as a JSON Schema document.
    pub fn to_json_schema(&self) -> Value {
        match self {
            Schema::String => json!({"type": "string"}),
            Schema::Bool => json!({"type": "boolean"}),
            Schema::List(item) => json!({"type": "array", "items": item.to_json_schema()}),
            Schema::Map(value) => json!({
                "type": "object",
                "additionalProperties": value.to_json_schema()
            }),
            Schema::Object(fields) => {
                let mut properties = serde_json::Map::new();
                for field in fields {
                    let mut property = field.schema.to_json_schema();
                    if let Value::Object(ref mut map) = property {
                        map.insert("description".to_string(), json!(field.description));
                    }
                    properties.insert(field.name.clone(), property);
                }
                let required: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
                json!({
                    "type": "object",
                    "properties": properties,
                    "required": required
                })
            }
        }
    }

    /// Machine-readable output instructions appended to a structured prompt.
    pub fn instructions(&self) -> Result<String, TemplateError> {
        let json_schema = self.to_json_schema();
        let schema =
            serde_json::to_string_pretty(&json_schema).unwrap_or_else(|_| json_schema.to_string());
        format_prompt(
            STRUCTURED_OUTPUT_INSTRUCTIONS,
            &bindings([("schema", schema.as_str())]),
        )
    }
}

impl Field {
    pub fn new(name: impl Into<String>, description: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
        }
    }
}

impl Decoded {
    /// Extract one field of a decoded object, discarding the rest.
    pub fn project(self, field: &str) -> Result<Decoded, DecodeError> {
        match self {
            Decoded::Object(fields) => fields
                .into_iter()
                .find(|(name, _)| name == field)
                .map(|(_, value)| value)
                .ok_or_else(|| DecodeError::MissingField {
                    path: "$".to_string(),
                    field: field.to_string(),
                }),
            other => Err(DecodeError::TypeMismatch {
                path: "$".to_string(),
                expected: "object".to_string(),
                found: other.kind().to_string(),
            }),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Decoded::String(_) => "string",
            Decoded::Bool(_) => "boolean",
            Decoded::List(_) => "list",
            Decoded::Map(_) => "mapping",
            Decoded::Object(_) => "object",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Decoded::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Decoded::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// Decode model output against `schema`.
///
/// Deterministic: identical input always yields an equal [`Decoded`].
pub fn decode(raw_text: &str, schema: &Schema) -> Result<Decoded, DecodeError> {
    let payload = extract_json(raw_text)?;
    let value: Value = serde_json::from_str(payload).map_err(|e| DecodeError::Syntax {
        message: e.to_string(),
    })?;
    validate(&value, schema, "$")
}

/// Locate the JSON payload in a completion.
///
/// Candidates, in order: raw JSON, a ```json fenced block, a bare fenced
/// block, the span from the first `{` to the last `}`, and the span from the
/// first `[` to the last `]`. A leading `<think>...</think>` section is
/// skipped first. The first candidate that parses wins; when none parses the
/// first one is returned so the caller reports its syntax error.
pub fn extract_json(completion: &str) -> Result<&str, DecodeError> {
    let text = strip_reasoning(completion);
    let trimmed = text.trim();

    let mut candidates = Vec::new();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        candidates.push(trimmed);
    }
    if let Some(block) = text
        .split("```json")
        .nth(1)
        .and_then(|rest| rest.split("```").next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        candidates.push(block);
    }
    if let Some(block) = text
        .split("```")
        .nth(1)
        .map(str::trim)
        .filter(|s| s.starts_with('{') || s.starts_with('['))
    {
        candidates.push(block);
    }
    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (text.find(open), text.rfind(close)) {
            if start < end {
                candidates.push(&text[start..=end]);
            }
        }
    }

    candidates
        .iter()
        .copied()
        .find(|candidate| serde_json::from_str::<IgnoredAny>(candidate).is_ok())
        .or_else(|| candidates.first().copied())
        .ok_or_else(|| DecodeError::NoJson {
            preview: completion.chars().take(100).collect(),
        })
}

fn strip_reasoning(completion: &str) -> &str {
    match completion.find("</think>") {
        Some(end) if completion.trim_start().starts_with("<think>") => {
            &completion[end + "</think>".len()..]
        }
        _ => completion,
    }
}

fn validate(value: &Value, schema: &Schema, path: &str) -> Result<Decoded, DecodeError> {
    match (schema, value) {
        (Schema::String, Value::String(s)) => Ok(Decoded::String(s.clone())),
        (Schema::Bool, Value::Bool(b)) => Ok(Decoded::Bool(*b)),
        (Schema::List(item), Value::Array(elements)) => elements
            .iter()
            .enumerate()
            .map(|(i, element)| validate(element, item, &format!("{}[{}]", path, i)))
            .collect::<Result<Vec<_>, _>>()
            .map(Decoded::List),
        (Schema::Map(item), Value::Object(entries)) => entries
            .iter()
            .map(|(key, element)| {
                let decoded = validate(element, item, &format!("{}.{}", path, key))?;
                Ok((key.clone(), decoded))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Decoded::Map),
        (Schema::Object(fields), Value::Object(entries)) => fields
            .iter()
            .map(|field| {
                let element = entries
                    .get(&field.name)
                    .ok_or_else(|| DecodeError::MissingField {
                        path: path.to_string(),
                        field: field.name.clone(),
                    })?;
                let decoded =
                    validate(element, &field.schema, &format!("{}.{}", path, field.name))?;
                Ok((field.name.clone(), decoded))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Decoded::Object),
        (expected, found) => Err(DecodeError::TypeMismatch {
            path: path.to_string(),
            expected: expected.kind().to_string(),
            found: json_kind(found).to_string(),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}
