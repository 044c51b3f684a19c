// src/core/schema.rs — Response shapes, JSON schemas, lenient extraction

use serde::Deserialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use super::types::{label_for, Role};
use crate::provider::ResponseFormat;

/// A backend reply that does not match the expected shape. Local to one
/// backend and retried; never fatal on its own.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("no JSON object in response")]
    NoJson,

    #[error("invalid JSON: {0}")]
    Json(String),

    #[error("schema mismatch: {0}")]
    Schema(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSchema {
    Question,
    Answer,
    /// One key per candidate slot.
    Ranking { width: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QuestionResponse {
    pub question: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AnswerResponse {
    pub answer: String,
}

const ORDINALS: [&str; 24] = [
    "second",
    "third",
    "fourth",
    "fifth",
    "sixth",
    "seventh",
    "eighth",
    "ninth",
    "tenth",
    "eleventh",
    "twelfth",
    "thirteenth",
    "fourteenth",
    "fifteenth",
    "sixteenth",
    "seventeenth",
    "eighteenth",
    "nineteenth",
    "twentieth",
    "twenty_first",
    "twenty_second",
    "twenty_third",
    "twenty_fourth",
    "twenty_fifth",
];

/// Ranking keys, best first: `best, second, ..., worst`.
pub fn rank_keys(width: usize) -> Vec<&'static str> {
    match width {
        0 => Vec::new(),
        1 => vec!["best"],
        n => {
            let middle = (n - 2).min(ORDINALS.len());
            let mut keys = Vec::with_capacity(n);
            keys.push("best");
            keys.extend_from_slice(&ORDINALS[..middle]);
            keys.push("worst");
            keys
        }
    }
}

fn labels(width: usize) -> Vec<String> {
    (0..width)
        .filter_map(label_for)
        .map(|c| c.to_string())
        .collect()
}

impl ResponseSchema {
    pub fn name(&self) -> &'static str {
        match self {
            ResponseSchema::Question => "question",
            ResponseSchema::Answer => "answer",
            ResponseSchema::Ranking { .. } => "ranking",
        }
    }

    /// Strict JSON schema for schema-constrained decoding.
    pub fn json_schema(&self) -> Value {
        match self {
            ResponseSchema::Question => json!({
                "type": "object",
                "properties": {
                    "question": { "type": "string" },
                    "role": { "type": "string", "enum": ["internal", "external"] }
                },
                "required": ["question", "role"],
                "additionalProperties": false
            }),
            ResponseSchema::Answer => json!({
                "type": "object",
                "properties": {
                    "answer": { "type": "string" }
                },
                "required": ["answer"],
                "additionalProperties": false
            }),
            ResponseSchema::Ranking { width } => {
                let keys = rank_keys(*width);
                let mut properties = Map::new();
                for key in &keys {
                    properties.insert(
                        key.to_string(),
                        json!({ "type": "string", "enum": labels(*width) }),
                    );
                }
                json!({
                    "type": "object",
                    "properties": properties,
                    "required": keys,
                    "additionalProperties": false
                })
            }
        }
    }

    pub fn response_format(&self) -> ResponseFormat {
        ResponseFormat {
            name: self.name().to_string(),
            schema: self.json_schema(),
        }
    }

    /// Inline instructions for backends that cannot take a schema.
    pub fn format_hint(&self) -> String {
        match self {
            ResponseSchema::Question => concat!(
                "Respond with a single JSON object and nothing else, in this format:\n",
                "{\"question\": \"<your question>\", \"role\": \"internal\" or \"external\"}"
            )
            .to_string(),
            ResponseSchema::Answer => concat!(
                "Respond with a single JSON object and nothing else, in this format:\n",
                "{\"answer\": \"<your answer>\"}"
            )
            .to_string(),
            ResponseSchema::Ranking { width } => {
                let fields = rank_keys(*width)
                    .iter()
                    .map(|k| format!("\"{}\": \"<label>\"", k))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "Respond with a single JSON object and nothing else, in this format:\n{{{}}}\n\
                     Use each of the labels {} exactly once.",
                    fields,
                    labels(*width).join(", ")
                )
            }
        }
    }
}

/// Locate the JSON object in a raw reply. Accepts a bare object, a ```json
/// fenced block, or an object embedded in surrounding prose.
pub fn extract_json(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let body = after.strip_prefix("json").unwrap_or(after);
        // Code fences may sit inside JSON strings, so take the last closing
        // fence and only trust the body if it parses.
        if let Some(end) = body.rfind("```") {
            let inner = body[..end].trim();
            if inner.starts_with('{') && serde_json::from_str::<Value>(inner).is_ok() {
                return Some(inner);
            }
        }
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&trimmed[start..=end])
}

fn parse_object(raw: &str) -> Result<Value, ParseError> {
    let text = extract_json(raw).ok_or(ParseError::NoJson)?;
    let value: Value = serde_json::from_str(text).map_err(|e| ParseError::Json(e.to_string()))?;
    if !value.is_object() {
        return Err(ParseError::Schema("expected a JSON object".into()));
    }
    Ok(value)
}

pub fn parse_question(raw: &str) -> Result<QuestionResponse, ParseError> {
    let value = parse_object(raw)?;
    let parsed: QuestionResponse =
        serde_json::from_value(value).map_err(|e| ParseError::Schema(e.to_string()))?;
    if parsed.role == Role::Invalid {
        return Err(ParseError::Schema(
            "role must be \"internal\" or \"external\"".into(),
        ));
    }
    if parsed.question.trim().is_empty() {
        return Err(ParseError::Schema("empty question".into()));
    }
    Ok(parsed)
}

pub fn parse_answer(raw: &str) -> Result<AnswerResponse, ParseError> {
    let value = parse_object(raw)?;
    serde_json::from_value(value).map_err(|e| ParseError::Schema(e.to_string()))
}

/// Labels in best-to-worst key order. Only the shape is checked here;
/// whether the labels form a permutation is up to the caller.
pub fn parse_ranking(raw: &str, width: usize) -> Result<Vec<String>, ParseError> {
    let value = parse_object(raw)?;
    rank_keys(width)
        .into_iter()
        .map(|key| {
            value
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| ParseError::Schema(format!("missing string field '{}'", key)))
        })
        .collect()
}

/// Drop a surrounding ```python (or bare ```) fence from an answer.
pub fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return text.to_string();
    };
    let rest = rest.strip_prefix("python").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim_matches('\n').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_keys_width_four() {
        assert_eq!(rank_keys(4), vec!["best", "second", "third", "worst"]);
        assert_eq!(rank_keys(2), vec!["best", "worst"]);
        assert_eq!(rank_keys(1), vec!["best"]);
        assert!(rank_keys(0).is_empty());
        let wide = rank_keys(26);
        assert_eq!(wide.len(), 26);
        assert_eq!(wide[24], "twenty_fifth");
        assert_eq!(wide[25], "worst");
    }

    #[test]
    fn test_ranking_schema_shape() {
        let schema = ResponseSchema::Ranking { width: 3 }.json_schema();
        assert_eq!(schema["required"], json!(["best", "second", "worst"]));
        assert_eq!(schema["properties"]["best"]["enum"], json!(["a", "b", "c"]));
        assert_eq!(schema["additionalProperties"], false);
    }

    #[test]
    fn test_extract_plain_and_fenced() {
        assert_eq!(extract_json("{\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(
            extract_json("```json\n{\"answer\": \"4\"}\n```"),
            Some("{\"answer\": \"4\"}")
        );
        assert_eq!(
            extract_json("Sure! {\"answer\": \"4\"} Hope that helps."),
            Some("{\"answer\": \"4\"}")
        );
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("} backwards {"), None);
    }

    #[test]
    fn test_extract_fenced_answer_containing_code_block() {
        let reply = "```json\n{\"answer\": \"```python\\nprint(4)\\n```\"}\n```";
        assert_eq!(
            extract_json(reply),
            Some("{\"answer\": \"```python\\nprint(4)\\n```\"}")
        );
        let answer = parse_answer(reply).unwrap().answer;
        assert_eq!(strip_code_fence(&answer), "print(4)");
    }

    #[test]
    fn test_extract_falls_back_to_braces_when_fence_body_invalid() {
        let reply = "```json\n{\"answer\": \"4\"}\n```\nSee also ```notes```";
        assert_eq!(extract_json(reply), Some("{\"answer\": \"4\"}"));
    }

    #[test]
    fn test_parse_question() {
        let q = parse_question("{\"question\": \"What is 2+2?\", \"role\": \"external\"}").unwrap();
        assert_eq!(q.role, Role::External);
        assert!(matches!(
            parse_question("{\"question\": \"x\", \"role\": \"invalid\"}"),
            Err(ParseError::Schema(_))
        ));
        assert!(matches!(
            parse_question("{\"question\": \"x\", \"role\": \"sideways\"}"),
            Err(ParseError::Schema(_))
        ));
        assert!(matches!(parse_question("{\"question\": \"x\""), Err(ParseError::Json(_)) | Err(ParseError::NoJson)));
    }

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer("{\"answer\": \"4\"}").unwrap().answer, "4");
        assert!(matches!(parse_answer("{\"text\": \"4\"}"), Err(ParseError::Schema(_))));
        assert_eq!(parse_answer("just 4"), Err(ParseError::NoJson));
    }

    #[test]
    fn test_parse_ranking_keeps_duplicates_for_caller() {
        let labels = parse_ranking(
            "{\"best\": \"b\", \"second\": \"a\", \"third\": \"b\", \"worst\": \"d\"}",
            4,
        )
        .unwrap();
        assert_eq!(labels, vec!["b", "a", "b", "d"]);
        assert!(parse_ranking("{\"best\": \"b\"}", 4).is_err());
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(
            strip_code_fence("```python\ndef f():\n    return 4\n```"),
            "def f():\n    return 4"
        );
        assert_eq!(strip_code_fence("```\nx = 1\n```"), "x = 1");
        assert_eq!(strip_code_fence("plain answer"), "plain answer");
    }

    #[test]
    fn test_format_hint_lists_labels() {
        let hint = ResponseSchema::Ranking { width: 2 }.format_hint();
        assert!(hint.contains("\"best\": \"<label>\""));
        assert!(hint.contains("a, b"));
        assert!(ResponseSchema::Answer.format_hint().contains("\"answer\""));
    }
}
