//! Recovery of JSON payloads from free-form model output.
//!
//! Models wrap their answers in prose and code fences, and occasionally emit
//! typographic quotes or unescaped backslashes. Blocks that still fail to
//! parse after one repair pass are dropped and counted.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::Feedback;

const FENCE: &str = "```";

/// JSON values recovered from one model response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedBlocks {
    pub values: Vec<Value>,
    /// Candidate blocks that could not be parsed even after repair
    pub dropped: usize,
}

impl ParsedBlocks {
    /// Objects at the top level or inside top-level arrays.
    pub fn objects(&self) -> impl Iterator<Item = &Map<String, Value>> {
        self.values.iter().flat_map(|value| match value {
            Value::Object(map) => vec![map],
            Value::Array(items) => items.iter().filter_map(Value::as_object).collect(),
            _ => Vec::new(),
        })
    }
}

/// Pull every JSON value out of `text`.
///
/// Fenced blocks are preferred; without any fence the whole text is one
/// candidate. Each candidate's widest brace/bracket span is tried strictly,
/// then repaired, and finally scanned for the bare values embedded in it.
pub fn extract_json_blocks(text: &str) -> ParsedBlocks {
    let mut candidates = fenced_blocks(text);
    if candidates.is_empty() {
        candidates.push(text);
    }

    let mut parsed = ParsedBlocks::default();
    for (index, candidate) in candidates.iter().enumerate() {
        let Some(span) = widest_span(candidate) else {
            debug!(block = index, "Block has no JSON span, skipping");
            continue;
        };

        if let Ok(value) = serde_json::from_str::<Value>(span) {
            parsed.values.push(value);
            continue;
        }
        if let Ok(value) = serde_json::from_str::<Value>(&repair(span)) {
            debug!(block = index, "Block parsed after repair");
            parsed.values.push(value);
            continue;
        }

        let embedded = embedded_values(span);
        if embedded.is_empty() {
            warn!(
                block = index,
                preview = %preview(span),
                "Dropping unparseable JSON block"
            );
            parsed.dropped += 1;
        } else {
            debug!(block = index, found = embedded.len(), "Block split into embedded values");
            parsed.values.extend(embedded);
        }
    }
    parsed
}

/// Recover persona records from a generation response.
pub fn parse_personas(text: &str) -> Result<ParsedBlocks> {
    let parsed = extract_json_blocks(text);
    let values: Vec<Value> = parsed.objects().cloned().map(Value::Object).collect();

    if values.is_empty() {
        return Err(Error::malformed(format!(
            "no persona objects found ({} block(s) dropped)",
            parsed.dropped
        )));
    }

    Ok(ParsedBlocks {
        values,
        dropped: parsed.dropped,
    })
}

/// Recover one persona's feedback from a scoring response.
pub fn parse_feedback(text: &str, persona_id: &str) -> Result<Feedback> {
    let parsed = extract_json_blocks(text);
    let object = parsed
        .objects()
        .next()
        .ok_or_else(|| Error::malformed("no feedback object found"))?;

    let score = object
        .get("score")
        .and_then(numeric)
        .filter(|s| s.is_finite())
        .ok_or_else(|| Error::malformed("feedback has no numeric score"))?;

    Ok(Feedback {
        persona_id: persona_id.to_string(),
        score,
        reasons_to_buy: string_list(object.get("reasons_to_buy")),
        reasons_not_to_buy: string_list(object.get("reasons_not_to_buy")),
        detail_feedback: text.to_string(),
    })
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            static LEADING: OnceLock<Option<Regex>> = OnceLock::new();
            let re = LEADING
                .get_or_init(|| Regex::new(r"^\s*(-?\d+(?:\.\d+)?)").ok())
                .as_ref()?;
            re.captures(s)?.get(1)?.as_str().parse().ok()
        }
        _ => None,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

/// Contents of every ``` fence, with the language tag line removed.
fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find(FENCE) {
        let after = &rest[open + FENCE.len()..];
        // Skip the info string (e.g. "json") up to the end of the line
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(after.len());
        let body = &after[body_start..];

        match body.find(FENCE) {
            Some(close) => {
                blocks.push(&body[..close]);
                rest = &body[close + FENCE.len()..];
            }
            None => {
                blocks.push(body);
                break;
            }
        }
    }
    blocks
}

/// From the first `{`/`[` to the last `}`/`]`.
fn widest_span(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let end = text.rfind(['}', ']'])?;
    (start < end).then(|| &text[start..=end])
}

/// Every object or array that parses on its own, scanning left to right and
/// resuming after each value found.
fn embedded_values(text: &str) -> Vec<Value> {
    let mut values = Vec::new();
    let mut pos = 0;

    while let Some(offset) = text[pos..].find(['{', '[']) {
        let start = pos + offset;
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value)) => {
                values.push(value);
                pos = start + stream.byte_offset();
            }
            _ => pos = start + 1,
        }
    }
    values
}

fn repair(span: &str) -> String {
    let mut out = String::with_capacity(span.len());
    let mut chars = span.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' => out.push('"'),
            '\u{2018}' | '\u{2019}' => out.push('\''),
            '\\' => match chars.peek() {
                Some('"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' | 'u') => {
                    out.push('\\');
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                }
                _ => out.push_str("\\\\"),
            },
            _ => out.push(c),
        }
    }

    static TRAILING_COMMA: OnceLock<Option<Regex>> = OnceLock::new();
    match TRAILING_COMMA.get_or_init(|| Regex::new(r",\s*([}\]])").ok()) {
        Some(re) => re.replace_all(&out, "$1").into_owned(),
        None => out,
    }
}

fn preview(text: &str) -> String {
    text.chars().take(80).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;

    #[test]
    fn test_fenced_block_with_prose() {
        let text = "Sure! ```json\n{\"persona_id\":\"1\",\"description\":\"x\"}\n``` Thanks!";
        let parsed = extract_json_blocks(text);

        assert_eq!(parsed.values, vec![json!({"persona_id": "1", "description": "x"})]);
        assert_eq!(parsed.dropped, 0);
    }

    #[test]
    fn test_multiple_fences_and_arrays() {
        let text = "```json\n[{\"a\":1},{\"b\":2}]\n```\nand\n```\n{\"c\":3}\n```";
        let parsed = parse_personas(text).unwrap();
        assert_eq!(parsed.values.len(), 3);
    }

    #[test]
    fn test_unfenced_object_in_prose() {
        let text = "Here you go: {\"persona_id\": \"2\", \"motivation\": \"career\"} hope it helps";
        let parsed = extract_json_blocks(text);
        assert_eq!(parsed.values[0]["motivation"], "career");
    }

    #[test]
    fn test_unfenced_prose_with_brackets() {
        let text = "Here are the personas [draft 2]: {\"persona_id\": \"1\", \"description\": \"a\"}";
        let parsed = parse_personas(text).unwrap();

        assert_eq!(parsed.values, vec![json!({"persona_id": "1", "description": "a"})]);
        assert_eq!(parsed.dropped, 0);
    }

    #[test]
    fn test_unfenced_objects_separated_by_prose() {
        let text = "First: {\"persona_id\": \"1\"} and then {\"persona_id\": \"2\", \"goals\": [\"x\"]} (end)";
        let parsed = parse_personas(text).unwrap();

        let ids: Vec<&str> = parsed.values.iter().filter_map(|v| v["persona_id"].as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn test_repair_preferred_over_inner_fragments() {
        let text = "{\u{201C}outer\u{201D}: {\"inner\": 1}}";
        let parsed = extract_json_blocks(text);
        assert_eq!(parsed.values, vec![json!({"outer": {"inner": 1}})]);
    }

    #[test]
    fn test_repair_curly_quotes_and_backslashes() {
        let text = "```json\n{\u{201C}description\u{201D}: \"C:\\Users\\x\", \"goals\": [\"a\",],}\n```";
        let parsed = extract_json_blocks(text);

        assert_eq!(parsed.dropped, 0);
        assert_eq!(parsed.values[0]["description"], "C:\\Users\\x");
        assert_eq!(parsed.values[0]["goals"], json!(["a"]));
    }

    #[test]
    fn test_unrepairable_block_dropped_and_counted() {
        let text = "```json\n{\"ok\": true}\n```\n```json\n{not json at all\n}\n```";
        let parsed = extract_json_blocks(text);

        assert_eq!(parsed.values.len(), 1);
        assert_eq!(parsed.dropped, 1);
    }

    #[test]
    fn test_parse_personas_no_objects_is_malformed() {
        let err = parse_personas("I cannot help with that.").unwrap_err();
        assert_eq!(err.code(), ErrorCode::MalformedResponse);

        let err = parse_personas("```json\n[1, 2, 3]\n```").unwrap_err();
        assert_eq!(err.code(), ErrorCode::MalformedResponse);
    }

    #[test]
    fn test_parse_feedback() {
        let text = "```json\n{\"score\": 7, \"reasons_to_buy\": [\"cheap\"], \"reasons_not_to_buy\": \"too long\"}\n```";
        let feedback = parse_feedback(text, "csv_1").unwrap();

        assert_eq!(feedback.persona_id, "csv_1");
        assert_eq!(feedback.score, 7.0);
        assert_eq!(feedback.reasons_to_buy, vec!["cheap"]);
        assert_eq!(feedback.reasons_not_to_buy, vec!["too long"]);
        assert_eq!(feedback.detail_feedback, text);
    }

    #[test]
    fn test_parse_feedback_numeric_string_score() {
        let feedback = parse_feedback("{\"score\": \"8/10\"}", "md_3").unwrap();
        assert_eq!(feedback.score, 8.0);
        assert!(feedback.reasons_to_buy.is_empty());
    }

    #[test]
    fn test_parse_feedback_missing_score() {
        let err = parse_feedback("{\"reasons_to_buy\": []}", "csv_1").unwrap_err();
        assert_eq!(err.code(), ErrorCode::MalformedResponse);

        let err = parse_feedback("{\"score\": \"high\"}", "csv_1").unwrap_err();
        assert_eq!(err.code(), ErrorCode::MalformedResponse);
    }

    #[test]
    fn test_unclosed_fence() {
        let parsed = extract_json_blocks("```json\n{\"a\": 1}");
        assert_eq!(parsed.values, vec![json!({"a": 1})]);
    }
}
