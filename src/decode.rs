//! Typed decoders for the structured stage answers.
//!
//! One function per expected shape:
//!
//! | Stage | Shape | Decoder |
//! |-------|-------|---------|
//! | Enumerate | `[{"function_name": ...}, ...]` | [`candidates`] |
//! | LocateFinalize | `{"start_line": n, "end_line": m}` | [`line_range`] |
//! | VerifyFinalize | `{"result": bool}` | [`verdict`] |
//! | ExtractFinalize | `{"purpose", "signature", "arguments", "return"}` | [`function_info`] |
//!
//! Backends often wrap JSON in Markdown fences or add a sentence around it,
//! so [`json_blocks`] first cuts out each complete array or object.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

use crate::error::DecodeError;
use crate::models::FunctionInfo;

/// 1-based inclusive line numbers as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct LineRange {
    pub start_line: i64,
    pub end_line: i64,
}

#[derive(Deserialize)]
struct CandidateItem {
    #[serde(default)]
    function_name: String,
}

#[derive(Deserialize)]
struct VerdictItem {
    #[serde(deserialize_with = "lenient_bool")]
    result: bool,
}

#[derive(Deserialize)]
struct FunctionInfoItem {
    #[serde(deserialize_with = "lenient_text")]
    purpose: String,
    #[serde(deserialize_with = "lenient_text")]
    signature: String,
    #[serde(default, deserialize_with = "lenient_text")]
    arguments: String,
    #[serde(rename = "return", default, deserialize_with = "lenient_text")]
    return_type: String,
}

/// Accepts `true`/`false` or their string forms.
fn lenient_bool<'de, D: Deserializer<'de>>(de: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrText {
        Bool(bool),
        Text(String),
    }

    match BoolOrText::deserialize(de)? {
        BoolOrText::Bool(b) => Ok(b),
        BoolOrText::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Ok(true),
            "false" | "no" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "expected a boolean, got {:?}",
                other
            ))),
        },
    }
}

/// Strings pass through; any other JSON value is kept in its serialized form.
fn lenient_text<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    let value = serde_json::Value::deserialize(de)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Every complete JSON array or object in `text`, left to right.
///
/// Prefers the body of a fenced code block when one is present. Text after
/// a value, braces included, is never part of it.
pub fn json_blocks(text: &str) -> impl Iterator<Item = &str> {
    let body = fenced_body(text).unwrap_or(text);
    let mut from = 0;
    std::iter::from_fn(move || {
        while let Some(found) = body[from..].find(&['[', '{'][..]) {
            let open = from + found;
            let mut stream =
                serde_json::Deserializer::from_str(&body[open..]).into_iter::<serde_json::Value>();
            if let Some(Ok(_)) = stream.next() {
                let close = open + stream.byte_offset();
                from = close;
                return Some(&body[open..close]);
            }
            from = open + 1;
        }
        None
    })
}

/// The first complete JSON array or object in `text`.
pub fn json_block(text: &str) -> Option<&str> {
    json_blocks(text).next()
}

fn fenced_body(text: &str) -> Option<&str> {
    let fence = text.find("```")?;
    let after = &text[fence + 3..];
    // Skip the info string (e.g. "json") up to the end of the fence line.
    let content_start = after.find('\n')? + 1;
    let content = &after[content_start..];
    let end = content.find("```").unwrap_or(content.len());
    Some(&content[..end])
}

/// Decode the first block that has the shape `T`; bracketed prose before
/// the answer is skipped.
fn decode<T: DeserializeOwned>(text: &str) -> Result<T, DecodeError> {
    let mut first_err = None;
    for block in json_blocks(text) {
        match serde_json::from_str(block) {
            Ok(value) => return Ok(value),
            Err(e) => {
                first_err.get_or_insert(e);
            }
        }
    }
    match first_err {
        Some(e) => Err(DecodeError::Json(e)),
        None => Err(DecodeError::NoJson),
    }
}

/// Candidate names, trimmed, empty ones dropped, first occurrence kept.
pub fn candidates(text: &str) -> Result<Vec<String>, DecodeError> {
    let items: Vec<CandidateItem> = decode(text)?;
    let mut names: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let name = item.function_name.trim();
        if name.is_empty() || names.iter().any(|n| n == name) {
            continue;
        }
        names.push(name.to_string());
    }
    Ok(names)
}

pub fn line_range(text: &str) -> Result<LineRange, DecodeError> {
    decode(text)
}

pub fn verdict(text: &str) -> Result<bool, DecodeError> {
    let item: VerdictItem = decode(text)?;
    Ok(item.result)
}

pub fn function_info(text: &str) -> Result<FunctionInfo, DecodeError> {
    let item: FunctionInfoItem = decode(text)?;
    Ok(FunctionInfo {
        purpose: item.purpose,
        signature: item.signature,
        arguments: item.arguments,
        return_type: item.return_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_plain_array() {
        let names = candidates(r#"[{"function_name":"foo"},{"function_name":"bar"}]"#).unwrap();
        assert_eq!(names, vec!["foo", "bar"]);
    }

    #[test]
    fn candidates_drop_empty_and_duplicates() {
        let text = r#"[{"function_name":"  "},{"function_name":"main"},{},{"function_name":"main "}]"#;
        assert_eq!(candidates(text).unwrap(), vec!["main"]);
    }

    #[test]
    fn candidates_inside_fence() {
        let text = "Here you go:\n```json\n[\n  {\"function_name\": \"handle\"}\n]\n```\nDone.";
        assert_eq!(candidates(text).unwrap(), vec!["handle"]);
    }

    #[test]
    fn candidates_malformed() {
        assert!(matches!(candidates("no functions here"), Err(DecodeError::NoJson)));
        assert!(matches!(
            candidates("[{\"function_name\": }]"),
            Err(DecodeError::NoJson)
        ));
        assert!(matches!(candidates("[1, 2]"), Err(DecodeError::Json(_))));
        // An object where a list is expected is a shape mismatch.
        assert!(candidates(r#"{"function_name":"foo"}"#).is_err());
    }

    #[test]
    fn line_range_with_prose() {
        let r = line_range("Final answer: {\"start_line\": 12, \"end_line\": 30}").unwrap();
        assert_eq!(r, LineRange { start_line: 12, end_line: 30 });
    }

    #[test]
    fn line_range_missing_field() {
        assert!(line_range(r#"{"start_line": 1}"#).is_err());
    }

    #[test]
    fn verdict_bool_and_text() {
        assert!(verdict(r#"{"result": true}"#).unwrap());
        assert!(!verdict(r#"{"result": false}"#).unwrap());
        assert!(verdict(r#"{"result": "True"}"#).unwrap());
        assert!(verdict(r#"{"result": "maybe"}"#).is_err());
        assert!(verdict("yes").is_err());
    }

    #[test]
    fn function_info_fields() {
        let text = r#"{"purpose":"adds two numbers","signature":"func foo(a,b int) int","arguments":"a, b: int","return":"int"}"#;
        let info = function_info(text).unwrap();
        assert_eq!(info.purpose, "adds two numbers");
        assert_eq!(info.signature, "func foo(a,b int) int");
        assert_eq!(info.arguments, "a, b: int");
        assert_eq!(info.return_type, "int");
    }

    #[test]
    fn function_info_non_string_arguments() {
        let text = r#"{"purpose":"p","signature":"s","arguments":["a int","b int"],"return":null}"#;
        let info = function_info(text).unwrap();
        assert_eq!(info.arguments, r#"["a int","b int"]"#);
        assert_eq!(info.return_type, "");
    }

    #[test]
    fn function_info_requires_purpose_and_signature() {
        assert!(function_info(r#"{"arguments":"a","return":"int"}"#).is_err());
    }

    #[test]
    fn json_block_takes_first_complete_value() {
        assert_eq!(json_block("x [1, [2]] y"), Some("[1, [2]]"));
        assert_eq!(json_block("} nothing {"), None);
        assert_eq!(json_block("{\"a\": 1} and {\"b\": 2}"), Some("{\"a\": 1}"));
    }

    #[test]
    fn trailing_brace_prose_is_ignored() {
        assert!(verdict("{\"result\": true}\nThe closing } of foo is on line 3.").unwrap());
        let r = line_range("{\"start_line\": 4, \"end_line\": 9}\nfoo ends at the } on line 9").unwrap();
        assert_eq!(r, LineRange { start_line: 4, end_line: 9 });
    }

    #[test]
    fn leading_bracket_prose_is_skipped() {
        let text = "Functions found [2]:\n[{\"function_name\":\"foo\"},{\"function_name\":\"bar\"}]";
        assert_eq!(candidates(text).unwrap(), vec!["foo", "bar"]);

        let text = "Lines {4..9} hold it: {\"start_line\": 4, \"end_line\": 9}";
        assert_eq!(line_range(text).unwrap().end_line, 9);
    }
}
