//! Extracts a tool-invocation directive from free-form model output.
//!
//! Models wrap the `{"action": ..., "parameters": ...}` object in all sorts
//! of ways. Candidates are collected by three structural matchers in
//! priority order:
//!
//! 1. fenced code blocks (```` ```json ```` or bare ```` ``` ````)
//! 2. inline code spans (`` `{...}` ``)
//! 3. bare balanced-brace objects anywhere in the text
//!
//! Each candidate then passes through the same JSON gate; the first one
//! that parses with a non-empty string `action` wins. Nothing here returns
//! an error: malformed input simply means "no directive".

use regex_lite::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::LazyLock;

static FENCED: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z]*\s*(\{.*?\})\s*```").ok());

static INLINE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"`(\{[^`]*\})`").ok());

/// A validated request to run a tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionDirective {
    pub tool_name: String,
    pub parameters: Map<String, Value>,
}

/// Find the highest-priority valid directive in `model_output`.
pub fn extract(model_output: &str) -> Option<ActionDirective> {
    fenced_candidates(model_output)
        .into_iter()
        .chain(inline_candidates(model_output))
        .chain(bare_candidates(model_output))
        .find_map(validate)
}

fn captures<'a>(pattern: &LazyLock<Option<Regex>>, text: &'a str) -> Vec<&'a str> {
    match pattern.as_ref() {
        Some(re) => re
            .captures_iter(text)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect(),
        None => Vec::new(),
    }
}

fn fenced_candidates(text: &str) -> Vec<&str> {
    captures(&FENCED, text)
}

fn inline_candidates(text: &str) -> Vec<&str> {
    captures(&INLINE, text)
}

/// Every balanced `{...}` span, outermost first, in order of its opening
/// brace. Braces inside JSON string literals are ignored.
fn bare_candidates(text: &str) -> Vec<&str> {
    text.char_indices()
        .filter(|&(_, c)| c == '{')
        .filter_map(|(start, _)| balanced_end(&text[start..]).map(|len| &text[start..start + len]))
        .collect()
}

/// Byte length of the balanced object at the start of `text`, if it closes.
fn balanced_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

/// The JSON gate shared by every matcher.
fn validate(candidate: &str) -> Option<ActionDirective> {
    let Value::Object(mut object) = serde_json::from_str::<Value>(candidate).ok()? else {
        return None;
    };

    let tool_name = match object.remove("action")? {
        Value::String(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => return None,
    };

    let parameters = match object.remove("parameters") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(_) => return None,
    };

    Some(ActionDirective { tool_name, parameters })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn directive(name: &str, params: Value) -> ActionDirective {
        let Value::Object(parameters) = params else { panic!("params must be an object") };
        ActionDirective {
            tool_name: name.into(),
            parameters,
        }
    }

    #[test]
    fn fenced_json_block() {
        let output = "Let me check.\n```json\n{\"action\": \"get_time\", \"parameters\": {}}\n```";
        assert_eq!(extract(output), Some(directive("get_time", json!({}))));
    }

    #[test]
    fn fenced_block_without_language() {
        let output = "```\n{\"action\": \"calculator\", \"parameters\": {\"expression\": \"2+2\"}}\n```";
        assert_eq!(extract(output), Some(directive("calculator", json!({"expression": "2+2"}))));
    }

    #[test]
    fn inline_code_span() {
        let output = "I'll use `{\"action\": \"web_search\", \"parameters\": {\"query\": \"rust\"}}` for that.";
        assert_eq!(extract(output), Some(directive("web_search", json!({"query": "rust"}))));
    }

    #[test]
    fn bare_object_in_prose() {
        let output = r#"Sure! {"action": "calculator", "parameters": {"expression": "(1+2)*3"}} Done."#;
        assert_eq!(extract(output), Some(directive("calculator", json!({"expression": "(1+2)*3"}))));
    }

    #[test]
    fn whole_output_is_the_object() {
        let output = r#"{"action": "get_time", "parameters": {}}"#;
        assert_eq!(extract(output).unwrap().tool_name, "get_time");
    }

    #[test]
    fn fenced_wins_over_bare() {
        let output = "{\"action\": \"calculator\", \"parameters\": {\"expression\": \"1\"}}\n```json\n{\"action\": \"get_time\"}\n```";
        assert_eq!(extract(output).unwrap().tool_name, "get_time");
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_scanner() {
        let output = r#"Result: {"action": "web_search", "parameters": {"query": "what does } mean"}}"#;
        assert_eq!(extract(output), Some(directive("web_search", json!({"query": "what does } mean"}))));
    }

    #[test]
    fn invalid_candidate_falls_through_to_next() {
        let output = "```json\n{\"action\": \"calculator\", \"parameters\": {oops}}\n```\nthen {\"action\": \"get_time\"}";
        assert_eq!(extract(output).unwrap().tool_name, "get_time");
    }

    #[test]
    fn nested_directive_inside_wrapper_object() {
        let output = r#"{"thought": "need time", "next": {"action": "get_time", "parameters": {}}}"#;
        assert_eq!(extract(output).unwrap().tool_name, "get_time");
    }

    #[test]
    fn missing_parameters_means_empty() {
        assert_eq!(extract(r#"{"action": "get_time"}"#).unwrap().parameters, Map::new());
    }

    #[test]
    fn rejects_bad_shapes() {
        assert_eq!(extract(r#"{"action": ""}"#), None);
        assert_eq!(extract(r#"{"action": 42}"#), None);
        assert_eq!(extract(r#"{"action": "calculator", "parameters": "2+2"}"#), None);
        assert_eq!(extract(r#"{"tool": "calculator"}"#), None);
    }

    #[test]
    fn prose_without_directive() {
        assert_eq!(extract("The answer is 42. Sets look like {1, 2}."), None);
        assert_eq!(extract(""), None);
        assert_eq!(extract("{\"action\": \"get_time\""), None);
    }

    #[test]
    fn action_name_is_trimmed() {
        assert_eq!(extract(r#"{"action": "  get_time "}"#).unwrap().tool_name, "get_time");
    }
}
