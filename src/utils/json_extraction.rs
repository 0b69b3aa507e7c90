//! JSON extraction from model responses.
//!
//! Models asked for "JSON only" still wrap their answer in markdown fences or
//! lead with a sentence of prose. Extraction tries, in order:
//! 1. A fenced block (```json ... ``` or ``` ... ```) that parses
//! 2. The whole trimmed response, if it parses
//! 3. The first balanced object/array found by scanning, if it parses
//!
//! A response that opens a JSON value but never closes it is reported as
//! truncated so callers can log something more useful than "invalid JSON".

use std::sync::OnceLock;

use regex::Regex;

/// Outcome of scanning a response for JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonExtraction {
    /// A complete JSON value was found.
    Found(String),
    /// JSON started but never closed (likely `max_tokens` cut the output).
    Truncated { partial: String, open_scopes: usize },
    /// Nothing JSON-like was present.
    NotFound,
}

impl JsonExtraction {
    /// Returns the extracted JSON text, if any.
    pub fn json(&self) -> Option<&str> {
        match self {
            JsonExtraction::Found(json) => Some(json),
            _ => None,
        }
    }
}

fn fence_regex() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?[ \t]*\r?\n?(.*?)```").ok())
        .as_ref()
}

fn parses(candidate: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(candidate).is_ok()
}

/// Scans a response for a JSON value.
pub fn extract_json(content: &str) -> JsonExtraction {
    let trimmed = content.trim();

    if let Some(fence) = fence_regex() {
        for captures in fence.captures_iter(trimmed) {
            if let Some(body) = captures.get(1) {
                let body = body.as_str().trim();
                if parses(body) {
                    return JsonExtraction::Found(body.to_string());
                }
            }
        }
    }

    if parses(trimmed) {
        return JsonExtraction::Found(trimmed.to_string());
    }

    let Some(start) = trimmed.find(['{', '[']) else {
        return JsonExtraction::NotFound;
    };

    let tail = &trimmed[start..];
    match balanced_end(tail) {
        Scan::Closed(end) => {
            let candidate = &tail[..=end];
            if parses(candidate) {
                JsonExtraction::Found(candidate.to_string())
            } else {
                JsonExtraction::NotFound
            }
        }
        Scan::Open(open_scopes) => JsonExtraction::Truncated {
            partial: tail.to_string(),
            open_scopes,
        },
    }
}

enum Scan {
    Closed(usize),
    Open(usize),
}

/// Walks from an opening `{`/`[` to its matching close, honouring strings
/// and escapes.
fn balanced_end(s: &str) -> Scan {
    let mut depth: usize = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' | '[' if !in_string => depth += 1,
            '}' | ']' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Scan::Closed(i);
                }
            }
            _ => {}
        }
    }

    Scan::Open(depth.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_object() {
        let result = extract_json(r#"  {"summary": "ok"}  "#);
        assert_eq!(result.json(), Some(r#"{"summary": "ok"}"#));
    }

    #[test]
    fn test_fenced_block_with_prose() {
        let content = "Here you go:\n```json\n{\"questions\": []}\n```\nLet me know.";
        assert_eq!(extract_json(content).json(), Some("{\"questions\": []}"));
    }

    #[test]
    fn test_unlabelled_fence() {
        let content = "```\n[1, 2, 3]\n```";
        assert_eq!(extract_json(content).json(), Some("[1, 2, 3]"));
    }

    #[test]
    fn test_object_after_prose_with_braces_in_strings() {
        let content = r#"Result: {"text": "use {curly} braces", "n": 1} trailing"#;
        assert_eq!(
            extract_json(content).json(),
            Some(r#"{"text": "use {curly} braces", "n": 1}"#)
        );
    }

    #[test]
    fn test_truncated_output() {
        let content = r#"{"questions": [{"question_text": "What is"#;
        match extract_json(content) {
            JsonExtraction::Truncated { open_scopes, .. } => assert!(open_scopes >= 1),
            other => panic!("expected truncation, got {:?}", other),
        }
    }

    #[test]
    fn test_no_json() {
        assert_eq!(extract_json("I cannot help with that."), JsonExtraction::NotFound);
    }
}
