//! Response-text-to-JSON extraction (spec §4.2).
//!
//! Provider responses are free text; this pipeline strips fences,
//! extracts the first balanced brace/bracket block, sanitizes invalid
//! backslash escapes, and tolerates both the modern object shape and the
//! legacy bare-array shape for step outputs.

use once_cell::sync::Lazy;
use regex::Regex;

static FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("static fence regex is valid")
});

/// Strips a single enclosing ``` fence, if present.
#[must_use]
pub fn strip_fences(text: &str) -> String {
    if let Some(caps) = FENCE.captures(text) {
        if let Some(m) = caps.get(1) {
            return m.as_str().to_string();
        }
    }
    text.to_string()
}

/// Extracts the first balanced `{...}` or `[...]` block, scanning for
/// whichever opening bracket appears first and matching depth.
#[must_use]
pub fn extract_balanced_block(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let mut start = None;
    let mut open = b'{';
    let mut close = b'}';

    for (i, &b) in bytes.iter().enumerate() {
        if b == b'{' || b == b'[' {
            start = Some(i);
            open = b;
            close = if b == b'{' { b'}' } else { b']' };
            break;
        }
    }

    let start = start?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escape {
                escape = false;
            } else if b == b'\\' {
                escape = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            _ if b == open => depth += 1,
            _ if b == close => {
                depth -= 1;
                if depth == 0 {
                    return std::str::from_utf8(&bytes[start..=i]).ok().map(str::to_string);
                }
            }
            _ => {}
        }
    }
    None
}

/// Replaces a handful of invalid backslash escapes providers are known
/// to emit (e.g. `\E` in a shell-quoting example) with their escaped form
/// so `serde_json` doesn't choke on them.
#[must_use]
pub fn sanitize_escapes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some('"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' | 'u') => {
                    out.push(c);
                }
                Some(_) => {
                    out.push('\\');
                    out.push('\\');
                    continue;
                }
                None => out.push(c),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Full pipeline: fence-strip, balanced-extract, escape-sanitize, parse.
pub fn extract_json<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, super::errors::AiError> {
    let unfenced = strip_fences(text);
    let block = extract_balanced_block(&unfenced)
        .ok_or_else(|| super::errors::AiError::ParseError("no JSON object or array found in response".into()))?;
    let sanitized = sanitize_escapes(&block);
    serde_json::from_str(&sanitized).map_err(|e| super::errors::AiError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fenced_json() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```\nThanks";
        assert_eq!(strip_fences(text).trim(), "{\"a\": 1}");
    }

    #[test]
    fn extracts_balanced_block_amid_prose() {
        let text = "sure, {\"steps\": [{\"a\": \"b}c\"}], \"no_more_paths\": true} done";
        let block = extract_balanced_block(text).unwrap();
        assert!(block.starts_with('{') && block.ends_with('}'));
    }

    #[test]
    fn tolerates_bare_array_legacy_shape() {
        #[derive(serde::Deserialize)]
        struct Wrapper(Vec<i32>);
        let text = "[1, 2, 3]";
        let block = extract_balanced_block(text).unwrap();
        let parsed: Vec<i32> = serde_json::from_str(&block).unwrap();
        assert_eq!(parsed, vec![1, 2, 3]);
    }

    #[test]
    fn steps_result_accepts_legacy_bare_array() {
        let text = r#"[{"action": "click", "selector": "#submit", "full_xpath": "//button"}]"#;
        let result: super::super::types::StepsResult = extract_json(text).unwrap();
        assert_eq!(result.steps.len(), 1);
        assert!(!result.no_more_paths);
        assert!(result.page_error_detected.is_none());
    }

    #[test]
    fn steps_result_accepts_modern_object_shape() {
        let text = r#"{"steps": [], "no_more_paths": true}"#;
        let result: super::super::types::StepsResult = extract_json(text).unwrap();
        assert!(result.steps.is_empty());
        assert!(result.no_more_paths);
    }

    #[test]
    fn sanitizes_invalid_escape() {
        let text = r#"{"path": "C:\Escaped"}"#;
        let sanitized = sanitize_escapes(text);
        assert!(serde_json::from_str::<serde_json::Value>(&sanitized).is_ok());
    }
}
