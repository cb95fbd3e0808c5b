//! Pulls a single JSON *object* out of free-form LLM text: fenced code
//! blocks first, then a greedy outermost-brace scan, first valid object
//! wins.

use regex_lite::Regex;
use serde_json::Value;

#[expect(clippy::expect_used)]
fn fenced_blocks(text: &str) -> Vec<String> {
    // ```json ... ``` or ``` ... ``` (language tag optional).
    let re = Regex::new(r"```(?:json)?\s*\n?([\s\S]*?)```").expect("static regex is valid");
    re.captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Greedy match of the outermost `{ ... }` by brace depth, ignoring braces
/// inside string literals.
fn outermost_braces(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Returns the first JSON object found, or `None` if nothing in `text`
/// parses as one. Arrays and bare scalars never count, even if they parse.
pub fn extract_json_object(text: &str) -> Option<Value> {
    for block in fenced_blocks(text) {
        if let Ok(value) = serde_json::from_str::<Value>(block.trim())
            && value.is_object()
        {
            return Some(value);
        }
    }
    if let Some(candidate) = outermost_braces(text)
        && let Ok(value) = serde_json::from_str::<Value>(candidate)
        && value.is_object()
    {
        return Some(value);
    }
    None
}

#[cfg(test)]
#[expect(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn extracts_from_fenced_block() {
        let text = "here you go:\n```json\n{\"type\": \"final\", \"content\": \"hi\"}\n```\ndone";
        let v = extract_json_object(text).unwrap();
        assert_eq!(v["type"], "final");
    }

    #[test]
    fn extracts_greedy_braces_without_fence() {
        let text = "sure, {\"type\":\"final\",\"content\":\"ok\"} thanks";
        let v = extract_json_object(text).unwrap();
        assert_eq!(v["content"], "ok");
    }

    #[test]
    fn rejects_array_and_scalar() {
        assert!(extract_json_object("[1,2,3]").is_none());
        assert!(extract_json_object("just text, no json here").is_none());
    }

    #[test]
    fn nested_braces_in_string_do_not_confuse_depth() {
        let text = r#"{"type":"tool","tool":"run_shell","args":{"cmd":"echo '{'"}}"#;
        let v = extract_json_object(text).unwrap();
        assert_eq!(v["tool"], "run_shell");
    }
}
