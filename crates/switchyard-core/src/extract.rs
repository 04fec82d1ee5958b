//! Locate JSON payloads embedded in free-form model output.

use serde_json::Value;

/// Start positions tried before giving up; keeps unbalanced input linear.
const MAX_START_POSITIONS: usize = 64;

/// Return the first well-formed JSON object or array found in `text`.
///
/// Models wrap payloads in prose or code fences; every `{` / `[` is tried
/// as a start position (up to [`MAX_START_POSITIONS`]) and the balanced span
/// after it is parsed. Spans that fail to parse are skipped.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed)
        && (value.is_object() || value.is_array())
    {
        return Some(value);
    }

    let bytes = text.as_bytes();
    let starts = bytes
        .iter()
        .enumerate()
        .filter(|(_, byte)| **byte == b'{' || **byte == b'[')
        .map(|(start, _)| start)
        .take(MAX_START_POSITIONS);
    for start in starts {
        let Some(end) = balanced_end(bytes, start) else {
            continue;
        };
        if let Ok(value) = serde_json::from_str::<Value>(&text[start..=end]) {
            return Some(value);
        }
    }
    None
}

/// Index of the bracket closing the one at `start`, honouring string literals.
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for (offset, byte) in bytes[start..].iter().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => stack.push(b'}'),
            b'[' => stack.push(b']'),
            b'}' | b']' => {
                if stack.pop() != Some(*byte) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::extract_json;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parses_bare_payload() {
        assert_eq!(extract_json(r#" {"steps": []} "#), Some(json!({ "steps": [] })));
    }

    #[test]
    fn finds_payload_inside_prose_and_fences() {
        let text = "Sure! Here is the plan:\n```json\n[{\"operation\": \"add\", \"arguments\": {\"a\": 1}}]\n```\nLet me know.";
        assert_eq!(
            extract_json(text),
            Some(json!([{ "operation": "add", "arguments": { "a": 1 } }]))
        );
    }

    #[test]
    fn skips_malformed_spans() {
        let text = "first {not json} then {\"ok\": \"brace } in string\"}";
        assert_eq!(extract_json(text), Some(json!({ "ok": "brace } in string" })));
    }

    #[test]
    fn returns_none_without_payload() {
        assert_eq!(extract_json("no structure here"), None);
        assert_eq!(extract_json("unbalanced { \"a\": 1"), None);
        assert_eq!(extract_json("42"), None);
    }

    #[test]
    fn payload_after_stray_brackets_is_found() {
        let text = format!("{} then {{\"steps\": []}}", "{ [".repeat(10));
        assert_eq!(extract_json(&text), Some(json!({ "steps": [] })));
    }

    #[test]
    fn unbalanced_flood_gives_up_after_bounded_starts() {
        let text = format!("{}{{\"steps\": []}}", "{".repeat(20_000));
        assert_eq!(extract_json(&text), None);
    }
}
