use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

/// Pulls the structured payload out of a raw JSON-RPC agent response.
///
/// Agents answer through an opaque envelope whose `result` takes one of a
/// handful of shapes depending on how the reply was produced. The strategies
/// are tried in a fixed order and the first hit wins:
///
/// 1. a double-wrapped `result.result` object is unwrapped once,
/// 2. `history[last].parts[*]` text parts,
/// 3. direct `parts[*]` text parts,
/// 4. a `response` string field,
/// 5. a bare string `result`.
///
/// `None` means the agent replied conversationally (or not at all). That is
/// the ordinary "nothing to ingest" outcome, not an error.
pub fn extract_payload(body: &Value) -> Option<Value> {
    let mut result = body.get("result")?;
    if let Some(inner) = result.get("result") {
        if inner.is_object() {
            result = inner;
        }
    }

    if let Some(text) = result.as_str() {
        return parse_embedded_json(text);
    }
    if !result.is_object() {
        return None;
    }

    if let Some(found) = result
        .get("history")
        .and_then(|h| h.as_array())
        .and_then(|messages| messages.last())
        .and_then(scan_text_parts)
    {
        return Some(found);
    }
    if let Some(found) = scan_text_parts(result) {
        return Some(found);
    }
    if let Some(text) = result.get("response").and_then(|v| v.as_str()) {
        return parse_embedded_json(text);
    }
    None
}

fn scan_text_parts(message: &Value) -> Option<Value> {
    let parts = message.get("parts")?.as_array()?;
    for part in parts {
        if part.get("kind").and_then(|v| v.as_str()) != Some("text") {
            continue;
        }
        let Some(text) = part.get("text").and_then(|v| v.as_str()) else {
            continue;
        };
        if let Some(parsed) = parse_embedded_json(text) {
            return Some(parsed);
        }
    }
    None
}

/// Parses JSON out of free-form agent text. A ```json fenced block takes
/// priority over the text as a whole; when a fence is present only its
/// content is considered. Only a non-empty JSON object counts as a payload,
/// so fenced scalars or `{}` fall through to the next strategy.
pub fn parse_embedded_json(text: &str) -> Option<Value> {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| {
        Regex::new(r"(?s)```json\s*(.*?)\s*```").expect("fence pattern")
    });

    let candidate = match fence.captures(text) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or(""),
        None => text.trim(),
    };

    let value: Value = serde_json::from_str(candidate).ok()?;
    match &value {
        Value::Object(map) if !map.is_empty() => Some(value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn history_text_part_with_fence() {
        let body = json!({
            "result": {
                "history": [
                    { "parts": [{ "kind": "text", "text": "working on it" }] },
                    { "parts": [
                        { "kind": "data", "data": {} },
                        { "kind": "text", "text": "Done!\n```json\n{\"topics\": []}\n```\nanything else?" }
                    ] }
                ]
            }
        });
        assert_eq!(extract_payload(&body), Some(json!({ "topics": [] })));
    }

    #[test]
    fn direct_parts() {
        let body = json!({
            "result": {
                "parts": [{ "kind": "text", "text": "{\"assignment_marks\": 14.0}" }]
            }
        });
        assert_eq!(
            extract_payload(&body),
            Some(json!({ "assignment_marks": 14.0 }))
        );
    }

    #[test]
    fn response_string_field() {
        let body = json!({ "result": { "response": "```json\n{\"a\": 1}\n```" } });
        assert_eq!(extract_payload(&body), Some(json!({ "a": 1 })));
    }

    #[test]
    fn bare_string_result() {
        let body = json!({ "result": "{\"a\": 1}" });
        assert_eq!(extract_payload(&body), Some(json!({ "a": 1 })));
    }

    #[test]
    fn double_wrapped_result() {
        let body = json!({
            "result": {
                "result": { "parts": [{ "kind": "text", "text": "{\"a\": 1}" }] }
            }
        });
        assert_eq!(extract_payload(&body), Some(json!({ "a": 1 })));
    }

    #[test]
    fn conversational_reply_is_none() {
        let body = json!({
            "result": {
                "history": [{ "parts": [{ "kind": "text", "text": "Sure, happy to help!" }] }]
            }
        });
        assert_eq!(extract_payload(&body), None);
        assert_eq!(extract_payload(&json!({ "error": { "code": -32000 } })), None);
    }

    #[test]
    fn later_part_wins_when_first_is_prose() {
        let body = json!({
            "result": {
                "parts": [
                    { "kind": "text", "text": "Here are the results:" },
                    { "kind": "text", "text": "{\"topics\": [{\"id\": 1, \"name\": \"T\"}]}" }
                ]
            }
        });
        let payload = extract_payload(&body).unwrap();
        assert_eq!(payload["topics"][0]["name"], "T");
    }

    #[test]
    fn fenced_scalar_and_empty_object_are_not_payloads() {
        assert_eq!(parse_embedded_json("```json\n42\n```"), None);
        assert_eq!(parse_embedded_json("{}"), None);
        assert_eq!(parse_embedded_json("no json here"), None);
    }

    #[test]
    fn broken_fence_content_does_not_fall_back() {
        // A fence that fails to parse is a miss even if the rest of the
        // text would parse.
        assert_eq!(parse_embedded_json("```json\n{broken\n``` {\"a\": 1}"), None);
    }
}
