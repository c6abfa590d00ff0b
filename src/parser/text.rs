//! Text parser: fallback strategy stack for models that emit no tags.
//!
//! Three strategies run in fixed order, stopping at the first success:
//! fenced code-block JSON, bare top-level JSON, then a known-tool-name scan.
//! No strategy matching is not an error; the output was plain conversation.

use memchr::{memchr, memmem};
use serde_json::Value;

use crate::invocation::{ArgMap, InvocationMeta, ParserKind, ToolInvocation};
use crate::json_scan::find_object_span;
use crate::util::{find_ascii_case_insensitive, unix_now_millis};

/// Clean structured JSON (fenced or bare) that decoded as a call payload.
const CONFIDENCE_STRUCTURED: f64 = 0.9;
/// A known tool name followed by a parseable argument object.
const CONFIDENCE_NAME_WITH_ARGS: f64 = 0.7;
/// A known tool name with no usable argument object after it.
const CONFIDENCE_NAME_ONLY: f64 = 0.4;

/// Try to recover a single tool call from untagged text.
///
/// Returns `None` for plain conversational output; callers must treat that
/// as a valid empty result, not a failure.
#[must_use]
pub fn parse(text: &str, known_tools: &[String]) -> Option<ToolInvocation> {
    if let Some((name, args)) = fenced_block_payload(text) {
        return Some(build(text, name, args, CONFIDENCE_STRUCTURED));
    }
    if let Some((name, args)) = bare_object_payload(text) {
        return Some(build(text, name, args, CONFIDENCE_STRUCTURED));
    }
    known_tool_heuristic(text, known_tools)
}

fn build(raw_output: &str, tool: String, args: ArgMap, confidence: f64) -> ToolInvocation {
    ToolInvocation {
        tool,
        args,
        meta: InvocationMeta {
            raw_output: raw_output.to_string(),
            parser: ParserKind::Text,
            confidence: Some(confidence),
            timestamp_ms: unix_now_millis(),
            correlation_id: None,
        },
    }
}

// ---------------------------------------------------------------------------
// Strategy 1: fenced code blocks
// ---------------------------------------------------------------------------

const FENCE: &[u8] = b"```";

/// Walk every fenced block and return the first whose content decodes as a
/// call payload. The language hint line is skipped whatever it says; the
/// payload decoder is the arbiter.
fn fenced_block_payload(text: &str) -> Option<(String, ArgMap)> {
    let bytes = text.as_bytes();
    let mut cursor = 0usize;

    while let Some(rel) = memmem::find(&bytes[cursor..], FENCE) {
        let fence_start = cursor + rel;
        let hint_start = fence_start + FENCE.len();
        let Some(newline_rel) = memchr(b'\n', &bytes[hint_start..]) else {
            return None;
        };
        let content_start = hint_start + newline_rel + 1;
        let Some(close_rel) = memmem::find(&bytes[content_start..], FENCE) else {
            return None;
        };
        let content = text[content_start..content_start + close_rel].trim();
        if let Some(decoded) = decode_payload_str(content) {
            return Some(decoded);
        }
        cursor = content_start + close_rel + FENCE.len();
    }
    None
}

// ---------------------------------------------------------------------------
// Strategy 2: bare top-level JSON object
// ---------------------------------------------------------------------------

fn bare_object_payload(text: &str) -> Option<(String, ArgMap)> {
    let span = find_object_span(text, 0)?;
    decode_payload_str(&text[span])
}

// ---------------------------------------------------------------------------
// Strategy 3: known-tool-name scan
// ---------------------------------------------------------------------------

/// Case-insensitively scan for the earliest occurrence of any known tool
/// name, then look for a `{…}` object after it to use as arguments.
fn known_tool_heuristic(text: &str, known_tools: &[String]) -> Option<ToolInvocation> {
    if known_tools.is_empty() {
        return None;
    }

    let bytes = text.as_bytes();
    let mut earliest: Option<(usize, &str)> = None;
    for name in known_tools {
        if name.is_empty() {
            continue;
        }
        let Some(pos) = find_ascii_case_insensitive(bytes, name.as_bytes(), 0) else {
            continue;
        };
        let better = match earliest {
            None => true,
            // Prefer the earlier hit; on a tie, the longer name wins
            // (e.g. `file.read_all` over `file.read` at the same offset).
            Some((best_pos, best_name)) => {
                pos < best_pos || (pos == best_pos && name.len() > best_name.len())
            }
        };
        if better {
            earliest = Some((pos, name.as_str()));
        }
    }
    let (pos, name) = earliest?;

    let args_after = find_object_span(text, pos + name.len())
        .and_then(|span| serde_json::from_str::<Value>(&text[span]).ok())
        .and_then(|value| match value {
            Value::Object(map) => Some(map),
            _ => None,
        });

    let (args, confidence) = match args_after {
        Some(map) => (map, CONFIDENCE_NAME_WITH_ARGS),
        None => (ArgMap::new(), CONFIDENCE_NAME_ONLY),
    };
    Some(build(text, name.to_string(), args, confidence))
}

// ---------------------------------------------------------------------------
// Shared payload decoder
// ---------------------------------------------------------------------------

fn decode_payload_str(candidate: &str) -> Option<(String, ArgMap)> {
    let value: Value = serde_json::from_str(candidate).ok()?;
    decode_payload(&value)
}

/// Decode a parsed JSON value as a call payload.
///
/// Accepted shapes, tried in fixed priority order:
/// 1. `{ "name": …, "arguments"|"args": … }`
/// 2. `{ "tool": …, "arguments"|"args": … }`
/// 3. `{ "function": { "name": …, "arguments": … } }`
///
/// Anything else (non-object, array, missing name, non-object arguments)
/// is a shape mismatch, not an error.
pub(crate) fn decode_payload(value: &Value) -> Option<(String, ArgMap)> {
    let obj = value.as_object()?;

    for name_field in ["name", "tool"] {
        if let Some(decoded) = decode_flat_shape(obj, name_field) {
            return Some(decoded);
        }
    }

    let function = obj.get("function")?.as_object()?;
    decode_flat_shape(function, "name")
}

fn decode_flat_shape(
    obj: &serde_json::Map<String, Value>,
    name_field: &str,
) -> Option<(String, ArgMap)> {
    let name = obj.get(name_field)?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }
    let args_value = obj.get("arguments").or_else(|| obj.get("args"));
    let args = match args_value {
        None | Some(Value::Null) => ArgMap::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => return None,
    };
    Some((name.to_string(), args))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn known(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| (*n).to_string()).collect()
    }

    // -- strategy 1 ------------------------------------------------------

    #[test]
    fn fenced_json_block_wins() {
        let text = "Sure, calling it:\n```json\n{\"name\":\"ping\",\"arguments\":{}}\n```\nDone.";
        let inv = parse(text, &[]).unwrap();
        assert_eq!(inv.tool, "ping");
        assert_eq!(inv.meta.confidence, Some(0.9));
        assert_eq!(inv.meta.parser, ParserKind::Text);
    }

    #[test]
    fn fenced_block_without_hint_still_parses() {
        let text = "```\n{\"tool\":\"file.read\",\"args\":{\"path\":\"a\"}}\n```";
        let inv = parse(text, &[]).unwrap();
        assert_eq!(inv.tool, "file.read");
        assert_eq!(inv.args["path"], "a");
    }

    #[test]
    fn first_valid_block_wins_over_later_ones() {
        let text = "```json\n{\"note\":\"not a call\"}\n```\n```json\n{\"name\":\"b\"}\n```";
        let inv = parse(text, &[]).unwrap();
        assert_eq!(inv.tool, "b");
    }

    // -- strategy 2 ------------------------------------------------------

    #[test]
    fn bare_object_parses() {
        let text = "I'll do it. {\"function\": {\"name\": \"calc\", \"arguments\": {\"x\": 2}}} ok?";
        let inv = parse(text, &[]).unwrap();
        assert_eq!(inv.tool, "calc");
        assert_eq!(inv.args["x"], 2);
        assert_eq!(inv.meta.confidence, Some(0.9));
    }

    #[test]
    fn unbalanced_object_yields_nothing() {
        assert!(parse("broken {\"name\": \"x\"", &[]).is_none());
    }

    #[test]
    fn non_call_object_yields_nothing() {
        assert!(parse("data: {\"rows\": [1, 2]}", &[]).is_none());
    }

    // -- strategy 3 ------------------------------------------------------

    #[test]
    fn known_name_with_trailing_args() {
        let tools = known(&["file.read"]);
        let text = "I'll call file.read now {\"path\":\"a.txt\"}";
        let inv = parse(text, &tools).unwrap();
        assert_eq!(inv.tool, "file.read");
        assert_eq!(inv.args["path"], "a.txt");
        assert_eq!(inv.meta.confidence, Some(0.7));
    }

    #[test]
    fn known_name_without_args_is_low_confidence() {
        let tools = known(&["file.read"]);
        let inv = parse("just run file.read please", &tools).unwrap();
        assert_eq!(inv.tool, "file.read");
        assert!(inv.args.is_empty());
        assert_eq!(inv.meta.confidence, Some(0.4));
    }

    #[test]
    fn known_name_match_is_case_insensitive() {
        let tools = known(&["File.Read"]);
        let inv = parse("use file.read here", &tools).unwrap();
        assert_eq!(inv.tool, "File.Read");
    }

    #[test]
    fn earliest_known_name_wins() {
        let tools = known(&["beta", "alpha"]);
        let inv = parse("alpha then beta", &tools).unwrap();
        assert_eq!(inv.tool, "alpha");
    }

    #[test]
    fn non_object_trailing_json_downgrades_confidence() {
        let tools = known(&["list"]);
        // An array after the name is not an argument object.
        let inv = parse("list [1, 2, 3]", &tools).unwrap();
        assert_eq!(inv.meta.confidence, Some(0.4));
        assert!(inv.args.is_empty());
    }

    #[test]
    fn empty_known_list_skips_heuristic() {
        assert!(parse("call file.read now", &[]).is_none());
    }

    #[test]
    fn plain_text_is_none_not_error() {
        let tools = known(&["file.read"]);
        assert!(parse("The weather is nice today.", &tools).is_none());
    }

    // -- payload shapes --------------------------------------------------

    #[test]
    fn all_four_shapes_decode() {
        for payload in [
            r#"{"name":"t","arguments":{"a":1}}"#,
            r#"{"name":"t","args":{"a":1}}"#,
            r#"{"tool":"t","arguments":{"a":1}}"#,
            r#"{"function":{"name":"t","arguments":{"a":1}}}"#,
        ] {
            let (name, args) = decode_payload_str(payload).unwrap();
            assert_eq!(name, "t");
            assert_eq!(args["a"], 1);
        }
    }

    #[test]
    fn name_shape_outranks_tool_shape() {
        let (name, _) = decode_payload_str(r#"{"name":"a","tool":"b"}"#).unwrap();
        assert_eq!(name, "a");
    }

    #[test]
    fn rejected_shapes() {
        for payload in [
            "[1,2]",
            "\"just a string\"",
            r#"{"arguments":{}}"#,
            r#"{"name":""}"#,
            r#"{"name":"t","arguments":"not a map"}"#,
        ] {
            assert!(decode_payload_str(payload).is_none(), "payload: {payload}");
        }
    }
}
