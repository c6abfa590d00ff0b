//! Embedding parser: extraction of explicitly delimiter-tagged tool calls.
//!
//! A tagged call is `<tool_call>{"name": "...", "arguments": {...}}</tool_call>`,
//! payloads may span multiple lines and carry surrounding whitespace. A tag
//! whose payload is not a JSON object with a usable `name` aborts the whole
//! extraction with [`GateError::MalformedToolCall`]; callers must not
//! swallow that silently.

use memchr::memmem;
use serde_json::Value;

use crate::error::GateError;
use crate::invocation::{ArgMap, InvocationMeta, ParserKind, ToolInvocation};
use crate::util::unix_now_millis;

pub const TOOL_CALL_OPEN: &str = "<tool_call>";
pub const TOOL_CALL_CLOSE: &str = "</tool_call>";

/// Streaming buffer cap. Past this, a feed that completed nothing releases
/// the whole buffer back to the caller instead of growing without bound.
pub const DEFAULT_MAX_BUFFER: usize = 512 * 1024;

/// Result of a whole-string extraction pass.
#[derive(Debug)]
pub struct Extraction {
    /// Invocations in source order.
    pub invocations: Vec<ToolInvocation>,
    /// Input with every matched span removed, trimmed.
    pub remaining: String,
}

/// Extract every tagged tool call from `text`.
///
/// An open tag with no matching close tag is not an error; it is left in
/// `remaining` verbatim (the streaming extractor relies on this to retry
/// partially received tags).
///
/// # Errors
///
/// Returns [`GateError::MalformedToolCall`] carrying the offending tag text
/// when a payload fails to parse as JSON or lacks a valid `name`.
pub fn extract(text: &str) -> Result<Extraction, GateError> {
    let (invocations, remaining) = extract_untrimmed(text)?;
    Ok(Extraction {
        invocations,
        remaining: remaining.trim().to_string(),
    })
}

/// Extraction pass that keeps the remainder byte-exact. The streaming
/// extractor buffers this remainder across feeds; trimming it would alter
/// whitespace inside a partially received payload.
fn extract_untrimmed(text: &str) -> Result<(Vec<ToolInvocation>, String), GateError> {
    let bytes = text.as_bytes();
    let open_finder = memmem::find_iter(bytes, TOOL_CALL_OPEN.as_bytes());

    let mut invocations = Vec::with_capacity(2);
    let mut remaining = String::new();
    let mut cursor = 0usize;

    for open_start in open_finder {
        if open_start < cursor {
            // Tag text inside an already consumed payload span.
            continue;
        }
        let payload_start = open_start + TOOL_CALL_OPEN.len();
        let Some(close_rel) = memmem::find(&bytes[payload_start..], TOOL_CALL_CLOSE.as_bytes())
        else {
            // Unterminated tag: keep it (and everything after) as remainder.
            break;
        };
        let payload_end = payload_start + close_rel;
        let close_end = payload_end + TOOL_CALL_CLOSE.len();

        let raw_tag = &text[open_start..close_end];
        let payload = text[payload_start..payload_end].trim();
        let (name, args) = decode_payload(payload).ok_or_else(|| GateError::MalformedToolCall {
            raw: raw_tag.to_string(),
        })?;

        remaining.push_str(&text[cursor..open_start]);
        invocations.push(ToolInvocation {
            tool: name,
            args,
            meta: InvocationMeta {
                raw_output: text.to_string(),
                parser: ParserKind::Embedding,
                confidence: None,
                timestamp_ms: unix_now_millis(),
                correlation_id: None,
            },
        });
        cursor = close_end;
    }

    remaining.push_str(&text[cursor..]);
    Ok((invocations, remaining))
}

/// Strict payload shape: `{ "name": string, "arguments"?: object }`.
/// `null` arguments are tolerated as empty (models emit it).
fn decode_payload(payload: &str) -> Option<(String, ArgMap)> {
    let value: Value = serde_json::from_str(payload).ok()?;
    let obj = value.as_object()?;
    let name = obj.get("name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }
    let args = match obj.get("arguments") {
        None | Some(Value::Null) => ArgMap::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => return None,
    };
    Some((name.to_string(), args))
}

// ---------------------------------------------------------------------------
// Streaming variant
// ---------------------------------------------------------------------------

/// Outcome of a single [`StreamingExtractor::feed`] call.
#[derive(Debug, Default)]
pub struct FeedOutcome {
    /// Invocations completed by this chunk.
    pub invocations: Vec<ToolInvocation>,
    /// Buffered text released back to the caller because the buffer cap was
    /// hit with no complete tag in sight. `None` in normal operation.
    pub overflow: Option<String>,
}

/// Incremental extractor for chunked model output.
///
/// Each `feed` appends to an internal buffer and re-runs extraction over the
/// whole buffer; the buffer is replaced by the unmatched remainder only when
/// at least one complete invocation was found, so a tag spanning a chunk
/// boundary is preserved and retried on the next feed.
pub struct StreamingExtractor {
    buffer: String,
    max_buffer: usize,
}

impl Default for StreamingExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            max_buffer: DEFAULT_MAX_BUFFER,
        }
    }

    #[must_use]
    pub fn with_max_buffer(max_buffer: usize) -> Self {
        Self {
            buffer: String::new(),
            max_buffer,
        }
    }

    /// Bytes currently buffered awaiting a complete tag.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Append a chunk and return the invocations it completed.
    ///
    /// # Errors
    ///
    /// Propagates [`GateError::MalformedToolCall`] from extraction; the
    /// buffer keeps its content (including the offending tag) so a final
    /// [`flush`](Self::flush) can still surface the text.
    pub fn feed(&mut self, chunk: &str) -> Result<FeedOutcome, GateError> {
        self.buffer.push_str(chunk);

        let (invocations, remaining) = extract_untrimmed(&self.buffer)?;
        if !invocations.is_empty() {
            self.buffer = remaining;
            return Ok(FeedOutcome {
                invocations,
                overflow: None,
            });
        }

        if self.buffer.len() > self.max_buffer {
            let flushed = std::mem::take(&mut self.buffer);
            tracing::warn!(
                buffered = flushed.len(),
                max = self.max_buffer,
                "streaming extractor buffer overflow, releasing as plain text"
            );
            return Ok(FeedOutcome {
                invocations: Vec::new(),
                overflow: Some(flushed),
            });
        }

        Ok(FeedOutcome::default())
    }

    /// Final extraction pass over whatever remains. Clears the buffer and
    /// returns the trailing invocations plus the unmatched text.
    ///
    /// # Errors
    ///
    /// Propagates [`GateError::MalformedToolCall`]; the buffer is cleared
    /// either way.
    pub fn flush(&mut self) -> Result<(Vec<ToolInvocation>, String), GateError> {
        let buffered = std::mem::take(&mut self.buffer);
        let extraction = extract(&buffered)?;
        Ok((extraction.invocations, extraction.remaining))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[path = "embedding_tests.rs"]
mod tests;
