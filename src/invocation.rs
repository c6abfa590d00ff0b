use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::util::unix_now_millis;

/// JSON object carrying a tool call's arguments.
pub type ArgMap = serde_json::Map<String, Value>;

/// Which path produced an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParserKind {
    /// Extracted from an explicit `<tool_call>` tag pair.
    Embedding,
    /// Recovered from untagged text by the fallback strategy stack.
    Text,
    /// Constructed directly by a transport from a pre-extracted name/args pair.
    Direct,
}

/// Provenance attached to every invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationMeta {
    /// The raw model output the invocation was extracted from. Empty for
    /// directly constructed invocations.
    pub raw_output: String,
    pub parser: ParserKind,
    /// Extraction certainty in `[0, 1]`. Absent for embedding matches,
    /// where a structural tag match is implicitly certain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub timestamp_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

/// A structured tool call ready for policy application and execution.
///
/// Immutable once created: enrichment (e.g. stamping a correlation id)
/// produces a new value rather than mutating in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Dotted or underscored tool identifier, never empty.
    pub tool: String,
    pub args: ArgMap,
    pub meta: InvocationMeta,
}

impl ToolInvocation {
    /// Build an invocation from a name/args pair a transport extracted
    /// itself, bypassing the parser subsystem.
    #[must_use]
    pub fn pre_extracted(tool: impl Into<String>, args: ArgMap) -> Self {
        Self {
            tool: tool.into(),
            args,
            meta: InvocationMeta {
                raw_output: String::new(),
                parser: ParserKind::Direct,
                confidence: None,
                timestamp_ms: unix_now_millis(),
                correlation_id: None,
            },
        }
    }

    /// Return a copy carrying the given correlation id.
    #[must_use]
    pub fn with_correlation_id(&self, correlation_id: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.meta.correlation_id = Some(correlation_id.into());
        next
    }
}

/// A failure reported by a tool or by the policy pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolError {
    /// Stable machine-readable code (see [`crate::error::codes`]).
    pub code: String,
    pub message: String,
}

impl ToolError {
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// The uniform outcome of an invocation, successful or not.
///
/// `duration_ms` is stamped by the policy applier at the very end of its
/// pipeline and overwrites anything a tool or hook may have set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl ToolResult {
    #[must_use]
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            duration_ms: 0,
        }
    }

    #[must_use]
    pub fn fail(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::from_error(ToolError::new(code, message))
    }

    #[must_use]
    pub fn from_error(error: ToolError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            duration_ms: 0,
        }
    }

    /// The failure code, when this result is a failure that carries one.
    #[must_use]
    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.code.as_str())
    }
}
