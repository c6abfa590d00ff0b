use crate::invocation::ToolError;

/// Stable error codes carried by failed [`ToolResult`]s.
///
/// Tool implementations may fail with arbitrary codes of their own (matched
/// against a TSD's `retryableErrors`); the constants here cover every
/// failure the dispatch core itself produces.
///
/// [`ToolResult`]: crate::invocation::ToolResult
pub mod codes {
    pub const MALFORMED_TOOL_CALL: &str = "MALFORMED_TOOL_CALL";
    pub const RATE_LIMIT_EXCEEDED: &str = "RATE_LIMIT_EXCEEDED";
    pub const ELEVATION_REQUIRED: &str = "ELEVATION_REQUIRED";
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const HOOK_FAILED: &str = "HOOK_FAILED";
    pub const INTERNAL: &str = "INTERNAL";
}

/// Errors that propagate out of the parser subsystem.
///
/// Policy-level failures never raise: the applier folds them into a failed
/// [`ToolResult`](crate::invocation::ToolResult). A malformed embedded
/// payload is the one structural protocol violation callers must observe as
/// an error rather than an empty parse.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// A delimiter-tagged payload was not valid JSON or lacked a usable
    /// `name`. Carries the exact offending tag text.
    #[error("malformed tool call: {raw}")]
    MalformedToolCall { raw: String },
}

impl GateError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            GateError::MalformedToolCall { .. } => codes::MALFORMED_TOOL_CALL,
        }
    }
}

impl From<GateError> for ToolError {
    fn from(err: GateError) -> Self {
        let code = err.code();
        ToolError::new(code, err.to_string())
    }
}
