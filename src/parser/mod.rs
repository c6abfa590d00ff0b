//! Parser subsystem: routing raw model output to the embedding and text
//! parsers according to the session's fixed parsing mode.

pub mod embedding;
pub mod text;

use crate::config::{ParserMode, SessionConfig};
use crate::error::GateError;
use crate::invocation::ToolInvocation;
use crate::util::CorrelationIds;

/// Routes raw model output to the right parser(s) for a session.
///
/// Constructed once per session; the mode never changes afterwards. An empty
/// return from [`parse`](Self::parse) means "plain assistant message, no
/// tool call", distinct from the malformed-payload error the embedding
/// path can raise.
pub struct ParserRouter {
    mode: ParserMode,
    known_tools: Vec<String>,
    correlation_ids: CorrelationIds,
}

impl ParserRouter {
    #[must_use]
    pub fn new(session: &SessionConfig) -> Self {
        Self {
            mode: session.parser_mode(),
            known_tools: Vec::new(),
            correlation_ids: CorrelationIds::new(),
        }
    }

    #[must_use]
    pub fn mode(&self) -> ParserMode {
        self.mode
    }

    /// Install the registry's tool names for the heuristic strategy. Must be
    /// called after the registry is populated and before the first `parse`
    /// call that could reach the known-tool scan.
    pub fn set_known_tool_names(&mut self, names: Vec<String>) {
        self.known_tools = names;
    }

    /// Extract zero or more invocations from `raw_output`.
    ///
    /// - `embedding` mode returns whatever the embedding parser finds.
    /// - `text` mode returns the text parser's single match, if any.
    /// - `hybrid` runs the embedding parser first and treats its matches as
    ///   authoritative; the text stack is consulted only when no tag matched.
    ///   Results are never merged across parsers.
    ///
    /// # Errors
    ///
    /// Propagates [`GateError::MalformedToolCall`] from the embedding path.
    pub fn parse(&self, raw_output: &str) -> Result<Vec<ToolInvocation>, GateError> {
        match self.mode {
            ParserMode::Embedding => self.parse_embedding(raw_output),
            ParserMode::Text => Ok(self.parse_text(raw_output)),
            ParserMode::Hybrid => {
                let tagged = self.parse_embedding(raw_output)?;
                if tagged.is_empty() {
                    Ok(self.parse_text(raw_output))
                } else {
                    Ok(tagged)
                }
            }
        }
    }

    fn parse_embedding(&self, raw_output: &str) -> Result<Vec<ToolInvocation>, GateError> {
        let extraction = embedding::extract(raw_output)?;
        Ok(self.stamp(extraction.invocations))
    }

    fn parse_text(&self, raw_output: &str) -> Vec<ToolInvocation> {
        let found = text::parse(raw_output, &self.known_tools);
        self.stamp(found.into_iter().collect())
    }

    fn stamp(&self, invocations: Vec<ToolInvocation>) -> Vec<ToolInvocation> {
        invocations
            .into_iter()
            .map(|inv| {
                let id = self.correlation_ids.next();
                inv.with_correlation_id(id)
            })
            .collect()
    }
}
