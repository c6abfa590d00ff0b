use serde::{Deserialize, Serialize};
use std::fmt;

/// Parsing mode for a session, fixed at session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserMode {
    Embedding,
    Text,
    Hybrid,
}

impl fmt::Display for ParserMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParserMode::Embedding => write!(f, "embedding"),
            ParserMode::Text => write!(f, "text"),
            ParserMode::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// Session-wide configuration the dispatch core consumes read-only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Tri-state parser selection: `true` forces the embedding parser,
    /// `false` forces the text parser, unset means hybrid.
    #[serde(default)]
    pub embedding_parser: Option<bool>,
    /// Whether the session holder pre-approved elevated execution.
    #[serde(default)]
    pub elevation_granted: bool,
    /// Tools the pre-approval covers. Ignored unless `elevation_granted`.
    #[serde(default)]
    pub elevated_tools: Vec<String>,
}

impl SessionConfig {
    /// Derive the session's parser mode from the tri-state flag.
    #[must_use]
    pub fn parser_mode(&self) -> ParserMode {
        match self.embedding_parser {
            Some(true) => ParserMode::Embedding,
            Some(false) => ParserMode::Text,
            None => ParserMode::Hybrid,
        }
    }

    /// True when elevation for `tool` was pre-approved for this session.
    #[must_use]
    pub fn elevation_preapproved(&self, tool: &str) -> bool {
        self.elevation_granted && self.elevated_tools.iter().any(|t| t == tool)
    }
}
