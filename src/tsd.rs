//! Task-specific definitions: per-tool operational policy.
//!
//! One TSD per tool, loaded from JSON documents by an external loader and
//! handed to the applier read-only. Absence of a TSD means "execute with no
//! policy".

use std::fmt;
use std::time::Duration;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Sliding-window rate limit over one second.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimits {
    pub max_calls_per_second: u32,
    #[serde(default)]
    pub burst_allowance: u32,
}

impl RateLimits {
    /// Calls admitted per window, burst included.
    #[must_use]
    pub fn window_limit(&self) -> u32 {
        self.max_calls_per_second.saturating_add(self.burst_allowance)
    }
}

/// Delay growth between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    #[default]
    None,
    Linear,
    Exponential,
}

impl fmt::Display for Backoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backoff::None => write!(f, "none"),
            Backoff::Linear => write!(f, "linear"),
            Backoff::Exponential => write!(f, "exponential"),
        }
    }
}

/// Retry behavior for execution failures whose code is whitelisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub backoff: Backoff,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default)]
    pub retryable_errors: Vec<String>,
}

fn default_base_delay_ms() -> u64 {
    100
}

impl RetryPolicy {
    /// Delay before attempt `attempt_index + 1` (so index 1 precedes the
    /// first retry). Exponential growth is shift-clamped to keep the
    /// multiplication in range.
    #[must_use]
    pub fn delay_for(&self, attempt_index: u32) -> Duration {
        let millis = match self.backoff {
            Backoff::None => 0,
            Backoff::Linear => self.base_delay_ms.saturating_mul(u64::from(attempt_index)),
            Backoff::Exponential => {
                let shift = attempt_index.min(10);
                self.base_delay_ms.saturating_mul(1_u64 << shift)
            }
        };
        Duration::from_millis(millis)
    }

    #[must_use]
    pub fn is_retryable(&self, code: &str) -> bool {
        self.retryable_errors.iter().any(|c| c == code)
    }
}

/// Operational policy for one tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpecificDefinition {
    pub tool_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limits: Option<RateLimits>,
    #[serde(default)]
    pub requires_elevation: bool,
    /// JSON-Schema-shaped structure the invocation arguments must satisfy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_validation: Option<serde_json::Value>,
    /// Name of the pre-execution hook; its return value replaces the
    /// arguments for all subsequent steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_hook: Option<String>,
    /// Name of the post-execution hook; its return value replaces the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_hook: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Tool to substitute when every attempt of the primary has failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_tool: Option<String>,
}

impl TaskSpecificDefinition {
    /// A TSD that applies no policy at all, useful as a test baseline.
    #[must_use]
    pub fn bare(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            rate_limits: None,
            requires_elevation: false,
            input_validation: None,
            pre_hook: None,
            post_hook: None,
            retry_policy: None,
            timeout_ms: None,
            fallback_tool: None,
        }
    }
}

/// Source of per-tool policy, populated by an external loader.
pub trait TsdSource: Send + Sync {
    fn get(&self, tool_name: &str) -> Option<TaskSpecificDefinition>;
}

/// In-memory TSD source keyed by tool name.
#[derive(Default)]
pub struct StaticTsdSource {
    definitions: FxHashMap<String, TaskSpecificDefinition>,
}

impl StaticTsdSource {
    #[must_use]
    pub fn new(definitions: impl IntoIterator<Item = TaskSpecificDefinition>) -> Self {
        Self {
            definitions: definitions
                .into_iter()
                .map(|tsd| (tsd.tool_name.clone(), tsd))
                .collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl TsdSource for StaticTsdSource {
    fn get(&self, tool_name: &str) -> Option<TaskSpecificDefinition> {
        self.definitions.get(tool_name).cloned()
    }
}
