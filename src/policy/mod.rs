//! TSD policy applier: wraps a tool's execution with rate limiting,
//! elevation checks, input validation, hooks, retry/backoff, timeout
//! enforcement, and fallback substitution.
//!
//! The pipeline is linear with early exits, and every exit path returns a
//! [`ToolResult`]: policy failures become error-carrying results, never
//! errors raised past [`PolicyApplier::apply`].

pub mod schema;

mod elevation;
mod rate_limit;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use crate::config::SessionConfig;
use crate::error::codes;
use crate::invocation::{ArgMap, ToolError, ToolInvocation, ToolResult};
use crate::tsd::TaskSpecificDefinition;
use crate::util::unix_now_millis;

pub use elevation::{process_is_elevated, ElevationProbe};

/// Execution seam the applier drives. A thin adapter over the registry's
/// `invoke`.
///
/// `Ok` carries the tool's reported outcome, successful or not; `Err` is a
/// raised error. The applier classifies both by error code the same way, so
/// callers see one uniform result contract.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, tool: &str, args: &ArgMap) -> Result<ToolResult, ToolError>;
}

/// External hook functions, selected by the names a TSD configures.
///
/// A pre hook may rewrite arguments (e.g. normalizing paths); its return
/// value replaces the arguments for every subsequent pipeline step. A post
/// hook may replace the final result.
#[async_trait]
pub trait InvocationHooks: Send + Sync {
    async fn pre(
        &self,
        hook: &str,
        tool: &str,
        args: ArgMap,
        session: &SessionConfig,
    ) -> Result<ArgMap, ToolError>;

    async fn post(
        &self,
        hook: &str,
        tool: &str,
        args: &ArgMap,
        result: ToolResult,
        session: &SessionConfig,
    ) -> Result<ToolResult, ToolError>;
}

/// Applies per-tool operational policy around raw execution.
///
/// Owns the rate-limit table; everything else it consumes read-only per
/// call.
pub struct PolicyApplier {
    session: SessionConfig,
    rate_limits: rate_limit::RateLimitTable,
    hooks: Option<Arc<dyn InvocationHooks>>,
    elevation_probe: ElevationProbe,
}

impl PolicyApplier {
    #[must_use]
    pub fn new(session: SessionConfig) -> Self {
        Self {
            session,
            rate_limits: rate_limit::RateLimitTable::new(),
            hooks: None,
            elevation_probe: elevation::process_is_elevated,
        }
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<dyn InvocationHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Replace the platform privilege probe, e.g. with a host-specific
    /// check on platforms where the built-in probe is inapplicable.
    #[must_use]
    pub fn with_elevation_probe(mut self, probe: ElevationProbe) -> Self {
        self.elevation_probe = probe;
        self
    }

    /// Run the full policy pipeline for one invocation.
    ///
    /// Without a TSD the tool executes directly, no policy applied. The
    /// returned result always carries `duration_ms` measured across the
    /// whole pipeline, overwriting anything the tool or a hook set.
    pub async fn apply(
        &self,
        invocation: &ToolInvocation,
        tsd: Option<&TaskSpecificDefinition>,
        executor: &dyn ToolExecutor,
        fallback: Option<&dyn ToolExecutor>,
    ) -> ToolResult {
        let started = Instant::now();

        let mut result = match tsd {
            None => run_attempt(executor, &invocation.tool, &invocation.args, None).await,
            Some(tsd) => self.run_pipeline(invocation, tsd, executor, fallback).await,
        };

        result.duration_ms =
            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        result
    }

    async fn run_pipeline(
        &self,
        invocation: &ToolInvocation,
        tsd: &TaskSpecificDefinition,
        executor: &dyn ToolExecutor,
        fallback: Option<&dyn ToolExecutor>,
    ) -> ToolResult {
        let tool = invocation.tool.as_str();

        // Rate limit.
        if let Some(limits) = &tsd.rate_limits {
            let now_ms = unix_now_millis();
            if !self
                .rate_limits
                .check_and_record(tool, limits.window_limit(), now_ms)
            {
                tracing::debug!(tool, "rate limit exceeded");
                return ToolResult::fail(
                    codes::RATE_LIMIT_EXCEEDED,
                    format!(
                        "tool '{tool}' exceeded {} calls per second",
                        limits.window_limit()
                    ),
                );
            }
            self.rate_limits.maybe_sweep(now_ms);
        }

        // Elevation.
        if tsd.requires_elevation
            && !self.session.elevation_preapproved(tool)
            && (self.elevation_probe)() == Some(false)
        {
            return ToolResult::fail(
                codes::ELEVATION_REQUIRED,
                format!("tool '{tool}' requires elevated privileges"),
            );
        }

        // Input validation.
        if let Some(schema_doc) = &tsd.input_validation {
            let args_value = Value::Object(invocation.args.clone());
            if let Err(violations) = schema::validate_args(&args_value, schema_doc) {
                let detail = violations
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                return ToolResult::fail(
                    codes::VALIDATION_FAILED,
                    format!("arguments for '{tool}' failed validation: {detail}"),
                );
            }
        }

        // Pre hook. Its rewrite feeds every later step, fallback included.
        let mut args = invocation.args.clone();
        if let Some(hook) = &tsd.pre_hook {
            let Some(hooks) = &self.hooks else {
                return ToolResult::fail(
                    codes::HOOK_FAILED,
                    format!("pre hook '{hook}' configured for '{tool}' but no hook registry is installed"),
                );
            };
            match hooks.pre(hook, tool, args, &self.session).await {
                Ok(rewritten) => args = rewritten,
                Err(err) => {
                    return ToolResult::fail(
                        codes::HOOK_FAILED,
                        format!("pre hook '{hook}' failed for '{tool}': {}", err.message),
                    );
                }
            }
        }

        // Retry loop.
        let mut result = self.run_with_retries(tool, &args, tsd, executor).await;

        // Fallback substitution.
        if !result.success {
            if let (Some(fallback_tool), Some(fallback_fn)) =
                (tsd.fallback_tool.as_deref(), fallback)
            {
                tracing::debug!(tool, fallback = fallback_tool, "trying fallback tool");
                match raw_attempt(fallback_fn, fallback_tool, &args, tsd.timeout_ms).await {
                    Ok(substituted) => result = substituted,
                    Err(err) => {
                        tracing::warn!(
                            tool,
                            fallback = fallback_tool,
                            code = %err.code,
                            "fallback tool raised, keeping primary failure"
                        );
                    }
                }
            }
        }

        // Post hook.
        if let Some(hook) = &tsd.post_hook {
            if let Some(hooks) = &self.hooks {
                match hooks
                    .post(hook, tool, &args, result.clone(), &self.session)
                    .await
                {
                    Ok(replaced) => result = replaced,
                    Err(err) => {
                        tracing::warn!(
                            tool,
                            hook = %hook,
                            code = %err.code,
                            "post hook raised, keeping pipeline result"
                        );
                    }
                }
            } else {
                tracing::warn!(
                    tool,
                    hook = %hook,
                    "post hook configured but no hook registry installed"
                );
            }
        }

        result
    }

    async fn run_with_retries(
        &self,
        tool: &str,
        args: &ArgMap,
        tsd: &TaskSpecificDefinition,
        executor: &dyn ToolExecutor,
    ) -> ToolResult {
        let attempts = tsd
            .retry_policy
            .as_ref()
            .map_or(1, |policy| policy.max_retries.saturating_add(1));

        let mut attempt_index = 0u32;
        loop {
            if attempt_index > 0 {
                if let Some(policy) = &tsd.retry_policy {
                    let delay = policy.delay_for(attempt_index);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }

            let outcome = run_attempt(executor, tool, args, tsd.timeout_ms).await;
            attempt_index += 1;
            if outcome.success {
                return outcome;
            }

            let retryable = match (&tsd.retry_policy, outcome.error_code()) {
                (Some(policy), Some(code)) => policy.is_retryable(code),
                _ => false,
            };
            if !retryable || attempt_index >= attempts {
                return outcome;
            }
            tracing::debug!(
                tool,
                attempt = attempt_index,
                code = outcome.error_code(),
                "retrying failed attempt"
            );
        }
    }
}

/// One execution attempt under the optional per-attempt timeout, raised
/// errors folded into a failed result.
async fn run_attempt(
    executor: &dyn ToolExecutor,
    tool: &str,
    args: &ArgMap,
    timeout_ms: Option<u64>,
) -> ToolResult {
    raw_attempt(executor, tool, args, timeout_ms)
        .await
        .unwrap_or_else(ToolResult::from_error)
}

/// Like [`run_attempt`] but keeps the raised/reported distinction, which the
/// fallback step needs (a raised fallback must not replace the primary
/// failure). `tokio::time::timeout` drops its timer on either outcome; a
/// timed-out execution future is dropped with it; the caller stops waiting
/// rather than force-cancelling the tool.
async fn raw_attempt(
    executor: &dyn ToolExecutor,
    tool: &str,
    args: &ArgMap,
    timeout_ms: Option<u64>,
) -> Result<ToolResult, ToolError> {
    match timeout_ms {
        Some(ms) => {
            match tokio::time::timeout(Duration::from_millis(ms), executor.execute(tool, args))
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(ToolError::new(
                    codes::TIMEOUT,
                    format!("tool '{tool}' timed out after {ms}ms"),
                )),
            }
        }
        None => executor.execute(tool, args).await,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[path = "applier_tests.rs"]
mod tests;
